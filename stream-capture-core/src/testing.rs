//! Scripted fakes shared by the unit tests.

use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::error::CaptureError;
use crate::models::frame::{
    AudioBuffer, AudioFormat, AudioFrame, InterleavedSamples, PixelFormat, RawVideoFrame, SampleFormat, Yuv420Frame,
};
use crate::traits::audio_source::{AudioCapture, AudioDeviceDirectory, AudioPoll};
use crate::traits::media_sink::{MediaSink, SegmentLayout, SinkFactory};
use crate::traits::video_source::{CaptureOutcome, VideoReceiver, VideoSourceDirectory};

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// A solid grey RGBA frame.
pub fn grey_frame(width: u32, height: u32) -> RawVideoFrame {
    RawVideoFrame::packed(width, height, PixelFormat::Rgba, vec![128; (width * height * 4) as usize])
}

/// Everything a `RecordingSink` was asked to do.
#[derive(Debug, Default)]
pub struct SinkLog {
    pub opened: Vec<(PathBuf, SegmentLayout)>,
    /// `(segment number, pts)`; segment numbers count opens from 1.
    pub video: Vec<(usize, i64)>,
    /// `(segment number, pts, frames)`.
    pub audio: Vec<(usize, i64, usize)>,
    pub finished: usize,
    pub fail_open: bool,
    pub fail_writes: bool,
}

impl SinkLog {
    pub fn video_in_segment(&self, segment: usize) -> Vec<i64> {
        self.video.iter().filter(|(s, _)| *s == segment).map(|(_, pts)| *pts).collect()
    }
}

/// A sink that records calls and writes a small placeholder file per segment.
pub struct RecordingSink {
    pub log: Arc<Mutex<SinkLog>>,
    open: Option<PathBuf>,
}

impl RecordingSink {
    pub fn new() -> (Self, Arc<Mutex<SinkLog>>) {
        let log = Arc::new(Mutex::new(SinkLog::default()));
        (
            Self {
                log: Arc::clone(&log),
                open: None,
            },
            log,
        )
    }

    /// A factory whose sinks all share one log.
    pub fn factory() -> (SinkFactory, Arc<Mutex<SinkLog>>) {
        let log = Arc::new(Mutex::new(SinkLog::default()));
        let shared = Arc::clone(&log);
        let factory: SinkFactory = Arc::new(move || {
            Box::new(RecordingSink {
                log: Arc::clone(&shared),
                open: None,
            }) as Box<dyn MediaSink>
        });
        (factory, log)
    }

    fn append(path: &Path, bytes: &[u8]) -> Result<(), CaptureError> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(|e| CaptureError::WriterEncode(e.to_string()))?;
        file.write_all(bytes).map_err(|e| CaptureError::WriterEncode(e.to_string()))
    }
}

impl MediaSink for RecordingSink {
    fn open(&mut self, path: &Path, layout: &SegmentLayout) -> Result<(), CaptureError> {
        let mut log = self.log.lock();
        if log.fail_open {
            return Err(CaptureError::WriterOpen("scripted open failure".into()));
        }
        fs::write(path, b"header").map_err(|e| CaptureError::WriterOpen(e.to_string()))?;
        log.opened.push((path.to_path_buf(), layout.clone()));
        self.open = Some(path.to_path_buf());
        Ok(())
    }

    fn write_video(&mut self, frame: &Yuv420Frame, pts: i64) -> Result<(), CaptureError> {
        let mut log = self.log.lock();
        if log.fail_writes || self.open.is_none() {
            return Err(CaptureError::WriterEncode("scripted write failure".into()));
        }
        assert_eq!(frame.y.len(), (frame.width * frame.height) as usize);
        let segment = log.opened.len();
        log.video.push((segment, pts));
        Ok(())
    }

    fn write_audio(&mut self, frame: &AudioFrame, pts: i64) -> Result<(), CaptureError> {
        let mut log = self.log.lock();
        if log.fail_writes || self.open.is_none() {
            return Err(CaptureError::WriterEncode("scripted write failure".into()));
        }
        let segment = log.opened.len();
        log.audio.push((segment, pts, frame.frames()));
        Ok(())
    }

    fn finish(&mut self) -> Result<(), CaptureError> {
        if let Some(path) = self.open.take() {
            Self::append(&path, b"trailer")?;
            self.log.lock().finished += 1;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.is_some()
    }
}

/// A receiver that replays a script, then reports timeouts.
///
/// With `pace` set, each call sleeps before answering so threaded tests do
/// not spin.
pub struct ScriptedReceiver {
    script: Arc<Mutex<VecDeque<CaptureOutcome>>>,
    endless_frames: Option<(u32, u32)>,
    pace: Duration,
    counter: i64,
}

impl ScriptedReceiver {
    pub fn new(script: Vec<CaptureOutcome>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            endless_frames: None,
            pace: Duration::ZERO,
            counter: 0,
        }
    }

    /// Produce grey frames forever once the script is exhausted.
    pub fn endless(width: u32, height: u32, pace: Duration) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            endless_frames: Some((width, height)),
            pace,
            counter: 0,
        }
    }

    pub fn handle(&self) -> Arc<Mutex<VecDeque<CaptureOutcome>>> {
        Arc::clone(&self.script)
    }
}

impl VideoReceiver for ScriptedReceiver {
    fn capture(&mut self, _timeout: Duration) -> CaptureOutcome {
        if !self.pace.is_zero() {
            std::thread::sleep(self.pace);
        }
        if let Some(outcome) = self.script.lock().pop_front() {
            return outcome;
        }
        match self.endless_frames {
            Some((w, h)) => {
                self.counter += 1;
                CaptureOutcome::Frame(grey_frame(w, h).with_frame_rate(30, 1).with_timestamp(self.counter * 333_333))
            }
            None => CaptureOutcome::Timeout,
        }
    }
}

/// Video directory over a fixed list of names; `connect` builds receivers
/// with the supplied closure.
pub struct FakeVideoDirectory {
    pub names: Vec<String>,
    pub make: Box<dyn Fn(&str) -> Result<Box<dyn VideoReceiver>, CaptureError> + Send + Sync>,
}

impl FakeVideoDirectory {
    pub fn endless(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|n| n.to_string()).collect(),
            make: Box::new(|_| Ok(Box::new(ScriptedReceiver::endless(4, 4, Duration::from_millis(2))))),
        }
    }
}

impl VideoSourceDirectory for FakeVideoDirectory {
    fn list_video_sources(&self) -> Vec<String> {
        self.names.clone()
    }

    fn connect(&self, name: &str) -> Result<Box<dyn VideoReceiver>, CaptureError> {
        (self.make)(name)
    }
}

/// An audio client that delivers a fixed-size stereo f32 buffer on every
/// other poll, alternating with `Unavailable`.
pub struct FakeAudioCapture {
    pub frames_per_buffer: usize,
    pub started: bool,
    toggle: bool,
}

impl FakeAudioCapture {
    pub fn new(frames_per_buffer: usize) -> Self {
        Self {
            frames_per_buffer,
            started: false,
            toggle: false,
        }
    }
}

impl AudioCapture for FakeAudioCapture {
    fn format(&self) -> AudioFormat {
        AudioFormat {
            sample_rate: 48_000,
            channels: 2,
            sample_format: SampleFormat::F32,
        }
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        self.started = true;
        Ok(())
    }

    fn poll(&mut self) -> Result<AudioPoll, CaptureError> {
        if !self.started {
            return Err(CaptureError::Device("not started".into()));
        }
        self.toggle = !self.toggle;
        if !self.toggle {
            return Ok(AudioPoll::Unavailable);
        }
        Ok(AudioPoll::Data(AudioBuffer {
            sample_rate: 48_000,
            channels: 2,
            samples: InterleavedSamples::F32(vec![0.25; self.frames_per_buffer * 2]),
        }))
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.started = false;
        Ok(())
    }
}

pub struct FakeAudioDirectory {
    pub names: Vec<String>,
}

impl AudioDeviceDirectory for FakeAudioDirectory {
    fn list_audio_devices(&self) -> Result<Vec<String>, CaptureError> {
        Ok(self.names.clone())
    }

    fn resolve_audio_device(&self, name: &str) -> Result<Box<dyn AudioCapture>, CaptureError> {
        if self.names.iter().any(|n| n == name) {
            Ok(Box::new(FakeAudioCapture::new(480)))
        } else {
            Err(CaptureError::Device(format!("audio device not found: {}", name)))
        }
    }
}
