use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::directory::DeviceDirectory;
use super::shared::SessionShared;
use crate::models::error::CaptureError;
use crate::models::frame::AudioLayout;
use crate::processing::sample_convert::SampleConverter;
use crate::timing::rational::{rescale, Rational, MICROSECONDS};
use crate::traits::audio_source::{AudioCapture, AudioPoll};
use crate::writer::muxing_writer::MuxingWriter;

/// How far the sample-count timeline may trail recorded time before it is
/// moved forward.
const RESYNC_THRESHOLD: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioStep {
    /// A buffer was converted and written.
    Written,
    /// A buffer arrived but was discarded (paused, or no segment open yet).
    Discarded,
    Empty,
    Unavailable,
    Stopped,
}

/// Pulls loopback PCM, converts it to the writer's planar layout and stamps
/// it with a running sample count.
pub struct AudioCaptureLoop {
    shared: Arc<SessionShared>,
    client: Box<dyn AudioCapture>,
    writer: Arc<MuxingWriter>,
    converter: SampleConverter,
    layout: AudioLayout,
    next_pts: Option<i64>,
}

impl AudioCaptureLoop {
    pub(crate) fn new(
        shared: Arc<SessionShared>,
        client: Box<dyn AudioCapture>,
        writer: Arc<MuxingWriter>,
        layout: AudioLayout,
    ) -> Self {
        Self {
            shared,
            client,
            writer,
            converter: SampleConverter::new(layout),
            layout,
            next_pts: None,
        }
    }

    /// Thread body: resolve and start the device, then loop until stopped.
    /// Device failures end only this loop.
    pub(crate) fn run_device(
        shared: Arc<SessionShared>,
        directory: Arc<DeviceDirectory>,
        device: String,
        writer: Arc<MuxingWriter>,
        layout: AudioLayout,
    ) {
        let client = match directory.resolve_audio_device(&device) {
            Ok(client) => client,
            Err(e) => {
                shared.report(e);
                return;
            }
        };
        let mut audio = Self::new(shared, client, writer, layout);
        if let Err(e) = audio.client.start() {
            audio.shared.report(e);
            return;
        }
        let format = audio.client.format();
        log::info!(
            "[slot {}] Audio loop started on '{}' ({} Hz, {} ch, {:?})",
            audio.shared.slot,
            device,
            format.sample_rate,
            format.channels,
            format.sample_format
        );
        audio.run();
    }

    /// Poll until the running flag clears or the device fails, then stop
    /// the client.
    pub fn run(&mut self) {
        loop {
            match self.step() {
                AudioStep::Stopped => break,
                AudioStep::Empty => thread::sleep(self.shared.options.audio_empty_backoff),
                AudioStep::Unavailable => thread::sleep(self.shared.options.audio_unavailable_backoff),
                AudioStep::Written | AudioStep::Discarded => {}
            }
        }
        if let Err(e) = self.client.stop() {
            log::warn!("[slot {}] Failed to stop audio client: {}", self.shared.slot, e);
        }
        log::info!("[slot {}] Audio loop exited", self.shared.slot);
    }

    pub fn step(&mut self) -> AudioStep {
        if !self.shared.is_running() {
            return AudioStep::Stopped;
        }

        let buffer = match self.client.poll() {
            Ok(AudioPoll::Data(buffer)) => buffer,
            Ok(AudioPoll::Empty) => return AudioStep::Empty,
            Ok(AudioPoll::Unavailable) => return AudioStep::Unavailable,
            Err(e) => {
                self.shared.report(match e {
                    CaptureError::Device(_) => e,
                    other => CaptureError::Device(other.to_string()),
                });
                return AudioStep::Stopped;
            }
        };

        // Drained but not recorded; the timeline does not advance.
        if self.shared.is_paused() || !self.writer.is_open() {
            return AudioStep::Discarded;
        }

        let frame = self.converter.convert(&buffer);
        let frames = frame.frames() as i64;
        if frames == 0 {
            return AudioStep::Empty;
        }
        let pts = self.stamp(frames);
        match self.writer.write_audio_frame(&frame, pts) {
            Ok(()) => AudioStep::Written,
            // Counted and logged by the writer.
            Err(_) => AudioStep::Discarded,
        }
    }

    /// Sample-count timestamp for a buffer of `frames` that just finished
    /// arriving. Moves forward to recorded time after a device stall.
    fn stamp(&mut self, frames: i64) -> i64 {
        let sample_base = Rational::new(1, self.layout.sample_rate as i64);
        let elapsed = self.shared.recorded_elapsed();
        let expected = (rescale(elapsed.as_micros() as i64, MICROSECONDS, sample_base) - frames).max(0);
        let threshold = rescale(RESYNC_THRESHOLD.as_micros() as i64, MICROSECONDS, sample_base);

        let pts = match self.next_pts {
            Some(next) if next + threshold >= expected => next,
            Some(next) => {
                log::debug!(
                    "[slot {}] Audio trailing by {} samples, resyncing",
                    self.shared.slot,
                    expected - next
                );
                expected
            }
            None => expected,
        };
        self.next_pts = Some(pts + frames);
        pts
    }
}
