//! ffmpeg-backed `MediaSink`.
//!
//! One ffmpeg process per segment. Raw YUV 4:2:0 frames go to its stdin at
//! a constant rate; planar audio is re-packed as f32le and streamed over a
//! loopback TCP socket that ffmpeg connects to. Because ffmpeg sees raw
//! constant-rate streams, timestamps are applied by alignment: video gaps
//! repeat the last frame, audio gaps are filled with silence.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::error::CaptureError;
use crate::models::frame::{AudioFrame, AudioLayout, Yuv420Frame};
use crate::processing::sample_convert::interleave_f32le;
use crate::timing::rational::{rescale, Rational};
use crate::traits::media_sink::{MediaSink, SegmentLayout};

#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

const AUDIO_QUEUE_CAPACITY: usize = 256;
const AUDIO_ACCEPT_WAIT: Duration = Duration::from_millis(5);
/// How long the audio feed keeps waiting for ffmpeg to connect after finish.
const AUDIO_ACCEPT_GRACE: Duration = Duration::from_secs(2);
const MAX_GAP_FILL: Duration = Duration::from_secs(5);
const PRIME_SILENCE: Duration = Duration::from_millis(20);
/// Audio may trail video by this much before silence is inserted.
const AUDIO_LAG_ALLOWANCE: Duration = Duration::from_secs(1);
const FINISH_TIMEOUT: Duration = Duration::from_secs(10);
const STDERR_HINT_LIMIT: usize = 32;

/// Build the ffmpeg command line for one segment.
pub fn build_args(layout: &SegmentLayout, output: &Path, audio_port: Option<u16>) -> Vec<String> {
    let encoder = &layout.encoder;
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "warning", "-stats", "-stats_period", "1", "-y"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let audio = layout.audio.zip(audio_port);
    if let Some((audio, port)) = audio {
        args.extend([
            "-thread_queue_size".into(),
            "1024".into(),
            "-probesize".into(),
            "32".into(),
            "-analyzeduration".into(),
            "0".into(),
            "-f".into(),
            "f32le".into(),
            "-ar".into(),
            audio.sample_rate.to_string(),
            "-ac".into(),
            audio.channels.to_string(),
            "-i".into(),
            format!("tcp://127.0.0.1:{}", port),
        ]);
    }

    args.extend([
        "-thread_queue_size".into(),
        "512".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-video_size".into(),
        format!("{}x{}", layout.width, layout.height),
        "-framerate".into(),
        format!("{}/{}", layout.frame_rate.num, layout.frame_rate.den),
        "-i".into(),
        "pipe:0".into(),
    ]);

    match audio {
        Some(_) => args.extend(["-map".into(), "1:v:0".into(), "-map".into(), "0:a:0".into()]),
        None => args.extend(["-map".into(), "0:v:0".into()]),
    }

    args.extend([
        "-c:v".into(),
        encoder.video_codec.clone(),
        "-preset".into(),
        encoder.preset.clone(),
        "-crf".into(),
        encoder.crf.to_string(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-g".into(),
        layout.frame_rate.rounded().max(1).to_string(),
    ]);

    match audio {
        Some((audio, _)) => args.extend([
            "-c:a".into(),
            encoder.audio_codec.clone(),
            "-b:a".into(),
            format!("{}k", encoder.audio_bitrate_kbps),
            "-ar".into(),
            audio.sample_rate.to_string(),
            "-ac".into(),
            audio.channels.to_string(),
        ]),
        None => args.push("-an".into()),
    }

    args.extend([
        "-f".into(),
        encoder.container.muxer().into(),
        output.to_string_lossy().into_owned(),
    ]);
    args
}

/// What to do with an incoming video frame on a constant-rate stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoPlan {
    /// Late or duplicate PTS.
    Drop,
    /// Repeat the previous frame `repeat_previous` times, then write this one.
    Write { repeat_previous: u64 },
}

/// Maps frame PTS (one unit per frame) onto a constant-rate output.
#[derive(Debug, Clone)]
pub struct VideoAligner {
    next_pts: i64,
    max_fill: i64,
}

impl VideoAligner {
    pub fn new(max_fill_frames: i64) -> Self {
        Self {
            next_pts: 0,
            max_fill: max_fill_frames.max(0),
        }
    }

    /// Frames emitted so far.
    pub fn next_pts(&self) -> i64 {
        self.next_pts
    }

    pub fn plan(&mut self, pts: i64) -> VideoPlan {
        if pts < self.next_pts {
            return VideoPlan::Drop;
        }
        let gap = pts - self.next_pts;
        let fill = gap.min(self.max_fill);
        if gap > fill {
            log::warn!("Video gap of {} frames capped at {}", gap, fill);
        }
        self.next_pts += fill + 1;
        VideoPlan::Write {
            repeat_previous: fill as u64,
        }
    }
}

/// How to splice an incoming audio frame into a gapless stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioPlan {
    /// Silent frames to insert before the data.
    pub silence: usize,
    /// Leading frames of the data to discard.
    pub skip: usize,
}

/// Maps audio PTS (in samples) onto a gapless output stream.
#[derive(Debug, Clone)]
pub struct AudioAligner {
    next: i64,
    max_fill: i64,
}

impl AudioAligner {
    pub fn new(max_fill_samples: i64) -> Self {
        Self {
            next: 0,
            max_fill: max_fill_samples.max(0),
        }
    }

    pub fn next(&self) -> i64 {
        self.next
    }

    pub fn plan(&mut self, pts: i64, frames: usize) -> AudioPlan {
        let mut plan = AudioPlan { silence: 0, skip: 0 };
        if pts > self.next {
            let gap = pts - self.next;
            plan.silence = gap.min(self.max_fill) as usize;
            if gap > self.max_fill {
                log::warn!("Audio gap of {} samples capped at {}", gap, self.max_fill);
            }
        } else if pts < self.next {
            plan.skip = ((self.next - pts) as usize).min(frames);
        }
        self.next += (plan.silence + frames - plan.skip) as i64;
        plan
    }

    /// Give back `frames` that were planned but never reached ffmpeg, so the
    /// next plan fills their span with silence.
    pub fn rewind(&mut self, frames: usize) {
        self.next -= frames as i64;
    }

    /// Silence needed to bring the stream up to `target`.
    pub fn fill_to(&mut self, target: i64) -> usize {
        if target <= self.next {
            return 0;
        }
        let fill = target - self.next;
        self.next = target;
        fill as usize
    }
}

/// Whether a stderr line is periodic progress output rather than a diagnostic.
pub fn is_progress_line(line: &str) -> bool {
    ["frame=", "fps=", "dup=", "drop=", "speed="].iter().any(|k| line.contains(k))
}

#[derive(Debug, Default)]
struct AudioFeedStats {
    queued_chunks: AtomicU64,
    dropped_chunks: AtomicU64,
    written_chunks: AtomicU64,
}

struct AudioFeed {
    tx: Option<SyncSender<Vec<u8>>>,
    stop_tx: mpsc::Sender<()>,
    writer_thread: Option<JoinHandle<Result<(), String>>>,
    aligner: AudioAligner,
    layout: AudioLayout,
    stats: Arc<AudioFeedStats>,
}

impl AudioFeed {
    /// Queue a chunk the aligner has already accounted for.
    fn send(&mut self, chunk: Vec<u8>) -> Result<(), CaptureError> {
        let Some(tx) = &self.tx else {
            return Err(CaptureError::WriterEncode("audio feed already closed".into()));
        };
        match tx.try_send(chunk) {
            Ok(()) => {
                self.stats.queued_chunks.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(chunk)) => {
                self.aligner.rewind(chunk.len() / (self.layout.channels as usize * 4));
                let dropped = self.stats.dropped_chunks.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped % 64 == 1 {
                    log::warn!("Dropping audio chunks due to queue backpressure ({} so far)", dropped);
                }
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(CaptureError::WriterEncode("ffmpeg audio socket closed".into())),
        }
    }

    fn silence(&self, frames: usize) -> Vec<u8> {
        vec![0u8; frames * self.layout.channels as usize * 4]
    }
}

struct ActiveEncode {
    path: PathBuf,
    child: Child,
    stdin: Option<ChildStdin>,
    layout: SegmentLayout,
    video: VideoAligner,
    previous_frame: Option<Vec<u8>>,
    dropped_frames: u64,
    audio: Option<AudioFeed>,
    stderr_hints: Arc<Mutex<Vec<String>>>,
    stderr_thread: Option<JoinHandle<()>>,
}

impl ActiveEncode {
    fn hints(&self) -> String {
        self.stderr_hints.lock().join(" | ")
    }

    fn write_video_bytes(&mut self, bytes: &[u8]) -> Result<(), CaptureError> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(CaptureError::WriterEncode("ffmpeg stdin already closed".into()));
        };
        let result = stdin.write_all(bytes);
        result.map_err(|e| CaptureError::WriterEncode(format!("failed to write frame to ffmpeg: {} {}", e, self.hints())))
    }

    /// Keep the audio stream within the lag allowance of the video stream.
    fn pad_audio_to_video(&mut self) -> Result<(), CaptureError> {
        let Some(feed) = self.audio.as_mut() else {
            return Ok(());
        };
        let sample_base = Rational::new(1, feed.layout.sample_rate as i64);
        let video_samples = rescale(self.video.next_pts(), self.layout.frame_rate.time_base(), sample_base);
        let allowance = (AUDIO_LAG_ALLOWANCE.as_secs_f64() * feed.layout.sample_rate as f64) as i64;
        let fill = feed.aligner.fill_to(video_samples - allowance);
        if fill > 0 {
            let chunk = feed.silence(fill);
            feed.send(chunk)?;
        }
        Ok(())
    }
}

/// Default `MediaSink`: encodes through an external ffmpeg process.
pub struct FfmpegSink {
    active: Option<ActiveEncode>,
}

impl FfmpegSink {
    pub fn new() -> Self {
        Self { active: None }
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.active.as_ref().map(|a| a.path.as_path())
    }
}

impl Default for FfmpegSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaSink for FfmpegSink {
    fn open(&mut self, path: &Path, layout: &SegmentLayout) -> Result<(), CaptureError> {
        if self.active.is_some() {
            return Err(CaptureError::WriterOpen("ffmpeg sink already has an open segment".into()));
        }

        let listener = match layout.audio {
            Some(_) => Some(bind_audio_listener()?),
            None => None,
        };
        let audio_port = listener.as_ref().map(|(_, port)| *port);
        let args = build_args(layout, path, audio_port);
        log::info!(
            "Starting ffmpeg for {} ({}x{} @ {}/{}, audio: {})",
            path.display(),
            layout.width,
            layout.height,
            layout.frame_rate.num,
            layout.frame_rate.den,
            layout.audio.is_some()
        );
        log::debug!("ffmpeg args: {:?}", args);

        let mut command = Command::new(&layout.encoder.ffmpeg_path);
        #[cfg(target_os = "windows")]
        command.creation_flags(CREATE_NO_WINDOW);
        command
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| {
            CaptureError::WriterOpen(format!(
                "failed to start {}: {}",
                layout.encoder.ffmpeg_path.display(),
                e
            ))
        })?;
        let stdin = child.stdin.take();
        let (stderr_hints, stderr_thread) = spawn_stderr_reader(&mut child);

        let audio = match (layout.audio, listener) {
            (Some(audio_layout), Some((listener, _))) => {
                let sample_rate = audio_layout.sample_rate as f64;
                let feed = spawn_audio_feed(listener, audio_layout, (MAX_GAP_FILL.as_secs_f64() * sample_rate) as i64);
                match feed {
                    Ok(mut feed) => {
                        let prime = feed.aligner.fill_to((PRIME_SILENCE.as_secs_f64() * sample_rate) as i64);
                        let chunk = feed.silence(prime);
                        if let Err(e) = feed.send(chunk) {
                            let _ = child.kill();
                            let _ = child.wait();
                            return Err(CaptureError::WriterOpen(e.to_string()));
                        }
                        Some(feed)
                    }
                    Err(e) => {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(e);
                    }
                }
            }
            _ => None,
        };

        let max_fill_frames = (MAX_GAP_FILL.as_secs_f64() * layout.frame_rate.fps()) as i64;
        self.active = Some(ActiveEncode {
            path: path.to_path_buf(),
            child,
            stdin,
            layout: layout.clone(),
            video: VideoAligner::new(max_fill_frames),
            previous_frame: None,
            dropped_frames: 0,
            audio,
            stderr_hints,
            stderr_thread,
        });
        Ok(())
    }

    fn write_video(&mut self, frame: &Yuv420Frame, pts: i64) -> Result<(), CaptureError> {
        let Some(active) = self.active.as_mut() else {
            return Err(CaptureError::WriterEncode("ffmpeg sink is not open".into()));
        };
        if frame.width != active.layout.width || frame.height != active.layout.height {
            return Err(CaptureError::WriterEncode(format!(
                "frame {}x{} does not match stream {}x{}",
                frame.width, frame.height, active.layout.width, active.layout.height
            )));
        }

        let repeats = match active.video.plan(pts) {
            VideoPlan::Drop => {
                active.dropped_frames += 1;
                if active.dropped_frames % 100 == 1 {
                    log::debug!("Dropped late video frame at pts {} ({} so far)", pts, active.dropped_frames);
                }
                return Ok(());
            }
            VideoPlan::Write { repeat_previous } => repeat_previous,
        };

        let mut packed = Vec::with_capacity(frame.byte_len());
        packed.extend_from_slice(&frame.y);
        packed.extend_from_slice(&frame.u);
        packed.extend_from_slice(&frame.v);

        if repeats > 0 {
            let filler = active.previous_frame.take().unwrap_or_else(|| packed.clone());
            for _ in 0..repeats {
                active.write_video_bytes(&filler)?;
            }
        }
        active.write_video_bytes(&packed)?;
        active.previous_frame = Some(packed);
        active.pad_audio_to_video()
    }

    fn write_audio(&mut self, frame: &AudioFrame, pts: i64) -> Result<(), CaptureError> {
        let Some(active) = self.active.as_mut() else {
            return Err(CaptureError::WriterEncode("ffmpeg sink is not open".into()));
        };
        let Some(feed) = active.audio.as_mut() else {
            return Ok(());
        };

        let plan = feed.aligner.plan(pts, frame.frames());
        let mut chunk = feed.silence(plan.silence);
        let data = interleave_f32le(frame);
        let bytes_per_frame = frame.channels() * 4;
        chunk.extend_from_slice(&data[(plan.skip * bytes_per_frame).min(data.len())..]);
        if chunk.is_empty() {
            return Ok(());
        }
        feed.send(chunk)
    }

    fn finish(&mut self) -> Result<(), CaptureError> {
        let Some(mut active) = self.active.take() else {
            return Ok(());
        };

        // EOF on stdin ends the video input.
        drop(active.stdin.take());

        if let Some(mut feed) = active.audio.take() {
            drop(feed.tx.take());
            let _ = feed.stop_tx.send(());
            if let Some(handle) = feed.writer_thread.take() {
                match handle.join() {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => log::warn!("Audio feed ended with error: {}", e),
                    Err(_) => log::error!("Audio feed thread panicked"),
                }
            }
            log::debug!(
                "Audio feed: {} queued, {} written, {} dropped",
                feed.stats.queued_chunks.load(Ordering::Relaxed),
                feed.stats.written_chunks.load(Ordering::Relaxed),
                feed.stats.dropped_chunks.load(Ordering::Relaxed)
            );
        }

        let status = wait_with_timeout(&mut active.child, FINISH_TIMEOUT);
        if let Some(handle) = active.stderr_thread.take() {
            if handle.join().is_err() {
                log::warn!("ffmpeg stderr reader panicked");
            }
        }

        match status {
            Ok((status, false)) if status.success() => {
                log::info!("ffmpeg finished {}", active.path.display());
                Ok(())
            }
            Ok((status, killed)) => {
                let hints = active.hints();
                if !hints.is_empty() {
                    log::warn!("ffmpeg stderr: {}", hints);
                }
                Err(CaptureError::WriterEncode(format!(
                    "ffmpeg {} for {}: {}",
                    if killed { "was killed after timeout" } else { "failed" },
                    active.path.display(),
                    if hints.is_empty() { status.to_string() } else { hints }
                )))
            }
            Err(e) => Err(CaptureError::WriterEncode(format!("failed to wait for ffmpeg: {}", e))),
        }
    }

    fn is_open(&self) -> bool {
        self.active.is_some()
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if self.active.is_some() {
            if let Err(e) = self.finish() {
                log::warn!("ffmpeg sink dropped with open segment: {}", e);
            }
        }
    }
}

fn bind_audio_listener() -> Result<(TcpListener, u16), CaptureError> {
    let listener = TcpListener::bind(("127.0.0.1", 0))
        .map_err(|e| CaptureError::WriterOpen(format!("failed to allocate local audio listener: {}", e)))?;
    listener
        .set_nonblocking(true)
        .map_err(|e| CaptureError::WriterOpen(format!("failed to configure audio listener: {}", e)))?;
    let port = listener
        .local_addr()
        .map(|addr| addr.port())
        .map_err(|e| CaptureError::WriterOpen(format!("failed to resolve audio listener port: {}", e)))?;
    Ok((listener, port))
}

fn spawn_audio_feed(listener: TcpListener, layout: AudioLayout, max_fill: i64) -> Result<AudioFeed, CaptureError> {
    let (tx, rx) = mpsc::sync_channel::<Vec<u8>>(AUDIO_QUEUE_CAPACITY);
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    let stats = Arc::new(AudioFeedStats::default());
    let thread_stats = Arc::clone(&stats);

    let writer_thread = thread::Builder::new()
        .name("ffmpeg-audio-feed".into())
        .spawn(move || run_audio_feed(listener, rx, stop_rx, thread_stats))
        .map_err(|e| CaptureError::WriterOpen(format!("failed to spawn audio feed thread: {}", e)))?;

    Ok(AudioFeed {
        tx: Some(tx),
        stop_tx,
        writer_thread: Some(writer_thread),
        aligner: AudioAligner::new(max_fill),
        layout,
        stats,
    })
}

fn run_audio_feed(
    listener: TcpListener,
    rx: Receiver<Vec<u8>>,
    stop_rx: Receiver<()>,
    stats: Arc<AudioFeedStats>,
) -> Result<(), String> {
    let mut stop_requested_at: Option<Instant> = None;
    let mut stream = loop {
        match listener.accept() {
            Ok((stream, _)) => {
                log::debug!("ffmpeg audio socket connected");
                break stream;
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                if stop_requested_at.is_none() && stop_rx.try_recv().is_ok() {
                    stop_requested_at = Some(Instant::now());
                }
                if stop_requested_at.is_some_and(|at| at.elapsed() >= AUDIO_ACCEPT_GRACE) {
                    return Err("ffmpeg never connected to the audio socket".into());
                }
                thread::sleep(AUDIO_ACCEPT_WAIT);
            }
            Err(e) => return Err(format!("failed to accept audio socket: {}", e)),
        }
    };

    if let Err(e) = stream.set_nonblocking(false) {
        log::debug!("Failed to make audio socket blocking: {}", e);
    }
    let _ = stream.set_nodelay(true);

    loop {
        match rx.recv_timeout(Duration::from_millis(10)) {
            Ok(chunk) => {
                stats.written_chunks.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = stream.write_all(&chunk) {
                    return Err(format!("failed to write audio to ffmpeg: {}", e));
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    let _ = stream.flush();
    Ok(())
}

fn spawn_stderr_reader(child: &mut Child) -> (Arc<Mutex<Vec<String>>>, Option<JoinHandle<()>>) {
    let hints: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let thread_hints = Arc::clone(&hints);

    let handle = child.stderr.take().and_then(|stderr| {
        thread::Builder::new()
            .name("ffmpeg-stderr".into())
            .spawn(move || {
                for line in BufReader::new(stderr).lines() {
                    match line {
                        Ok(content) => {
                            let trimmed = content.trim();
                            if trimmed.is_empty() || is_progress_line(trimmed) {
                                continue;
                            }
                            log::debug!("ffmpeg: {}", trimmed);
                            let mut hints = thread_hints.lock();
                            if hints.len() < STDERR_HINT_LIMIT {
                                hints.push(trimmed.to_string());
                            }
                        }
                        Err(e) => {
                            log::warn!("Failed to read ffmpeg stderr: {}", e);
                            break;
                        }
                    }
                }
            })
            .map_err(|e| log::warn!("Failed to spawn ffmpeg stderr reader: {}", e))
            .ok()
    });
    (hints, handle)
}

/// Wait for the child, killing it after `timeout`. Returns the status and
/// whether a kill was needed.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> std::io::Result<(ExitStatus, bool)> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((status, false));
        }
        if Instant::now() >= deadline {
            log::warn!("ffmpeg did not exit within {:?}; killing it", timeout);
            if let Err(e) = child.kill() {
                log::warn!("Failed to kill ffmpeg: {}", e);
            }
            return child.wait().map(|status| (status, true));
        }
        thread::sleep(Duration::from_millis(25));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::EncoderProfile;
    use crate::timing::frame_rate::FrameRate;

    #[test]
    fn dropped_audio_chunk_is_refilled_with_silence() {
        let (listener, _) = bind_audio_listener().unwrap();
        let mut feed = spawn_audio_feed(listener, AudioLayout::default(), 48_000).unwrap();

        // Nothing connects to the socket, so the queue is never drained.
        for i in 0..=AUDIO_QUEUE_CAPACITY as i64 {
            assert_eq!(feed.aligner.plan(i * 480, 480), AudioPlan { silence: 0, skip: 0 });
            let chunk = feed.silence(480);
            feed.send(chunk).unwrap();
        }
        assert_eq!(feed.stats.dropped_chunks.load(Ordering::Relaxed), 1);

        let queued = AUDIO_QUEUE_CAPACITY as i64 * 480;
        assert_eq!(feed.aligner.next(), queued);
        let plan = feed.aligner.plan(queued + 480, 480);
        assert_eq!(plan, AudioPlan { silence: 480, skip: 0 });

        let _ = feed.stop_tx.send(());
    }

    fn layout(audio: bool) -> SegmentLayout {
        SegmentLayout {
            width: 1280,
            height: 720,
            frame_rate: FrameRate::new(30000, 1001),
            audio: audio.then(AudioLayout::default),
            encoder: EncoderProfile::default(),
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Vec<&'a str> {
        args.windows(2).filter(|w| w[0] == flag).map(|w| w[1].as_str()).collect()
    }

    #[test]
    fn video_only_args() {
        let args = build_args(&layout(false), Path::new("/rec/cam.mkv"), None);
        assert_eq!(value_after(&args, "-i"), vec!["pipe:0"]);
        assert_eq!(value_after(&args, "-video_size"), vec!["1280x720"]);
        assert_eq!(value_after(&args, "-framerate"), vec!["30000/1001"]);
        assert_eq!(value_after(&args, "-map"), vec!["0:v:0"]);
        assert!(args.contains(&"-an".to_string()));
        assert_eq!(value_after(&args, "-f"), vec!["rawvideo", "matroska"]);
        assert_eq!(args.last().map(String::as_str), Some("/rec/cam.mkv"));
    }

    #[test]
    fn audio_args_put_socket_input_first() {
        let args = build_args(&layout(true), Path::new("/rec/cam.mkv"), Some(40123));
        assert_eq!(value_after(&args, "-i"), vec!["tcp://127.0.0.1:40123", "pipe:0"]);
        assert_eq!(value_after(&args, "-map"), vec!["1:v:0", "0:a:0"]);
        assert_eq!(value_after(&args, "-c:a"), vec!["aac"]);
        assert_eq!(value_after(&args, "-b:a"), vec!["192k"]);
        assert_eq!(value_after(&args, "-c:v"), vec!["libx264"]);
        assert!(!args.contains(&"-an".to_string()));
    }

    #[test]
    fn video_aligner_repeats_and_drops() {
        let mut aligner = VideoAligner::new(300);
        assert_eq!(aligner.plan(0), VideoPlan::Write { repeat_previous: 0 });
        assert_eq!(aligner.plan(1), VideoPlan::Write { repeat_previous: 0 });
        assert_eq!(aligner.plan(4), VideoPlan::Write { repeat_previous: 2 });
        assert_eq!(aligner.plan(4), VideoPlan::Drop);
        assert_eq!(aligner.plan(3), VideoPlan::Drop);
        assert_eq!(aligner.next_pts(), 5);
    }

    #[test]
    fn video_gap_fill_is_capped() {
        let mut aligner = VideoAligner::new(10);
        aligner.plan(0);
        assert_eq!(aligner.plan(1_000), VideoPlan::Write { repeat_previous: 10 });
        assert_eq!(aligner.next_pts(), 12);
    }

    #[test]
    fn audio_aligner_fills_and_trims() {
        let mut aligner = AudioAligner::new(48_000 * 5);
        assert_eq!(aligner.plan(0, 480), AudioPlan { silence: 0, skip: 0 });
        assert_eq!(aligner.plan(960, 480), AudioPlan { silence: 480, skip: 0 });
        assert_eq!(aligner.next(), 1_440);
        assert_eq!(aligner.plan(1_400, 480), AudioPlan { silence: 0, skip: 40 });
        assert_eq!(aligner.next(), 1_880);
        // Fully overlapping data is discarded.
        assert_eq!(aligner.plan(0, 100), AudioPlan { silence: 0, skip: 100 });
        assert_eq!(aligner.next(), 1_880);
    }

    #[test]
    fn audio_fill_to_only_moves_forward() {
        let mut aligner = AudioAligner::new(1_000);
        assert_eq!(aligner.fill_to(960), 960);
        assert_eq!(aligner.fill_to(500), 0);
        assert_eq!(aligner.plan(0, 480), AudioPlan { silence: 0, skip: 480 });
    }

    #[test]
    fn progress_lines_are_recognized() {
        assert!(is_progress_line("frame=  120 fps= 30 q=23.0 size=1024kB time=00:00:04.00 speed=1.0x"));
        assert!(!is_progress_line("Unknown encoder 'libx264'"));
    }

    #[test]
    fn missing_binary_fails_open_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let mut layout = layout(true);
        layout.encoder.ffmpeg_path = PathBuf::from("/nonexistent/ffmpeg-binary");
        let mut sink = FfmpegSink::new();
        let err = sink.open(&dir.path().join("out.mkv"), &layout).unwrap_err();
        assert!(matches!(err, CaptureError::WriterOpen(_)));
        assert!(!sink.is_open());
        assert!(sink.finish().is_ok());
    }

    #[test]
    fn writes_require_open_sink() {
        let mut sink = FfmpegSink::new();
        let frame = Yuv420Frame {
            width: 2,
            height: 2,
            y: vec![0; 4],
            u: vec![0; 1],
            v: vec![0; 1],
        };
        assert!(sink.write_video(&frame, 0).is_err());
        assert!(sink.write_audio(&AudioFrame::silence(48_000, 2, 10), 0).is_err());
    }
}
