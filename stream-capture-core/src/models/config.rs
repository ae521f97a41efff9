use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::CaptureError;
use super::frame::AudioLayout;
use crate::timing::frame_rate::FrameRate;
use crate::timing::pts::UnitDetection;

/// Per-source settings snapshot.
///
/// Applied to a session atomically; never mutated while a recording runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// Name of the network video source, as enumerated by the directory.
    pub source_name: String,

    /// Friendly name of the loopback audio device, or None for video only.
    pub audio_device: Option<String>,

    /// Directory where recording files are written.
    pub output_folder: PathBuf,

    /// Display label and file name prefix. Blank means "use the source name".
    pub label: String,

    /// Roll over to a new file every `segment_minutes`.
    pub segmented: bool,

    pub segment_minutes: u32,
}

impl SourceSettings {
    pub fn new(source_name: impl Into<String>, output_folder: impl Into<PathBuf>) -> Self {
        Self {
            source_name: source_name.into(),
            output_folder: output_folder.into(),
            ..Default::default()
        }
    }

    /// The label, falling back to the source name when blank.
    pub fn effective_label(&self) -> &str {
        if self.label.trim().is_empty() {
            &self.source_name
        } else {
            &self.label
        }
    }

    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.source_name.trim().is_empty() {
            return Err(CaptureError::Configuration("no video source configured".into()));
        }
        if self.output_folder.as_os_str().is_empty() {
            return Err(CaptureError::Configuration("no output folder configured".into()));
        }
        if self.segmented && self.segment_minutes == 0 {
            return Err(CaptureError::Configuration(
                "segment duration must be at least one minute".into(),
            ));
        }
        Ok(())
    }
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            source_name: String::new(),
            audio_device: None,
            output_folder: PathBuf::new(),
            label: String::new(),
            segmented: false,
            segment_minutes: 20,
        }
    }
}

/// Container formats the writer can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerFormat {
    Matroska,
    Mp4,
}

impl ContainerFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Matroska => "mkv",
            Self::Mp4 => "mp4",
        }
    }

    /// Muxer name passed to ffmpeg's `-f`.
    pub fn muxer(self) -> &'static str {
        match self {
            Self::Matroska => "matroska",
            Self::Mp4 => "mp4",
        }
    }
}

/// Encoder and container choices for the ffmpeg-backed sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderProfile {
    pub ffmpeg_path: PathBuf,
    pub video_codec: String,
    pub preset: String,
    pub crf: u8,
    pub audio_codec: String,
    pub audio_bitrate_kbps: u32,
    pub container: ContainerFormat,
}

impl Default for EncoderProfile {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            video_codec: "libx264".into(),
            preset: "veryfast".into(),
            crf: 23,
            audio_codec: "aac".into(),
            audio_bitrate_kbps: 192,
            container: ContainerFormat::Matroska,
        }
    }
}

/// Configuration for one recording, fixed when the first segment opens.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingConfig {
    pub output_folder: PathBuf,
    pub label: String,
    pub segmented: bool,
    pub segment_minutes: u32,
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    /// None records video only.
    pub audio: Option<AudioLayout>,
    pub encoder: EncoderProfile,
    /// Write a `.metadata.json` sidecar next to each closed segment.
    pub write_metadata: bool,
}

impl RecordingConfig {
    /// Build the writer configuration from a settings snapshot and the
    /// geometry/rate derived from the first frame.
    pub fn from_settings(settings: &SourceSettings, width: u32, height: u32, frame_rate: FrameRate) -> Self {
        Self {
            output_folder: settings.output_folder.clone(),
            label: settings.effective_label().to_string(),
            segmented: settings.segmented,
            segment_minutes: settings.segment_minutes,
            width,
            height,
            frame_rate,
            audio: settings.audio_device.as_ref().map(|_| AudioLayout::default()),
            encoder: EncoderProfile::default(),
            write_metadata: true,
        }
    }

    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.output_folder.as_os_str().is_empty() {
            return Err(CaptureError::Configuration("output folder must be set".into()));
        }
        if self.label.trim().is_empty() {
            return Err(CaptureError::Configuration("label must be set".into()));
        }
        if self.width < 2 || self.height < 2 {
            return Err(CaptureError::Configuration(format!(
                "unsupported frame size: {}x{}",
                self.width, self.height
            )));
        }
        if !self.frame_rate.is_accepted() {
            return Err(CaptureError::Configuration(format!(
                "unsupported frame rate: {}/{}",
                self.frame_rate.num, self.frame_rate.den
            )));
        }
        if self.segmented && self.segment_minutes == 0 {
            return Err(CaptureError::Configuration(
                "segment duration must be at least one minute".into(),
            ));
        }
        if let Some(audio) = &self.audio {
            if audio.sample_rate == 0 {
                return Err(CaptureError::Configuration("audio sample rate must be positive".into()));
            }
            if !(1..=8).contains(&audio.channels) {
                return Err(CaptureError::Configuration(format!(
                    "unsupported audio channel count: {}",
                    audio.channels
                )));
            }
        }
        Ok(())
    }

    /// Wall-clock length of a segment, or None when segmentation is off.
    pub fn segment_duration(&self) -> Option<Duration> {
        if !self.segmented || self.segment_minutes == 0 {
            return None;
        }
        Some(Duration::from_secs(self.segment_minutes as u64 * 60))
    }
}

/// What to do when a source stops delivering frames after recording began.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoSignalPolicy {
    /// Keep polling indefinitely; report "No signal" but never stop.
    RetryForever,
    /// Stop the session with a connection error once the signal has been
    /// missing for this long.
    AbortAfter(Duration),
}

/// Settings for the optional constant-frame-rate remux after stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemuxSettings {
    pub ffmpeg_path: PathBuf,
    pub fps: u32,
}

impl Default for RemuxSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            fps: 60,
        }
    }
}

/// Tunables of a capture session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    /// Bounded wait of each video poll.
    pub poll_timeout: Duration,
    /// Minimum spacing between preview snapshots.
    pub preview_interval: Duration,
    /// Sleep between checks while paused.
    pub paused_sleep: Duration,
    /// Backoff after an empty audio buffer.
    pub audio_empty_backoff: Duration,
    /// Backoff after the audio client reports no buffer available.
    pub audio_unavailable_backoff: Duration,
    /// Consecutive timeouts before the first frame that raise "No signal".
    pub no_signal_threshold: u32,
    pub no_signal_policy: NoSignalPolicy,
    pub unit_detection: UnitDetection,
    /// Rate used when the source reports none or an out-of-range one.
    pub default_frame_rate: FrameRate,
    pub encoder: EncoderProfile,
    pub write_metadata: bool,
    /// Capacity of each event subscriber channel.
    pub event_capacity: usize,
    pub remux: Option<RemuxSettings>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(500),
            preview_interval: Duration::from_millis(200),
            paused_sleep: Duration::from_millis(20),
            audio_empty_backoff: Duration::from_millis(2),
            audio_unavailable_backoff: Duration::from_millis(5),
            no_signal_threshold: 10,
            no_signal_policy: NoSignalPolicy::RetryForever,
            unit_detection: UnitDetection::default(),
            default_frame_rate: FrameRate::DEFAULT,
            encoder: EncoderProfile::default(),
            write_metadata: true,
            event_capacity: 64,
            remux: None,
        }
    }
}
