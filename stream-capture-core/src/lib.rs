//! # stream-capture-core
//!
//! Platform-agnostic capture-and-mux core library.
//!
//! Records a network video source, plus optionally a system-audio loopback
//! device, into segmented container files. Pause/resume never shows up on the
//! recorded timeline. Platform backends implement the `VideoSourceDirectory` /
//! `AudioDeviceDirectory` traits and plug into the `CaptureSession`.
//!
//! ## Architecture
//!
//! ```text
//! stream-capture-core (this crate)
//! ├── traits/       ← VideoReceiver, VideoSourceDirectory, AudioCapture, AudioDeviceDirectory, MediaSink
//! ├── models/       ← CaptureError, SessionState, SourceSettings, SessionOptions, frames, events
//! ├── timing/       ← Clock, Rational, FrameRate, PtsEstimator, RecordingClock
//! ├── processing/   ← pixel → YUV 4:2:0, interleaved PCM → planar f32
//! ├── writer/       ← MuxingWriter, FfmpegSink, segment naming
//! ├── session/      ← CaptureSession, capture loops, DeviceDirectory, EventBus, SessionDeck
//! └── storage/      ← metadata sidecars, checksums, settings persistence, remux
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod timing;
pub mod traits;
pub mod writer;

#[cfg(test)]
mod testing;

// Re-export key types at crate root for convenience.
pub use models::config::{
    ContainerFormat, EncoderProfile, NoSignalPolicy, RecordingConfig, RemuxSettings, SessionOptions, SourceSettings,
};
pub use models::error::CaptureError;
pub use models::event::SessionEvent;
pub use models::frame::{
    AudioBuffer, AudioFormat, AudioFrame, AudioLayout, InterleavedSamples, PixelFormat, PreviewImage, RawVideoFrame,
    SampleFormat, Yuv420Frame,
};
pub use models::recording_result::{RecordingMetadata, RecordingResult, SegmentInfo};
pub use models::state::SessionState;
pub use session::capture_session::CaptureSession;
pub use session::deck::SessionDeck;
pub use session::directory::DeviceDirectory;
pub use session::events::EventBus;
pub use timing::clock::{Clock, SystemClock};
pub use timing::frame_rate::FrameRate;
pub use timing::pts::{PtsEstimator, UnitDetection};
pub use timing::rational::Rational;
pub use traits::audio_source::{AudioCapture, AudioDeviceDirectory, AudioPoll};
pub use traits::media_sink::{MediaSink, SegmentLayout, SinkFactory};
pub use traits::video_source::{CaptureOutcome, VideoReceiver, VideoSourceDirectory};
pub use writer::ffmpeg_sink::FfmpegSink;
pub use writer::muxing_writer::MuxingWriter;
