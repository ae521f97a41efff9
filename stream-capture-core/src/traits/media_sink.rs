use std::path::Path;
use std::sync::Arc;

use crate::models::config::EncoderProfile;
use crate::models::error::CaptureError;
use crate::models::frame::{AudioFrame, AudioLayout, Yuv420Frame};
use crate::timing::frame_rate::FrameRate;

/// Stream layout of one output segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentLayout {
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    pub audio: Option<AudioLayout>,
    pub encoder: EncoderProfile,
}

/// Encoder and container backend behind the MuxingWriter.
///
/// A sink holds at most one open output. `finish` flushes the trailer and
/// releases every encoder resource; a new `open` may only follow it.
pub trait MediaSink: Send {
    fn open(&mut self, path: &Path, layout: &SegmentLayout) -> Result<(), CaptureError>;

    /// `pts` is in the video codec time base (one unit per frame).
    fn write_video(&mut self, frame: &Yuv420Frame, pts: i64) -> Result<(), CaptureError>;

    /// `pts` is in samples at the layout's sample rate.
    fn write_audio(&mut self, frame: &AudioFrame, pts: i64) -> Result<(), CaptureError>;

    fn finish(&mut self) -> Result<(), CaptureError>;

    fn is_open(&self) -> bool;
}

/// Creates a fresh sink for each recording.
pub type SinkFactory = Arc<dyn Fn() -> Box<dyn MediaSink> + Send + Sync>;
