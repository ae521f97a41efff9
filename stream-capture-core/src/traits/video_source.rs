use std::time::Duration;

use crate::models::error::CaptureError;
use crate::models::frame::RawVideoFrame;

/// Result of one bounded poll of a video source.
#[derive(Debug)]
pub enum CaptureOutcome {
    Frame(RawVideoFrame),
    /// Nothing arrived within the timeout.
    Timeout,
    /// The connection was lost and will not recover on its own.
    Disconnected(String),
}

/// A live connection to one network video source.
///
/// Created and used on the video capture thread only; dropped by the session
/// after that thread has been joined.
pub trait VideoReceiver: Send {
    /// Block for at most `timeout` waiting for the next frame.
    fn capture(&mut self, timeout: Duration) -> CaptureOutcome;
}

/// Enumerates network video sources and connects to them by name.
pub trait VideoSourceDirectory: Send + Sync {
    /// Names of the currently discoverable sources, in discovery order.
    fn list_video_sources(&self) -> Vec<String>;

    /// Open a receiver bound to `name`.
    fn connect(&self, name: &str) -> Result<Box<dyn VideoReceiver>, CaptureError>;
}
