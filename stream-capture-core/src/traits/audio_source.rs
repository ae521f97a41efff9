use crate::models::error::CaptureError;
use crate::models::frame::{AudioBuffer, AudioFormat};

/// Result of one non-blocking check of an audio client.
#[derive(Debug)]
pub enum AudioPoll {
    Data(AudioBuffer),
    /// A packet was available but carried no frames.
    Empty,
    /// No packet is ready yet.
    Unavailable,
}

/// A shared-mode, loopback-capable audio capture client.
///
/// Implemented by:
/// - `WasapiLoopbackCapture` (Windows)
///
/// The client is resolved and driven on the audio capture thread.
pub trait AudioCapture: Send {
    /// Native mix format the client delivers.
    fn format(&self) -> AudioFormat;

    fn start(&mut self) -> Result<(), CaptureError>;

    /// Fetch the next available buffer without blocking.
    fn poll(&mut self) -> Result<AudioPoll, CaptureError>;

    fn stop(&mut self) -> Result<(), CaptureError>;
}

/// Enumerates audio devices and resolves them to capture clients.
pub trait AudioDeviceDirectory: Send + Sync {
    fn list_audio_devices(&self) -> Result<Vec<String>, CaptureError>;

    /// Resolve a device by its friendly name. `Device` error if not found.
    fn resolve_audio_device(&self, name: &str) -> Result<Box<dyn AudioCapture>, CaptureError>;
}
