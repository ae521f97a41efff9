//! # stream-capture-windows
//!
//! Windows WASAPI backend for stream-capture.
//!
//! Provides:
//! - `WasapiDeviceDirectory`: render-endpoint enumeration and name resolution
//!   via the MMDevice API (the audio half of a `DeviceDirectory`)
//! - `WasapiLoopbackCapture`: shared-mode loopback capture of one render endpoint
//! - `mix_format`: mix format interpretation and packet decoding (all platforms)
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use stream_capture_core::{CaptureSession, DeviceDirectory, EventBus};
//! use stream_capture_windows::WasapiDeviceDirectory;
//!
//! let directory = DeviceDirectory::new(video_backend).with_audio(Arc::new(WasapiDeviceDirectory::new()));
//! let mut session = CaptureSession::new(0, Arc::new(directory), Arc::new(EventBus::default()));
//! ```

pub mod mix_format;

#[cfg(target_os = "windows")]
mod com;
#[cfg(target_os = "windows")]
pub mod device_directory;
#[cfg(target_os = "windows")]
pub mod wasapi_loopback;

#[cfg(target_os = "windows")]
pub use device_directory::WasapiDeviceDirectory;
#[cfg(target_os = "windows")]
pub use wasapi_loopback::WasapiLoopbackCapture;
