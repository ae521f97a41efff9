use std::sync::Arc;

use crate::models::error::CaptureError;
use crate::traits::audio_source::{AudioCapture, AudioDeviceDirectory};
use crate::traits::video_source::{VideoReceiver, VideoSourceDirectory};

/// The video and audio device directories, explicitly owned and shared by
/// every session through an `Arc`.
#[derive(Clone)]
pub struct DeviceDirectory {
    video: Arc<dyn VideoSourceDirectory>,
    audio: Option<Arc<dyn AudioDeviceDirectory>>,
}

impl DeviceDirectory {
    pub fn new(video: Arc<dyn VideoSourceDirectory>) -> Self {
        Self { video, audio: None }
    }

    pub fn with_audio(mut self, audio: Arc<dyn AudioDeviceDirectory>) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn list_video_sources(&self) -> Vec<String> {
        self.video.list_video_sources()
    }

    /// Audio device names. Enumeration failures are logged and yield an
    /// empty list.
    pub fn list_audio_devices(&self) -> Vec<String> {
        let Some(audio) = &self.audio else {
            return Vec::new();
        };
        audio.list_audio_devices().unwrap_or_else(|e| {
            log::warn!("Failed to enumerate audio devices: {}", e);
            Vec::new()
        })
    }

    pub fn has_video_source(&self, name: &str) -> bool {
        self.list_video_sources().iter().any(|n| n == name)
    }

    pub fn connect_video(&self, name: &str) -> Result<Box<dyn VideoReceiver>, CaptureError> {
        self.video.connect(name)
    }

    pub fn resolve_audio_device(&self, name: &str) -> Result<Box<dyn AudioCapture>, CaptureError> {
        match &self.audio {
            Some(audio) => audio.resolve_audio_device(name),
            None => Err(CaptureError::Device("no audio backend available".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeAudioDirectory, FakeVideoDirectory};

    #[test]
    fn video_listing_and_lookup() {
        let directory = DeviceDirectory::new(Arc::new(FakeVideoDirectory::endless(&["CAM1", "CAM2"])));
        assert_eq!(directory.list_video_sources(), vec!["CAM1", "CAM2"]);
        assert!(directory.has_video_source("CAM2"));
        assert!(!directory.has_video_source("CAM3"));
        assert!(directory.list_audio_devices().is_empty());
    }

    #[test]
    fn audio_resolution() {
        let directory = DeviceDirectory::new(Arc::new(FakeVideoDirectory::endless(&[]))).with_audio(Arc::new(
            FakeAudioDirectory {
                names: vec!["Speakers".into()],
            },
        ));
        assert_eq!(directory.list_audio_devices(), vec!["Speakers"]);
        assert!(directory.resolve_audio_device("Speakers").is_ok());
        assert!(matches!(
            directory.resolve_audio_device("Headphones"),
            Err(CaptureError::Device(_))
        ));
    }

    #[test]
    fn missing_audio_backend_is_a_device_error() {
        let directory = DeviceDirectory::new(Arc::new(FakeVideoDirectory::endless(&["CAM1"])));
        assert!(matches!(directory.resolve_audio_device("x"), Err(CaptureError::Device(_))));
    }
}
