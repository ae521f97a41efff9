use std::path::PathBuf;
use std::sync::Arc;

use super::error::CaptureError;
use super::frame::PreviewImage;
use super::recording_result::RecordingResult;
use super::state::SessionState;

/// Push notifications raised by a capture session.
///
/// Delivered over bounded channels, so they are safe to receive on any
/// thread. `slot` identifies the session within a deck.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A new preview snapshot is available.
    PreviewUpdated { slot: usize, image: Arc<PreviewImage> },

    /// Human-readable status, e.g. "Recording", "No signal".
    StatusChanged {
        slot: usize,
        state: SessionState,
        message: String,
    },

    Error { slot: usize, error: CaptureError },

    /// The first segment of a recording was opened.
    RecordingStarted { slot: usize, path: PathBuf },

    SegmentRolledOver {
        slot: usize,
        index: u32,
        path: PathBuf,
    },

    RecordingStopped {
        slot: usize,
        result: Option<RecordingResult>,
    },
}

impl SessionEvent {
    pub fn slot(&self) -> usize {
        match self {
            Self::PreviewUpdated { slot, .. }
            | Self::StatusChanged { slot, .. }
            | Self::Error { slot, .. }
            | Self::RecordingStarted { slot, .. }
            | Self::SegmentRolledOver { slot, .. }
            | Self::RecordingStopped { slot, .. } => *slot,
        }
    }
}
