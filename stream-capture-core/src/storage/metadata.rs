use std::fs;
use std::path::{Path, PathBuf};

use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingMetadata;

/// `{recording_path}.metadata.json`, e.g. `cam_part01.mkv.metadata.json`.
pub fn sidecar_path(recording_path: &Path) -> PathBuf {
    let mut name = recording_path.file_name().unwrap_or_default().to_os_string();
    name.push(".metadata.json");
    recording_path.with_file_name(name)
}

/// Write segment metadata as a JSON sidecar file alongside the recording.
pub fn write_metadata(metadata: &RecordingMetadata, recording_path: &Path) -> Result<PathBuf, CaptureError> {
    let metadata_path = sidecar_path(recording_path);
    let json = serde_json::to_string_pretty(metadata)
        .map_err(|e| CaptureError::Storage(format!("failed to serialize metadata: {}", e)))?;
    fs::write(&metadata_path, json)
        .map_err(|e| CaptureError::Storage(format!("failed to write metadata: {}", e)))?;
    Ok(metadata_path)
}

/// Read segment metadata from a JSON sidecar file.
pub fn read_metadata(recording_path: &Path) -> Result<RecordingMetadata, CaptureError> {
    let metadata_path = sidecar_path(recording_path);
    let json = fs::read_to_string(&metadata_path)
        .map_err(|e| CaptureError::Storage(format!("failed to read metadata: {}", e)))?;
    let metadata: RecordingMetadata = serde_json::from_str(&json)
        .map_err(|e| CaptureError::Storage(format!("failed to parse metadata: {}", e)))?;
    Ok(metadata)
}
