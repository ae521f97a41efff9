use std::fs;
use std::path::Path;

use crate::models::config::SourceSettings;
use crate::models::error::CaptureError;

/// Persist the per-slot settings as a JSON array.
pub fn save_sources(path: &Path, sources: &[SourceSettings]) -> Result<(), CaptureError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| CaptureError::Storage(format!("failed to create settings directory: {}", e)))?;
        }
    }
    let json = serde_json::to_string_pretty(sources)
        .map_err(|e| CaptureError::Storage(format!("failed to serialize settings: {}", e)))?;
    fs::write(path, json).map_err(|e| CaptureError::Storage(format!("failed to write settings: {}", e)))?;
    log::debug!("Saved {} source settings to {}", sources.len(), path.display());
    Ok(())
}

/// Load persisted settings. A missing file yields an empty list.
pub fn load_sources(path: &Path) -> Result<Vec<SourceSettings>, CaptureError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let json = fs::read_to_string(path).map_err(|e| CaptureError::Storage(format!("failed to read settings: {}", e)))?;
    serde_json::from_str(&json).map_err(|e| CaptureError::Storage(format!("failed to parse settings: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join("sources.json");

        let mut cam = SourceSettings::new("CAM1", "/rec");
        cam.audio_device = Some("Speakers (Realtek)".into());
        cam.segmented = true;
        cam.segment_minutes = 5;
        let sources = vec![cam, SourceSettings::new("CAM2", "/rec")];

        save_sources(&path, &sources).unwrap();
        assert_eq!(load_sources(&path).unwrap(), sources);
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_sources(&dir.path().join("none.json")).unwrap().is_empty());
    }

    #[test]
    fn malformed_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_sources(&path), Err(CaptureError::Storage(_))));
    }
}
