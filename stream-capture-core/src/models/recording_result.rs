use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::RecordingConfig;

/// One closed output file of a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentInfo {
    /// 1-based, increments on every rollover.
    pub index: u32,
    pub path: PathBuf,
    pub started_at: DateTime<Utc>,
    /// Media duration written to this segment, paused time excluded.
    pub duration_secs: f64,
    pub bytes: u64,
    /// Hex-encoded SHA-256 of the finished file. Empty if it could not be read.
    pub checksum: String,
}

/// Result returned when a capture session stops after recording.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub id: String,
    pub label: String,
    pub segments: Vec<SegmentInfo>,
}

impl RecordingResult {
    pub fn new(label: &str, segments: Vec<SegmentInfo>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            label: label.to_string(),
            segments,
        }
    }

    /// Total media duration across all segments.
    pub fn duration_secs(&self) -> f64 {
        self.segments.iter().map(|s| s.duration_secs).sum()
    }

    pub fn first_path(&self) -> Option<&PathBuf> {
        self.segments.first().map(|s| &s.path)
    }
}

/// Metadata stored as a JSON sidecar next to each segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub recording_id: String,
    pub label: String,
    pub source_name: String,
    pub segment_index: u32,
    pub file_path: String,
    pub duration_secs: f64,
    pub checksum: String,
    pub width: u32,
    pub height: u32,
    /// Frame rate as `"num/den"`.
    pub frame_rate: String,
    pub audio_sample_rate: Option<u32>,
    pub audio_channels: Option<u16>,
    pub created_at: String,
}

impl RecordingMetadata {
    pub fn for_segment(recording_id: &str, source_name: &str, config: &RecordingConfig, segment: &SegmentInfo) -> Self {
        Self {
            recording_id: recording_id.to_string(),
            label: config.label.clone(),
            source_name: source_name.to_string(),
            segment_index: segment.index,
            file_path: segment.path.to_string_lossy().into_owned(),
            duration_secs: segment.duration_secs,
            checksum: segment.checksum.clone(),
            width: config.width,
            height: config.height,
            frame_rate: format!("{}/{}", config.frame_rate.num, config.frame_rate.den),
            audio_sample_rate: config.audio.map(|a| a.sample_rate),
            audio_channels: config.audio.map(|a| a.channels),
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::SourceSettings;
    use crate::timing::frame_rate::FrameRate;

    fn segment(index: u32, secs: f64) -> SegmentInfo {
        SegmentInfo {
            index,
            path: PathBuf::from(format!("/rec/cam_part{:02}.mkv", index)),
            started_at: Utc::now(),
            duration_secs: secs,
            bytes: 1024,
            checksum: "ab".into(),
        }
    }

    #[test]
    fn duration_sums_segments() {
        let result = RecordingResult::new("cam", vec![segment(1, 60.0), segment(2, 5.5)]);
        assert!((result.duration_secs() - 65.5).abs() < 1e-9);
        assert_eq!(result.first_path(), Some(&PathBuf::from("/rec/cam_part01.mkv")));
        assert!(!result.id.is_empty());
    }

    #[test]
    fn metadata_serializes_to_json() {
        let config = RecordingConfig::from_settings(
            &SourceSettings::new("CAM1", "/rec"),
            1280,
            720,
            FrameRate::new(30000, 1001),
        );
        let meta = RecordingMetadata::for_segment("id-1", "CAM1", &config, &segment(2, 60.0));
        assert_eq!(meta.frame_rate, "30000/1001");
        assert_eq!(meta.audio_channels, None);
        let json = serde_json::to_string(&meta).unwrap();
        let back: RecordingMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back.segment_index, 2);
        assert_eq!(back.source_name, "CAM1");
        assert_eq!(back, meta);
    }
}
