use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use crate::models::config::{EncoderProfile, RemuxSettings};
use crate::models::error::CaptureError;
use crate::storage::checksum::sha256_file;
use crate::storage::metadata::{read_metadata, sidecar_path, write_metadata};
use crate::writer::naming::temporary_sibling;

/// Arguments that re-encode `input` into `output` at a constant frame rate
/// with the recording's video encoder settings.
pub fn remux_args(input: &Path, output: &Path, fps: u32, encoder: &EncoderProfile) -> Vec<String> {
    vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-map".into(),
        "0".into(),
        "-vf".into(),
        format!("fps={}", fps.max(1)),
        "-fps_mode".into(),
        "cfr".into(),
        "-c:v".into(),
        encoder.video_codec.clone(),
        "-preset".into(),
        encoder.preset.clone(),
        "-crf".into(),
        encoder.crf.to_string(),
        "-c:a".into(),
        "copy".into(),
        output.to_string_lossy().into_owned(),
    ]
}

/// Re-encode one recording in place.
///
/// The new file is written to a temporary sibling and only replaces the
/// original after ffmpeg succeeds; on any failure the temporary file is
/// removed and the original left untouched. Missing or empty inputs are
/// skipped. An existing metadata sidecar gets the new file's checksum.
pub fn remux_file(settings: &RemuxSettings, encoder: &EncoderProfile, path: &Path) -> Result<bool, CaptureError> {
    match fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => {}
        _ => {
            log::debug!("Skipping remux of missing or empty {}", path.display());
            return Ok(false);
        }
    }

    let tmp = temporary_sibling(path);
    let result = run_ffmpeg(settings, encoder, path, &tmp).and_then(|()| {
        fs::rename(&tmp, path).map_err(|e| CaptureError::Remux(format!("failed to replace {}: {}", path.display(), e)))
    });

    if let Err(e) = result {
        if tmp.exists() {
            if let Err(remove_err) = fs::remove_file(&tmp) {
                log::warn!("Failed to remove remux temporary {}: {}", tmp.display(), remove_err);
            }
        }
        return Err(e);
    }

    if let Err(e) = refresh_sidecar(path) {
        log::warn!("Remuxed {} but its metadata is stale: {}", path.display(), e);
    }
    Ok(true)
}

/// Rewrite the checksum of a recording's sidecar, if it has one.
fn refresh_sidecar(path: &Path) -> Result<(), CaptureError> {
    if !sidecar_path(path).exists() {
        return Ok(());
    }
    let mut metadata = read_metadata(path)?;
    metadata.checksum = sha256_file(path)?;
    write_metadata(&metadata, path)?;
    Ok(())
}

fn run_ffmpeg(
    settings: &RemuxSettings,
    encoder: &EncoderProfile,
    input: &Path,
    output: &Path,
) -> Result<(), CaptureError> {
    let result = Command::new(&settings.ffmpeg_path)
        .args(remux_args(input, output, settings.fps, encoder))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| CaptureError::Remux(format!("failed to start {}: {}", settings.ffmpeg_path.display(), e)))?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        return Err(CaptureError::Remux(format!(
            "ffmpeg exited with {}: {}",
            result.status,
            stderr.trim()
        )));
    }
    let produced = fs::metadata(output).map(|m| m.len()).unwrap_or(0);
    if produced == 0 {
        return Err(CaptureError::Remux(format!("ffmpeg produced no output for {}", input.display())));
    }
    Ok(())
}

/// Remux every path on a detached background thread. Failures are logged.
pub fn spawn_remux(
    settings: RemuxSettings,
    encoder: EncoderProfile,
    paths: Vec<PathBuf>,
) -> Option<thread::JoinHandle<()>> {
    if paths.is_empty() {
        return None;
    }
    let spawned = thread::Builder::new().name("remux".into()).spawn(move || {
        for path in &paths {
            match remux_file(&settings, &encoder, path) {
                Ok(true) => log::info!("Remuxed {} to {} fps", path.display(), settings.fps),
                Ok(false) => {}
                Err(e) => log::warn!("Remux of {} failed, keeping original: {}", path.display(), e),
            }
        }
    });
    match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            log::warn!("Failed to spawn remux thread: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing_ffmpeg() -> RemuxSettings {
        RemuxSettings {
            ffmpeg_path: PathBuf::from("/nonexistent/ffmpeg-binary"),
            fps: 30,
        }
    }

    #[test]
    fn args_force_constant_rate() {
        let args = remux_args(Path::new("in.mkv"), Path::new("out.mkv"), 30, &EncoderProfile::default());
        assert!(args.windows(2).any(|w| w[0] == "-vf" && w[1] == "fps=30"));
        assert_eq!(args.last().map(String::as_str), Some("out.mkv"));
    }

    #[test]
    fn args_follow_encoder_profile() {
        let encoder = EncoderProfile {
            video_codec: "libx265".into(),
            preset: "slow".into(),
            crf: 18,
            ..EncoderProfile::default()
        };
        let args = remux_args(Path::new("in.mkv"), Path::new("out.mkv"), 60, &encoder);
        assert!(args.windows(2).any(|w| w[0] == "-c:v" && w[1] == "libx265"));
        assert!(args.windows(2).any(|w| w[0] == "-preset" && w[1] == "slow"));
        assert!(args.windows(2).any(|w| w[0] == "-crf" && w[1] == "18"));
    }

    /// A stand-in ffmpeg that writes fixed bytes to its last argument.
    #[cfg(unix)]
    fn fake_ffmpeg(dir: &Path) -> RemuxSettings {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("fake-ffmpeg.sh");
        fs::write(&script, "#!/bin/sh\nfor last; do :; done\nprintf 'constant rate output' > \"$last\"\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        RemuxSettings {
            ffmpeg_path: script,
            fps: 30,
        }
    }

    #[cfg(unix)]
    #[test]
    fn remux_refreshes_sidecar_checksum() {
        use crate::models::config::{RecordingConfig, SourceSettings};
        use crate::models::recording_result::{RecordingMetadata, SegmentInfo};
        use crate::timing::frame_rate::FrameRate;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cam_part01.mkv");
        fs::write(&path, b"variable rate recording").unwrap();
        let config = RecordingConfig::from_settings(&SourceSettings::new("CAM1", dir.path()), 4, 4, FrameRate::DEFAULT);
        let segment = SegmentInfo {
            index: 1,
            path: path.clone(),
            started_at: chrono::Utc::now(),
            duration_secs: 1.0,
            bytes: 23,
            checksum: sha256_file(&path).unwrap(),
        };
        let original = RecordingMetadata::for_segment("rec-1", "CAM1", &config, &segment);
        write_metadata(&original, &path).unwrap();

        assert!(remux_file(&fake_ffmpeg(dir.path()), &EncoderProfile::default(), &path).unwrap());

        assert_eq!(fs::read(&path).unwrap(), b"constant rate output");
        let refreshed = read_metadata(&path).unwrap();
        assert_ne!(refreshed.checksum, original.checksum);
        assert_eq!(refreshed.checksum, sha256_file(&path).unwrap());
        assert_eq!(refreshed.recording_id, "rec-1");
        assert!(!temporary_sibling(&path).exists());
    }

    #[test]
    fn empty_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.mkv");
        fs::write(&path, b"").unwrap();
        assert!(!remux_file(&missing_ffmpeg(), &EncoderProfile::default(), &path).unwrap());
    }

    #[test]
    fn failure_preserves_original() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cam.mkv");
        fs::write(&path, b"original bytes").unwrap();

        let err = remux_file(&missing_ffmpeg(), &EncoderProfile::default(), &path).unwrap_err();
        assert_eq!(err.kind(), "remux");
        assert_eq!(fs::read(&path).unwrap(), b"original bytes");
        assert!(!temporary_sibling(&path).exists());
    }

    #[test]
    fn background_remux_never_panics() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cam.mkv");
        fs::write(&path, b"data").unwrap();
        let handle = spawn_remux(missing_ffmpeg(), EncoderProfile::default(), vec![path.clone()]).unwrap();
        handle.join().unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"data");
        assert!(spawn_remux(missing_ffmpeg(), EncoderProfile::default(), Vec::new()).is_none());
    }
}
