use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

/// Replace characters that are not valid in file names on common platforms.
pub fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .trim()
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_end_matches(['.', ' ']).to_string();
    if cleaned.is_empty() {
        "recording".to_string()
    } else {
        cleaned
    }
}

/// `{folder}/{label}_{yyyyMMdd_HHmmss}[_partNN].{ext}`
///
/// `part` is only appended for segmented recordings.
pub fn segment_file_name(
    folder: &Path,
    label: &str,
    at: DateTime<Local>,
    part: Option<u32>,
    extension: &str,
) -> PathBuf {
    let stamp = at.format("%Y%m%d_%H%M%S");
    let name = match part {
        Some(index) => format!("{}_{}_part{:02}.{}", sanitize_label(label), stamp, index, extension),
        None => format!("{}_{}.{}", sanitize_label(label), stamp, extension),
    };
    folder.join(name)
}

/// Sibling path used for an in-progress rewrite of `path`.
pub fn temporary_sibling(path: &Path) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned()).unwrap_or_default();
    path.with_file_name(format!("{}.remux.tmp.{}", stem, ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn unsegmented_name_has_no_part() {
        let path = segment_file_name(Path::new("/rec"), "CAM1", at(), None, "mkv");
        assert_eq!(path, PathBuf::from("/rec/CAM1_20240309_140507.mkv"));
    }

    #[test]
    fn part_is_zero_padded() {
        let path = segment_file_name(Path::new("/rec"), "CAM1", at(), Some(3), "mkv");
        assert_eq!(path, PathBuf::from("/rec/CAM1_20240309_140507_part03.mkv"));
        let path = segment_file_name(Path::new("/rec"), "CAM1", at(), Some(12), "mp4");
        assert!(path.ends_with("CAM1_20240309_140507_part12.mp4"));
    }

    #[test]
    fn labels_are_sanitized() {
        assert_eq!(sanitize_label("STUDIO (CAM/1)"), "STUDIO (CAM_1)");
        assert_eq!(sanitize_label("a:b*c?"), "a_b_c_");
        assert_eq!(sanitize_label("  "), "recording");
        assert_eq!(sanitize_label("name. "), "name");
    }

    #[test]
    fn temporary_sibling_keeps_extension() {
        let tmp = temporary_sibling(Path::new("/rec/CAM1_part01.mkv"));
        assert_eq!(tmp, PathBuf::from("/rec/CAM1_part01.remux.tmp.mkv"));
    }
}
