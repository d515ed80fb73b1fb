use std::path::{Path, PathBuf};

use crate::media::{FormatDescriptor, TrackType};

const DEFAULT_FILENAME: &str = "unknown";
const MAX_FILENAME_CHARS: usize = 200;

/// Make a video title safe to use as a file name on every platform.
pub fn sanitize_filename(input: &str) -> String {
    let invalid_chars = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
    let replaced: String = input
        .chars()
        .map(|c| {
            if invalid_chars.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = replaced.trim_matches(|c| c == '.' || c == ' ');

    if trimmed.is_empty() {
        DEFAULT_FILENAME.to_string()
    } else if trimmed.chars().count() > MAX_FILENAME_CHARS {
        trimmed.chars().take(MAX_FILENAME_CHARS).collect()
    } else {
        trimmed.to_string()
    }
}

/// `<dir>/<sanitized title>.<audio|video>.<ext>`
pub fn track_output_path(
    output_dir: &Path,
    title: &str,
    track: TrackType,
    format: &FormatDescriptor,
) -> PathBuf {
    output_dir.join(format!(
        "{}.{}.{}",
        sanitize_filename(title),
        track,
        format.file_extension()
    ))
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
