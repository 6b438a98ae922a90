//! Backend invocation details: argument layout, split-part naming,
//! diagnostic classification, progress-line parsing
//!
//! The backend is a 7-Zip-compatible binary: `x <archive> -o<dest> -y`
//! with `-bsp1` streaming a percent indicator. For split archives
//! (`bundle.7z.001`, `bundle.7z.002`, ...) only the first part is passed;
//! the backend follows the rest by naming convention.

use std::path::{Path, PathBuf};

/// Suffix of the first part of a split archive
pub const FIRST_PART_SUFFIX: &str = ".001";

/// Arguments for one extraction run
pub fn backend_args(archive: &Path, dest_dir: &Path) -> Vec<String> {
    vec![
        "x".to_string(),
        archive.to_string_lossy().into_owned(),
        format!("-o{}", dest_dir.to_string_lossy()),
        "-y".to_string(),
        "-bsp1".to_string(),
    ]
}

/// Pick the single file handed to the backend
///
/// The only file if there is one; else, among lexicographically sorted
/// names, the one ending in the first split-part suffix; else the first
/// file.
pub fn select_entry_point(files: &[PathBuf]) -> Option<PathBuf> {
    match files {
        [] => None,
        [only] => Some(only.clone()),
        _ => {
            let mut sorted: Vec<&PathBuf> = files.iter().collect();
            sorted.sort();
            sorted
                .iter()
                .find(|p| {
                    p.file_name()
                        .map(|n| n.to_string_lossy().ends_with(FIRST_PART_SUFFIX))
                        .unwrap_or(false)
                })
                .or(sorted.first())
                .map(|p| (*p).clone())
        }
    }
}

/// Parse a backend progress line into a percentage
///
/// Accepts the ` 42% 17 - name` shape; anything without a leading
/// integer-percent token is ignored.
pub fn parse_progress(line: &str) -> Option<u8> {
    let trimmed = line.trim_start();
    let percent_pos = trimmed.find('%')?;
    let digits = &trimmed[..percent_pos];
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let value: u8 = digits.parse().ok()?;
    (value <= 100).then_some(value)
}

/// Whether a diagnostic line is an error report at all
pub fn is_error_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("ERROR") || trimmed.starts_with("Error")
}

/// Whether a diagnostic only reports an unsupported compression method
///
/// Some filters are optional per platform; the backend reports them per
/// entry and still extracts the rest. Matched narrowly on wording — the
/// tests pin the exact phrases so a backend wording change shows up as a
/// test failure instead of silently flipping severity.
pub fn is_unsupported_method(line: &str) -> bool {
    let lower = line.to_lowercase();
    lower.contains("unsupported method") || lower.contains("unsupported filter")
}
