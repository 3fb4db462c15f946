//! Inline denylist of names that are never media: hidden entries, editor and
//! download leftovers, OS junk. Applied by every backend during a walk so
//! downstream stages never see them.

use std::ffi::OsStr;

/// Suffixes (compared case-insensitively) of temporary files and partial
/// downloads.
const DENIED_SUFFIXES: &[&str] = &[
    "~",
    ".tmp",
    ".temp",
    ".swp",
    ".bak",
    ".part",
    ".partial",
    ".crdownload",
    ".download",
    ".!qb",
];

/// Exact file names (compared case-insensitively) dropped by operating
/// systems into media folders.
const DENIED_NAMES: &[&str] = &["thumbs.db", "desktop.ini", "ehthumbs.db"];

/// Returns `true` if a file or directory with this name must be skipped.
///
/// ```
/// use std::ffi::OsStr;
/// use omni_storage::is_denied;
///
/// assert!(is_denied(OsStr::new(".DS_Store")));
/// assert!(is_denied(OsStr::new("movie.mkv.part")));
/// assert!(!is_denied(OsStr::new("Show.S01E02.mkv")));
/// ```
pub fn is_denied(name: &OsStr) -> bool {
    // Non-UTF8 names aren't denied here; they're still walked and will fail
    // (or not) on their own merits further down the pipeline.
    let Some(name) = name.to_str() else {
        return false;
    };
    if name.is_empty() || name.starts_with('.') {
        return true;
    }
    let lower = name.to_ascii_lowercase();
    DENIED_NAMES.contains(&lower.as_str()) || DENIED_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}
