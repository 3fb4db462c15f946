use regex::Regex;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

// All patterns run against a normalised stem: `.` and `_` replaced by spaces.
regex!(SEASON_EPISODE_REGEX, r"(?i)\bS(\d{1,2}) ?E(\d{1,3})\b");
regex!(CROSS_EPISODE_REGEX, r"(?i)\b(\d{1,2})x(\d{2,3})\b");
regex!(YEAR_REGEX, r"\b(19\d{2}|20\d{2})\b");
regex!(RESOLUTION_REGEX, r"(?i)\b(480p|576p|720p|1080p|1440p|2160p|4k)\b");
regex!(SOURCE_REGEX, r"(?i)\b(blu-?ray|bdrip|brrip|web[ -]?dl|web[ -]?rip|hdtv|dvdrip|remux)\b");
regex!(TRACK_PREFIX_REGEX, r"^(\d{1,3}) ?-? +(\S.*)$");
regex!(WHITESPACE_REGEX, r"\s+");
regex!(SEASON_DIR_REGEX, r"(?i)^(?:(?:season|series) ?\d{1,2}|specials)$");

/// Largest `moov` box read into memory.
pub(crate) const MAX_MOOV_BYTES: u64 = 64 * 1024 * 1024;
/// How much of a Matroska or AVI file is read to find its headers.
pub(crate) const HEADER_SCAN_BYTES: u64 = 4 * 1024 * 1024;
/// How much of a JPEG is scanned for a start-of-frame marker when EXIF
/// carries no dimensions.
pub(crate) const JPEG_SCAN_BYTES: u64 = 1024 * 1024;
