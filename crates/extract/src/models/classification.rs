use super::{MediaKind, MediaType};

/// Everything that can be learned about a media file from its path alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub media_type: MediaType,
    pub kind: MediaKind,
    /// Cleaned, human-readable title (separators replaced, release tags
    /// removed).
    pub title: String,
    /// Release year token (1900-2099)
    pub year: Option<u16>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    /// Leading track number of an audio file name (`01 - Title.mp3`)
    pub track: Option<u32>,
    /// Resolution tag, lowercase (`1080p`, `4k`)
    pub resolution: Option<String>,
    /// Release source tag, normalised (`bluray`, `web-dl`, `webrip`, `hdtv`,
    /// `dvdrip`, `remux`)
    pub source: Option<String>,
}
