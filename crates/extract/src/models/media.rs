use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use crate::error::{Error, ErrorKind};

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov", "mkv", "webm", "avi", "wmv", "flv", "mpg", "mpeg", "ts", "m2ts"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "m4a", "aac", "ogg", "oga", "opus", "wav", "wma", "aiff"];
const IMAGE_EXTENSIONS: &[&str] =
    &["jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff", "webp", "heic", "heif", "dng", "cr2", "nef", "arw"];

/// Broad media type, decided by file extension. Selects the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Video,
    Audio,
    Image,
}
impl MediaType {
    pub const ALL: [MediaType; 3] = [Self::Video, Self::Audio, Self::Image];

    /// Media type for a lowercase extension (without the dot).
    pub fn from_extension(extension: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|media_type| media_type.extensions().contains(&extension))
    }

    /// Every extension recognised as this media type.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Video => VIDEO_EXTENSIONS,
            Self::Audio => AUDIO_EXTENSIONS,
            Self::Image => IMAGE_EXTENSIONS,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Image => "image",
        }
    }
}
impl FromStr for MediaType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "video" => Self::Video,
            "audio" | "music" => Self::Audio,
            "image" | "photo" => Self::Image,
            _ => exn::bail!(ErrorKind::UnsupportedFormat(format!("unknown media type: {s}"))),
        })
    }
}
impl Display for MediaType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// What a media file is, as far as a library is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// A video named like a release: it carries a year, resolution or
    /// source tag but no episode marker.
    Movie,
    /// A video with a season/episode marker in its name.
    TvEpisode,
    Music,
    Image,
    /// Any other video (home videos, clips).
    Video,
}
impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::TvEpisode => "tv_episode",
            Self::Music => "music",
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}
impl FromStr for MediaKind {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "movie" => Self::Movie,
            "tv_episode" => Self::TvEpisode,
            "music" => Self::Music,
            "image" => Self::Image,
            "video" => Self::Video,
            _ => exn::bail!(ErrorKind::UnsupportedFormat(format!("unknown media kind: {s}"))),
        })
    }
}
impl Display for MediaKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}
