use super::{Classification, MediaKind, MediaType};
use time::{PrimitiveDateTime, UtcDateTime};

/// Pixel dimensions of an image or video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Raw technical metadata read from a container or stream header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Technical {
    /// Container or file format (`mp4`, `matroska`, `flac`, `jpg`, ...)
    pub container: Option<String>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub duration_ms: Option<u64>,
    /// Overall bitrate in bits per second
    pub bitrate: Option<u64>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u8>,
}

/// Partial record produced by an extractor from the file contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub technical: Technical,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub track: Option<u32>,
    pub year: Option<u16>,
    pub dimensions: Option<Dimensions>,
    /// Camera make and model, from EXIF
    pub camera: Option<String>,
    /// EXIF `DateTimeOriginal`; EXIF carries no timezone.
    pub captured_at: Option<PrimitiveDateTime>,
}

/// The extracted-metadata result for one file, ready to persist against its
/// fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRecord {
    pub media_type: MediaType,
    pub kind: MediaKind,
    pub title: String,
    pub year: Option<u16>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub track: Option<u32>,
    pub dimensions: Option<Dimensions>,
    pub camera: Option<String>,
    pub captured_at: Option<PrimitiveDateTime>,
    pub resolution: Option<String>,
    pub source: Option<String>,
    pub technical: Technical,
    pub extracted_at: UtcDateTime,
}
impl MediaRecord {
    /// Merge what the filename says with what the file says.
    ///
    /// Tags read from an audio file win over the filename for title, year
    /// and track; for video the filename wins (container titles are usually
    /// missing or set by an encoder). A missing bitrate is derived from the
    /// file size and duration.
    pub fn build(classification: Classification, extracted: Extracted, size: u64) -> Self {
        let Classification { media_type, kind, title, year, season, episode, track, resolution, source } = classification;
        let Extracted { mut technical, title: tag_title, artist, album, track: tag_track, year: tag_year, dimensions, camera, captured_at } =
            extracted;

        let (title, year, track) = match kind {
            MediaKind::Music => (
                tag_title.filter(|t| !t.is_empty()).unwrap_or(title),
                tag_year.or(year),
                tag_track.or(track),
            ),
            _ if title.is_empty() => (tag_title.unwrap_or_default(), year.or(tag_year), track),
            _ => (title, year.or(tag_year), track),
        };

        if technical.bitrate.is_none()
            && let Some(duration_ms) = technical.duration_ms.filter(|d| *d > 0)
        {
            technical.bitrate = Some(size.saturating_mul(8_000) / duration_ms);
        }

        Self {
            media_type,
            kind,
            title,
            year,
            season,
            episode,
            artist,
            album,
            track,
            dimensions,
            camera,
            captured_at,
            resolution,
            source,
            technical,
            extracted_at: UtcDateTime::now(),
        }
    }
}
