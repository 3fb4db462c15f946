use crate::error::{Error, ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use omni_extract::models::{Dimensions, MediaRecord, Technical};
use time::{PrimitiveDateTime, UtcDateTime};

/// Converts an optional integer between widths, naming the field on failure.
fn convert<T, U: TryFrom<T>>(value: Option<T>, field: &'static str) -> Result<Option<U>> {
    value.map(|v| U::try_from(v).ok().ok_or_raise(|| ErrorKind::InvalidData(field))).transpose()
}

#[derive(sqlx::FromRow)]
pub(crate) struct MediaRow {
    pub(crate) fingerprint_id: i64,
    pub(crate) media_type: String,
    pub(crate) kind: String,
    pub(crate) title: String,
    pub(crate) year: Option<i64>,
    pub(crate) season: Option<i64>,
    pub(crate) episode: Option<i64>,
    pub(crate) artist: Option<String>,
    pub(crate) album: Option<String>,
    pub(crate) track: Option<i64>,
    pub(crate) width: Option<i64>,
    pub(crate) height: Option<i64>,
    pub(crate) camera: Option<String>,
    pub(crate) captured_at: Option<i64>,
    pub(crate) resolution: Option<String>,
    pub(crate) source: Option<String>,
    pub(crate) container: Option<String>,
    pub(crate) video_codec: Option<String>,
    pub(crate) audio_codec: Option<String>,
    pub(crate) duration_ms: Option<i64>,
    pub(crate) bitrate: Option<i64>,
    pub(crate) sample_rate: Option<i64>,
    pub(crate) channels: Option<i64>,
    pub(crate) extracted_at: i64,
}
impl MediaRow {
    pub(crate) fn new(fingerprint_id: i64, record: &MediaRecord) -> Result<Self> {
        let technical = &record.technical;
        Ok(Self {
            fingerprint_id,
            media_type: record.media_type.as_str().to_string(),
            kind: record.kind.as_str().to_string(),
            title: record.title.clone(),
            year: record.year.map(i64::from),
            season: record.season.map(i64::from),
            episode: record.episode.map(i64::from),
            artist: record.artist.clone(),
            album: record.album.clone(),
            track: record.track.map(i64::from),
            width: record.dimensions.map(|d| i64::from(d.width)),
            height: record.dimensions.map(|d| i64::from(d.height)),
            camera: record.camera.clone(),
            captured_at: record.captured_at.map(|at| at.assume_utc().unix_timestamp()),
            resolution: record.resolution.clone(),
            source: record.source.clone(),
            container: technical.container.clone(),
            video_codec: technical.video_codec.clone(),
            audio_codec: technical.audio_codec.clone(),
            duration_ms: convert(technical.duration_ms, "duration")?,
            bitrate: convert(technical.bitrate, "bitrate")?,
            sample_rate: technical.sample_rate.map(i64::from),
            channels: technical.channels.map(i64::from),
            extracted_at: record.extracted_at.unix_timestamp(),
        })
    }
}
impl TryFrom<MediaRow> for MediaRecord {
    type Error = Error;
    fn try_from(row: MediaRow) -> Result<Self> {
        let dimensions = match (convert(row.width, "width")?, convert(row.height, "height")?) {
            (Some(width), Some(height)) => Some(Dimensions { width, height }),
            _ => None,
        };
        let captured_at = row
            .captured_at
            .map(|at| {
                UtcDateTime::from_unix_timestamp(at)
                    .map(|at| PrimitiveDateTime::new(at.date(), at.time()))
                    .or_raise(|| ErrorKind::InvalidData("capture time"))
            })
            .transpose()?;
        Ok(Self {
            media_type: row.media_type.parse().ok().ok_or_raise(|| ErrorKind::InvalidData("media type"))?,
            kind: row.kind.parse().ok().ok_or_raise(|| ErrorKind::InvalidData("media kind"))?,
            title: row.title,
            year: convert(row.year, "year")?,
            season: convert(row.season, "season")?,
            episode: convert(row.episode, "episode")?,
            artist: row.artist,
            album: row.album,
            track: convert(row.track, "track")?,
            dimensions,
            camera: row.camera,
            captured_at,
            resolution: row.resolution,
            source: row.source,
            technical: Technical {
                container: row.container,
                video_codec: row.video_codec,
                audio_codec: row.audio_codec,
                duration_ms: convert(row.duration_ms, "duration")?,
                bitrate: convert(row.bitrate, "bitrate")?,
                sample_rate: convert(row.sample_rate, "sample rate")?,
                channels: convert(row.channels, "channels")?,
            },
            extracted_at: UtcDateTime::from_unix_timestamp(row.extracted_at)
                .or_raise(|| ErrorKind::InvalidData("extraction time"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omni_extract::models::{MediaKind, MediaType};
    use time::macros::datetime;

    #[test]
    fn test_row_round_trip_drops_subsecond_times() {
        let record = MediaRecord {
            media_type: MediaType::Image,
            kind: MediaKind::Image,
            title: "IMG 0001".to_string(),
            year: None,
            season: None,
            episode: None,
            artist: None,
            album: None,
            track: None,
            dimensions: Some(Dimensions { width: 4000, height: 3000 }),
            camera: Some("Canon EOS 5D".to_string()),
            captured_at: Some(datetime!(2021-06-15 14:30:00)),
            resolution: None,
            source: None,
            technical: Technical { container: Some("jpg".to_string()), ..Default::default() },
            extracted_at: UtcDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
        };
        let back = MediaRecord::try_from(MediaRow::new(3, &record).unwrap()).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_negative_track_is_invalid() {
        let record = MediaRecord::try_from(MediaRow {
            fingerprint_id: 1,
            media_type: "audio".to_string(),
            kind: "music".to_string(),
            title: "Song".to_string(),
            year: None,
            season: None,
            episode: None,
            artist: None,
            album: None,
            track: Some(-1),
            width: None,
            height: None,
            camera: None,
            captured_at: None,
            resolution: None,
            source: None,
            container: None,
            video_codec: None,
            audio_codec: None,
            duration_ms: None,
            bitrate: None,
            sample_rate: None,
            channels: None,
            extracted_at: 0,
        });
        assert!(matches!(&*record.unwrap_err(), ErrorKind::InvalidData("track")));
    }
}
