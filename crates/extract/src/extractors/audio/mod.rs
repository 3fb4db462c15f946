//! Audio tags and stream parameters.
//!
//! Tags are layered: an ID3v2 tag at the head wins, then tags native to the
//! stream (Vorbis comments), then an ID3v1 trailer.

mod flac;
mod id3;
mod mpeg;

use exn::OptionExt;
use tracing::instrument;

use super::riff::{self, RiffForm};
use super::{Bytes, Extractor, Source, isobmff, read_at};
use crate::error::{ErrorKind, Result};
use crate::models::{Extracted, Technical};

/// Enough of an Ogg page to reach the identification header.
const OGG_HEAD_BYTES: u64 = 512;

/// ID3 tags plus MP3, FLAC, WAVE, Ogg and M4A stream parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct AudioExtractor;

impl Extractor for AudioExtractor {
    fn name(&self) -> &'static str {
        "audio"
    }

    #[instrument(level = "trace", skip(self, source))]
    fn extract(&self, source: &mut dyn Source, size: u64) -> Result<Extracted> {
        let head = read_at(source, 0, 16)?;
        if head.len() < 4 {
            exn::bail!(ErrorKind::corrupt("file too short for an audio stream"));
        }
        let (mut tags, start) =
            if head.starts_with(b"ID3") { id3::read_v2(source, size)? } else { (Extracted::default(), 0) };

        let head = read_at(source, start, 16)?;
        let stream = if flac::sniff(&head) {
            flac::read(source, start, size)?
        } else if start == 0 && riff::sniff(&head) == Some(RiffForm::Wave) {
            Extracted { technical: riff::extract_wave(source, size)?, ..Default::default() }
        } else if head.starts_with(b"OggS") {
            read_ogg(&read_at(source, start, OGG_HEAD_BYTES)?)?
        } else if start == 0 && isobmff::sniff(&head) {
            isobmff::extract(source, size)?
        } else if let Some((offset, frame)) = mpeg::find_frame(source, start)? {
            let trailer = if id3::read_v1(source, size)?.is_some() { 128 } else { 0 };
            let stream_bytes = size.saturating_sub(offset + trailer);
            Extracted {
                technical: Technical {
                    container: Some(frame.codec.to_string()),
                    audio_codec: Some(frame.codec.to_string()),
                    // Constant bitrate estimate; kbit/s is bits per millisecond.
                    duration_ms: Some(stream_bytes * 8 / u64::from(frame.bitrate_kbps)),
                    bitrate: Some(u64::from(frame.bitrate_kbps) * 1000),
                    sample_rate: Some(frame.sample_rate),
                    channels: Some(frame.channels),
                    ..Default::default()
                },
                ..Default::default()
            }
        } else if start > 0 {
            exn::bail!(ErrorKind::corrupt("no audio stream after ID3v2 tag"))
        } else {
            exn::bail!(ErrorKind::UnsupportedFormat("unrecognised audio stream".to_string()))
        };

        tags.technical = stream.technical.clone();
        fill_missing(&mut tags, stream);
        if let Some(v1) = id3::read_v1(source, size)? {
            fill_missing(&mut tags, v1);
        }
        Ok(tags)
    }
}

fn fill_missing(target: &mut Extracted, from: Extracted) {
    target.title = target.title.take().or(from.title);
    target.artist = target.artist.take().or(from.artist);
    target.album = target.album.take().or(from.album);
    target.track = target.track.or(from.track);
    target.year = target.year.or(from.year);
}

/// Identification header of the first logical stream in an Ogg file.
fn read_ogg(page: &[u8]) -> Result<Extracted> {
    let segments = usize::from(*page.get(26).ok_or_raise(|| ErrorKind::corrupt("truncated Ogg page"))?);
    let packet = page.get(27 + segments..).unwrap_or_default();
    let mut technical = Technical { container: Some("ogg".to_string()), ..Default::default() };
    if let Some(header) = packet.strip_prefix(b"\x01vorbis") {
        let mut bytes = Bytes::new(header);
        bytes.skip(4); // version
        technical.audio_codec = Some("vorbis".to_string());
        technical.channels = bytes.u8();
        technical.sample_rate = bytes.u32_le();
    } else if let Some(header) = packet.strip_prefix(b"OpusHead") {
        technical.audio_codec = Some("opus".to_string());
        technical.channels = header.get(1).copied();
        // Opus always decodes at 48 kHz, whatever the input rate was.
        technical.sample_rate = Some(48_000);
    } else if packet.starts_with(b"\x7fFLAC") {
        technical.audio_codec = Some("flac".to_string());
    } else {
        exn::bail!(ErrorKind::UnsupportedFormat("unknown Ogg stream".to_string()));
    }
    Ok(Extracted { technical, ..Default::default() })
}

#[cfg(test)]
mod tests {
    use super::flac::fixtures::flac;
    use super::id3::fixtures::id3v2;
    use super::*;
    use std::io::Cursor;

    fn run(data: Vec<u8>) -> Result<Extracted> {
        let size = data.len() as u64;
        AudioExtractor.extract(&mut Cursor::new(data), size)
    }

    fn mp3_frames(count: usize) -> Vec<u8> {
        // 128 kbit/s at 44.1 kHz: 417 byte frames
        let mut frame = vec![0u8; 417];
        frame[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0x40]);
        frame.repeat(count)
    }

    #[test]
    fn test_mp3_with_id3v2() {
        let mut data = id3v2(3, &[("TIT2", "Tagged"), ("TPE1", "Someone")]);
        data.extend(mp3_frames(4));
        let extracted = run(data).unwrap();
        assert_eq!(extracted.title.as_deref(), Some("Tagged"));
        assert_eq!(extracted.artist.as_deref(), Some("Someone"));
        assert_eq!(extracted.technical.audio_codec.as_deref(), Some("mp3"));
        assert_eq!(extracted.technical.bitrate, Some(128_000));
        assert_eq!(extracted.technical.sample_rate, Some(44_100));
        // 1668 bytes at 128 bits/ms
        assert_eq!(extracted.technical.duration_ms, Some(104));
    }

    #[test]
    fn test_id3v1_fills_gaps() {
        let mut data = id3v2(3, &[("TIT2", "From v2")]);
        data.extend(mp3_frames(2));
        let mut trailer = vec![0u8; 128];
        trailer[0..3].copy_from_slice(b"TAG");
        trailer[3..10].copy_from_slice(b"From v1");
        trailer[63..68].copy_from_slice(b"Album");
        data.extend(trailer);
        let extracted = run(data).unwrap();
        assert_eq!(extracted.title.as_deref(), Some("From v2"));
        assert_eq!(extracted.album.as_deref(), Some("Album"));
    }

    #[test]
    fn test_flac_behind_id3v2() {
        let mut data = id3v2(4, &[("TALB", "Tagged Album")]);
        data.extend(flac(48_000, 2, 96_000, &["TITLE=Native", "ALBUM=Native Album"]));
        let extracted = run(data).unwrap();
        assert_eq!(extracted.technical.container.as_deref(), Some("flac"));
        assert_eq!(extracted.technical.duration_ms, Some(2000));
        assert_eq!(extracted.title.as_deref(), Some("Native"));
        assert_eq!(extracted.album.as_deref(), Some("Tagged Album"));
    }

    #[test]
    fn test_ogg_vorbis() {
        let mut page = b"OggS".to_vec();
        page.extend([0u8; 22]);
        page.push(1); // one segment
        page.push(30);
        page.extend(b"\x01vorbis");
        page.extend(0u32.to_le_bytes());
        page.push(2);
        page.extend(44_100u32.to_le_bytes());
        page.extend([0u8; 16]);
        let extracted = run(page).unwrap();
        assert_eq!(extracted.technical.audio_codec.as_deref(), Some("vorbis"));
        assert_eq!(extracted.technical.channels, Some(2));
        assert_eq!(extracted.technical.sample_rate, Some(44_100));
    }

    #[test]
    fn test_tag_without_stream_is_corrupt() {
        let data = id3v2(3, &[("TIT2", "Nothing follows")]);
        let err = run(data).unwrap_err();
        assert!(matches!(&*err, ErrorKind::CorruptFile(_)));
    }

    #[test]
    fn test_unrecognised_audio() {
        let err = run(b"plain text, not audio".to_vec()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
    }
}
