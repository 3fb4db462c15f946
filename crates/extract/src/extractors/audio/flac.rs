//! Native FLAC: `STREAMINFO` and Vorbis comments.

use crate::extractors::{Bytes, Source, leading_number, non_empty, read_exact_at, to_millis};
use crate::error::{ErrorKind, Result};
use crate::models::{Extracted, Technical};

const MAX_BLOCKS: usize = 128;
const STREAMINFO: u8 = 0;
const VORBIS_COMMENT: u8 = 4;
const MAX_COMMENT_BYTES: u64 = 1024 * 1024;

pub(crate) fn sniff(head: &[u8]) -> bool {
    head.starts_with(b"fLaC")
}

/// Reads the metadata blocks of a FLAC stream starting at `start` (after any
/// ID3v2 tag).
pub(crate) fn read(source: &mut dyn Source, start: u64, size: u64) -> Result<Extracted> {
    let mut extracted = Extracted {
        technical: Technical {
            container: Some("flac".to_string()),
            audio_codec: Some("flac".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    let mut offset = start + 4;
    for index in 0..MAX_BLOCKS {
        let header = read_exact_at(source, offset, 4, "FLAC metadata block header")?;
        let last = header[0] & 0x80 != 0;
        let block_type = header[0] & 0x7F;
        let len = u64::from(u32::from_be_bytes([0, header[1], header[2], header[3]]));
        if offset + 4 + len > size {
            exn::bail!(ErrorKind::corrupt("truncated FLAC metadata block"));
        }
        if index == 0 && block_type != STREAMINFO {
            exn::bail!(ErrorKind::corrupt("FLAC stream does not start with STREAMINFO"));
        }
        match block_type {
            STREAMINFO => {
                let data = read_exact_at(source, offset + 4, len.min(34), "STREAMINFO")?;
                read_streaminfo(&data, &mut extracted.technical);
            },
            VORBIS_COMMENT if len <= MAX_COMMENT_BYTES => {
                let data = read_exact_at(source, offset + 4, len, "Vorbis comment block")?;
                apply_vorbis_comments(&data, &mut extracted);
            },
            _ => {},
        }
        offset += 4 + len;
        if last {
            break;
        }
    }
    Ok(extracted)
}

/// Bytes 10..18 pack sample rate (20 bits), channels - 1 (3), bits per
/// sample - 1 (5) and total samples (36).
fn read_streaminfo(data: &[u8], technical: &mut Technical) {
    let Some(packed) = data.get(10..18).and_then(|b| b.try_into().ok()).map(u64::from_be_bytes) else {
        return;
    };
    let sample_rate = (packed >> 44) as u32;
    let channels = ((packed >> 41) & 0x7) as u8 + 1;
    let total_samples = packed & 0xF_FFFF_FFFF;
    technical.sample_rate = Some(sample_rate).filter(|r| *r > 0);
    technical.channels = Some(channels);
    // Zero total samples means "unknown".
    technical.duration_ms = Some(total_samples).filter(|s| *s > 0).and_then(|s| to_millis(s, u64::from(sample_rate)));
}

/// Vorbis comment block (little endian, shared by FLAC and Ogg Vorbis):
/// vendor string, then `KEY=value` pairs.
pub(crate) fn apply_vorbis_comments(data: &[u8], extracted: &mut Extracted) {
    let mut bytes = Bytes::new(data);
    let Some(vendor_len) = bytes.u32_le().and_then(|len| usize::try_from(len).ok()) else {
        return;
    };
    if bytes.skip(vendor_len).is_none() {
        return;
    }
    let count = bytes.u32_le().unwrap_or_default();
    for _ in 0..count {
        let Some(comment) = bytes.u32_le().and_then(|len| bytes.take(usize::try_from(len).ok()?)) else {
            return;
        };
        let comment = String::from_utf8_lossy(comment);
        let Some((key, value)) = comment.split_once('=') else {
            continue;
        };
        let value = non_empty(value);
        match key.to_ascii_uppercase().as_str() {
            "TITLE" => extracted.title = extracted.title.take().or(value),
            "ARTIST" => extracted.artist = extracted.artist.take().or(value),
            "ALBUM" => extracted.album = extracted.album.take().or(value),
            "TRACKNUMBER" => extracted.track = extracted.track.or(value.and_then(|v| leading_number(&v))),
            "DATE" | "YEAR" => extracted.year = extracted.year.or(value.and_then(|v| leading_number(&v))),
            _ => {},
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// `fLaC` + STREAMINFO (+ optional Vorbis comments).
    pub(crate) fn flac(sample_rate: u32, channels: u8, total_samples: u64, comments: &[&str]) -> Vec<u8> {
        let mut info = vec![0u8; 34];
        let packed = (u64::from(sample_rate) << 44) | (u64::from(channels - 1) << 41) | (15u64 << 36) | total_samples;
        info[10..18].copy_from_slice(&packed.to_be_bytes());

        let mut data = b"fLaC".to_vec();
        let last = if comments.is_empty() { 0x80 } else { 0 };
        data.push(last);
        data.extend(&34u32.to_be_bytes()[1..]);
        data.extend(info);
        if !comments.is_empty() {
            let mut block = 0u32.to_le_bytes().to_vec();
            block.extend(u32::try_from(comments.len()).unwrap().to_le_bytes());
            for comment in comments {
                block.extend(u32::try_from(comment.len()).unwrap().to_le_bytes());
                block.extend_from_slice(comment.as_bytes());
            }
            data.push(0x80 | 4);
            data.extend(&u32::try_from(block.len()).unwrap().to_be_bytes()[1..]);
            data.extend(block);
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::flac;
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_streaminfo_and_comments() {
        let data = flac(44_100, 2, 44_100 * 3, &["TITLE=Track", "artist=Band", "TRACKNUMBER=2/9", "DATE=2011"]);
        let size = data.len() as u64;
        let extracted = read(&mut Cursor::new(data), 0, size).unwrap();
        assert_eq!(extracted.technical.sample_rate, Some(44_100));
        assert_eq!(extracted.technical.channels, Some(2));
        assert_eq!(extracted.technical.duration_ms, Some(3000));
        assert_eq!(extracted.title.as_deref(), Some("Track"));
        assert_eq!(extracted.artist.as_deref(), Some("Band"));
        assert_eq!(extracted.track, Some(2));
        assert_eq!(extracted.year, Some(2011));
    }

    #[test]
    fn test_truncated_block() {
        let mut data = flac(48_000, 1, 0, &[]);
        data.truncate(20);
        let size = data.len() as u64;
        let err = read(&mut Cursor::new(data), 0, size).unwrap_err();
        assert!(matches!(&*err, ErrorKind::CorruptFile(_)));
    }
}
