//! ID3v2 (2.2, 2.3, 2.4) text frames and the ID3v1 trailer.

use exn::OptionExt;

use crate::extractors::{Bytes, Source, latin1, leading_number, non_empty, read_at, read_exact_at};
use crate::error::{ErrorKind, Result};
use crate::models::Extracted;

const V1_TAG_LEN: u64 = 128;
const HEADER_LEN: u64 = 10;
const FLAG_UNSYNCHRONISATION: u8 = 0x80;
const FLAG_EXTENDED_HEADER: u8 = 0x40;
const FLAG_FOOTER: u8 = 0x10;

fn syncsafe(bytes: [u8; 4]) -> u32 {
    bytes.iter().fold(0, |acc, b| (acc << 7) | u32::from(b & 0x7F))
}

/// Parses an ID3v2 tag at the start of the file. Returns the tags found and
/// the total tag length, which is where the audio stream starts.
///
/// Unknown major versions are skipped over without reading their frames.
pub(crate) fn read_v2(source: &mut dyn Source, size: u64) -> Result<(Extracted, u64)> {
    let header = read_exact_at(source, 0, HEADER_LEN, "ID3v2 header")?;
    let major = header[3];
    let flags = header[5];
    let tag_size = u64::from(syncsafe([header[6], header[7], header[8], header[9]]));
    let footer = if major == 4 && flags & FLAG_FOOTER != 0 { HEADER_LEN } else { 0 };
    let total = HEADER_LEN + tag_size + footer;
    if total > size {
        exn::bail!(ErrorKind::corrupt("truncated ID3v2 tag"));
    }
    if !(2..=4).contains(&major) {
        return Ok((Extracted::default(), total));
    }

    let mut body = read_exact_at(source, HEADER_LEN, tag_size, "ID3v2 tag")?;
    if flags & FLAG_UNSYNCHRONISATION != 0 && major < 4 {
        body = resynchronise(&body);
    }
    let mut bytes = Bytes::new(&body);
    if flags & FLAG_EXTENDED_HEADER != 0 && major > 2 {
        let raw = bytes.array::<4>().ok_or_raise(|| ErrorKind::corrupt("truncated ID3v2 extended header"))?;
        // v2.3 excludes the size field itself, v2.4 includes it.
        let remaining = if major == 3 { u32::from_be_bytes(raw) } else { syncsafe(raw).saturating_sub(4) };
        bytes
            .skip(usize::try_from(remaining).unwrap_or(usize::MAX))
            .ok_or_raise(|| ErrorKind::corrupt("truncated ID3v2 extended header"))?;
    }

    let mut tags = Extracted::default();
    while let Some((id, data)) = next_frame(&mut bytes, major) {
        let Some(text) = text_frame(data) else {
            continue;
        };
        match id.as_str() {
            "TIT2" | "TT2" => tags.title = Some(text),
            "TPE1" | "TP1" => tags.artist = Some(text),
            "TALB" | "TAL" => tags.album = Some(text),
            "TRCK" | "TRK" => tags.track = leading_number(&text),
            "TYER" | "TYE" | "TDRC" => tags.year = leading_number(&text),
            _ => {},
        }
    }
    Ok((tags, total))
}

fn next_frame<'a>(bytes: &mut Bytes<'a>, major: u8) -> Option<(String, &'a [u8])> {
    let (id, size) = if major == 2 {
        (bytes.take(3)?, usize::try_from(bytes.u24_be()?).ok()?)
    } else {
        let id = bytes.take(4)?;
        let raw = bytes.array::<4>()?;
        let size = if major == 4 { syncsafe(raw) } else { u32::from_be_bytes(raw) };
        bytes.skip(2)?; // flags
        (id, usize::try_from(size).ok()?)
    };
    // Padding
    if id[0] == 0 {
        return None;
    }
    let data = bytes.take(size)?;
    Some((String::from_utf8_lossy(id).into_owned(), data))
}

/// Decodes a text frame: one encoding byte, then the text. Only the first
/// of several null-separated values is kept.
fn text_frame(data: &[u8]) -> Option<String> {
    let (&encoding, text) = data.split_first()?;
    let decoded = match encoding {
        0 => return latin1(text),
        1 => utf16(text, None),
        2 => utf16(text, Some(false)),
        3 => String::from_utf8_lossy(text).into_owned(),
        _ => return None,
    };
    non_empty(decoded.split('\0').next().unwrap_or_default())
}

/// UTF-16, big endian when `little_endian` is `Some(false)`, otherwise led
/// by a byte order mark.
fn utf16(text: &[u8], little_endian: Option<bool>) -> String {
    let (little_endian, text) = match (little_endian, text) {
        (Some(le), _) => (le, text),
        (None, [0xFF, 0xFE, rest @ ..]) => (true, rest),
        (None, [0xFE, 0xFF, rest @ ..]) => (false, rest),
        (None, _) => (false, text),
    };
    let units: Vec<u16> = text
        .chunks_exact(2)
        .map(|pair| if little_endian { u16::from_le_bytes([pair[0], pair[1]]) } else { u16::from_be_bytes([pair[0], pair[1]]) })
        .collect();
    String::from_utf16_lossy(&units)
}

/// Undo ID3v2.3 unsynchronisation: every `FF 00` was written for `FF`.
fn resynchronise(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut previous = 0u8;
    for &byte in data {
        if !(previous == 0xFF && byte == 0x00) {
            out.push(byte);
        }
        previous = byte;
    }
    out
}

/// Parses the 128-byte ID3v1 trailer, if there is one.
pub(crate) fn read_v1(source: &mut dyn Source, size: u64) -> Result<Option<Extracted>> {
    if size < V1_TAG_LEN {
        return Ok(None);
    }
    let tag = read_at(source, size - V1_TAG_LEN, V1_TAG_LEN)?;
    if !tag.starts_with(b"TAG") || tag.len() as u64 != V1_TAG_LEN {
        return Ok(None);
    }
    // ID3v1.1 steals the last two comment bytes for a track number.
    let track = (tag[125] == 0 && tag[126] != 0).then_some(u32::from(tag[126]));
    Ok(Some(Extracted {
        title: latin1(&tag[3..33]),
        artist: latin1(&tag[33..63]),
        album: latin1(&tag[63..93]),
        year: latin1(&tag[93..97]).and_then(|y| leading_number(&y)),
        track,
        ..Default::default()
    }))
}

#[cfg(test)]
pub(crate) mod fixtures {
    fn syncsafe_bytes(value: u32) -> [u8; 4] {
        [(value >> 21) as u8 & 0x7F, (value >> 14) as u8 & 0x7F, (value >> 7) as u8 & 0x7F, value as u8 & 0x7F]
    }

    /// ID3v2.3 (or 2.4) tag with UTF-8/Latin-1 text frames.
    pub(crate) fn id3v2(major: u8, frames: &[(&str, &str)]) -> Vec<u8> {
        let mut body = Vec::new();
        for (id, text) in frames {
            let mut payload = vec![if major == 4 { 3 } else { 0 }];
            payload.extend_from_slice(text.as_bytes());
            body.extend_from_slice(id.as_bytes());
            let size = u32::try_from(payload.len()).unwrap();
            body.extend(if major == 4 { syncsafe_bytes(size) } else { size.to_be_bytes() });
            body.extend([0, 0]);
            body.extend(payload);
        }
        body.extend([0u8; 16]); // padding
        let mut tag = vec![b'I', b'D', b'3', major, 0, 0];
        tag.extend(syncsafe_bytes(u32::try_from(body.len()).unwrap()));
        tag.extend(body);
        tag
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::id3v2;
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_v23_frames() {
        let mut data = id3v2(3, &[("TIT2", "Song"), ("TPE1", "Artist"), ("TALB", "Album"), ("TRCK", "4/12"), ("TYER", "1999")]);
        let tag_len = data.len() as u64;
        data.extend([0xFF, 0xFB, 0x90, 0x00]);
        let size = data.len() as u64;
        let (tags, total) = read_v2(&mut Cursor::new(data), size).unwrap();
        assert_eq!(total, tag_len);
        assert_eq!(tags.title.as_deref(), Some("Song"));
        assert_eq!(tags.artist.as_deref(), Some("Artist"));
        assert_eq!(tags.album.as_deref(), Some("Album"));
        assert_eq!(tags.track, Some(4));
        assert_eq!(tags.year, Some(1999));
    }

    #[test]
    fn test_v24_utf8_and_recording_date() {
        let data = id3v2(4, &[("TIT2", "Café"), ("TDRC", "2004-06-01")]);
        let size = data.len() as u64;
        let (tags, _) = read_v2(&mut Cursor::new(data), size).unwrap();
        assert_eq!(tags.title.as_deref(), Some("Café"));
        assert_eq!(tags.year, Some(2004));
    }

    #[test]
    fn test_truncated_tag() {
        let mut data = id3v2(3, &[("TIT2", "Song")]);
        data.truncate(15);
        let size = data.len() as u64;
        let err = read_v2(&mut Cursor::new(data), size).unwrap_err();
        assert!(matches!(&*err, ErrorKind::CorruptFile(_)));
    }

    #[test]
    fn test_utf16_with_bom() {
        assert_eq!(text_frame(&[1, 0xFF, 0xFE, b'H', 0, b'i', 0, 0, 0]).as_deref(), Some("Hi"));
        assert_eq!(text_frame(&[2, 0, b'O', 0, b'k']).as_deref(), Some("Ok"));
    }

    #[test]
    fn test_resynchronise() {
        assert_eq!(resynchronise(&[0xFF, 0x00, 0xE0, 0x01]), vec![0xFF, 0xE0, 0x01]);
    }

    #[test]
    fn test_v1_trailer() {
        let mut tag = vec![0u8; 128];
        tag[0..3].copy_from_slice(b"TAG");
        tag[3..8].copy_from_slice(b"Title");
        tag[33..39].copy_from_slice(b"Artist");
        tag[93..97].copy_from_slice(b"1987");
        tag[126] = 9;
        let mut data = vec![0xAA; 200];
        data.extend(tag);
        let size = data.len() as u64;
        let tags = read_v1(&mut Cursor::new(data), size).unwrap().unwrap();
        assert_eq!(tags.title.as_deref(), Some("Title"));
        assert_eq!(tags.artist.as_deref(), Some("Artist"));
        assert_eq!(tags.album, None);
        assert_eq!(tags.year, Some(1987));
        assert_eq!(tags.track, Some(9));
    }
}
