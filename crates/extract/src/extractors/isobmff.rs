//! ISO base media file format (MP4, MOV, M4A).
//!
//! Top-level boxes are walked straight off the source so that `mdat` is
//! never read; only `moov` is pulled into memory and parsed.

use exn::OptionExt;

use super::{Bytes, Source, read_at, read_exact_at, to_millis};
use crate::consts::MAX_MOOV_BYTES;
use crate::error::{ErrorKind, Result};
use crate::models::{Dimensions, Extracted, Technical};

/// Box types that can legitimately open an ISO-BMFF file. Old QuickTime
/// files have no `ftyp`.
pub(crate) fn sniff(head: &[u8]) -> bool {
    matches!(head.get(4..8), Some(b"ftyp" | b"moov" | b"mdat" | b"wide" | b"free" | b"skip"))
}

struct BoxHeader {
    kind: [u8; 4],
    offset: u64,
    header_len: u64,
    size: u64,
}
impl BoxHeader {
    fn payload_offset(&self) -> u64 {
        self.offset + self.header_len
    }

    fn payload_len(&self) -> u64 {
        self.size - self.header_len
    }
}

fn fourcc(kind: &[u8; 4]) -> String {
    String::from_utf8_lossy(kind).into_owned()
}

fn read_header(source: &mut dyn Source, offset: u64, file_size: u64) -> Result<BoxHeader> {
    let raw = read_at(source, offset, 16)?;
    let mut bytes = Bytes::new(&raw);
    let (Some(size32), Some(kind)) = (bytes.u32_be(), bytes.array::<4>()) else {
        exn::bail!(ErrorKind::corrupt("truncated box header"));
    };
    let (size, header_len) = match size32 {
        0 => (file_size - offset, 8),
        1 => (bytes.u64_be().ok_or_raise(|| ErrorKind::corrupt("truncated box header"))?, 16),
        n => (u64::from(n), 8),
    };
    if size < header_len {
        exn::bail!(ErrorKind::corrupt(format!("invalid size for '{}' box", fourcc(&kind))));
    }
    if offset.saturating_add(size) > file_size {
        exn::bail!(ErrorKind::corrupt(format!("truncated '{}' box", fourcc(&kind))));
    }
    Ok(BoxHeader { kind, offset, header_len, size })
}

/// Child boxes of an in-memory box payload.
struct Children<'a> {
    bytes: Bytes<'a>,
}
impl<'a> Children<'a> {
    fn next_box(&mut self) -> Option<([u8; 4], &'a [u8])> {
        let size = self.bytes.u32_be()?;
        let kind = self.bytes.array()?;
        let payload_len = match size {
            0 => self.bytes.remaining(),
            1 => usize::try_from(self.bytes.u64_be()?.checked_sub(16)?).ok()?,
            n => usize::try_from(n).ok()?.checked_sub(8)?,
        };
        Some((kind, self.bytes.take(payload_len)?))
    }
}
impl<'a> Iterator for Children<'a> {
    type Item = Result<([u8; 4], &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.bytes.remaining() == 0 {
            return None;
        }
        match self.next_box() {
            Some(child) => Some(Ok(child)),
            None => {
                self.bytes = Bytes::new(&[]);
                Some(Err(exn::Exn::from(ErrorKind::corrupt("truncated child box"))))
            },
        }
    }
}

fn children(payload: &[u8]) -> Children<'_> {
    Children { bytes: Bytes::new(payload) }
}

fn child<'a>(payload: &'a [u8], kind: &[u8; 4]) -> Result<Option<&'a [u8]>> {
    for entry in children(payload) {
        let (found, body) = entry?;
        if &found == kind {
            return Ok(Some(body));
        }
    }
    Ok(None)
}

#[derive(Default)]
struct Track {
    handler: Option<[u8; 4]>,
    codec: Option<[u8; 4]>,
    dimensions: Option<Dimensions>,
    channels: Option<u8>,
    sample_rate: Option<u32>,
}

pub(crate) fn extract(source: &mut dyn Source, size: u64) -> Result<Extracted> {
    let mut offset = 0;
    let mut brand: Option<[u8; 4]> = None;
    let mut moov = None;
    // Keep walking after `moov`: a download cut short shows up as an
    // `mdat` that runs past the end of the file.
    while offset < size {
        let header = read_header(source, offset, size)?;
        match &header.kind {
            b"ftyp" => brand = read_at(source, header.payload_offset(), 4)?.try_into().ok(),
            b"moov" if moov.is_none() => {
                if header.payload_len() > MAX_MOOV_BYTES {
                    exn::bail!(ErrorKind::corrupt("oversized 'moov' box"));
                }
                moov = Some(read_exact_at(source, header.payload_offset(), header.payload_len(), "'moov' box")?);
            },
            _ => {},
        }
        offset += header.size;
    }
    let moov = moov.ok_or_raise(|| ErrorKind::corrupt("missing 'moov' box"))?;

    let mut extracted = parse_moov(&moov)?;
    extracted.technical.container = Some(container_name(brand.as_ref()).to_string());
    Ok(extracted)
}

fn parse_moov(moov: &[u8]) -> Result<Extracted> {
    let mut technical = Technical::default();
    let mut dimensions = None;
    for entry in children(moov) {
        let (kind, payload) = entry?;
        match &kind {
            b"mvhd" => technical.duration_ms = mvhd_duration(payload),
            b"trak" => {
                let track = parse_trak(payload)?;
                match track.handler.as_ref() {
                    Some(b"vide") if technical.video_codec.is_none() => {
                        technical.video_codec = track.codec.as_ref().map(codec_name);
                        dimensions = track.dimensions;
                    },
                    Some(b"soun") if technical.audio_codec.is_none() => {
                        technical.audio_codec = track.codec.as_ref().map(codec_name);
                        technical.channels = track.channels;
                        technical.sample_rate = track.sample_rate;
                    },
                    _ => {},
                }
            },
            _ => {},
        }
    }
    Ok(Extracted { technical, dimensions, ..Default::default() })
}

fn parse_trak(trak: &[u8]) -> Result<Track> {
    let mut track = Track::default();
    for entry in children(trak) {
        let (kind, payload) = entry?;
        match &kind {
            b"tkhd" => track.dimensions = tkhd_dimensions(payload),
            b"mdia" => {
                for entry in children(payload) {
                    let (kind, payload) = entry?;
                    match &kind {
                        b"hdlr" => track.handler = payload.get(8..12).and_then(|h| h.try_into().ok()),
                        b"minf" => {
                            if let Some(stbl) = child(payload, b"stbl")?
                                && let Some(stsd) = child(stbl, b"stsd")?
                            {
                                parse_stsd(stsd, &mut track);
                            }
                        },
                        _ => {},
                    }
                }
            },
            _ => {},
        }
    }
    Ok(track)
}

fn mvhd_duration(payload: &[u8]) -> Option<u64> {
    let mut bytes = Bytes::new(payload);
    let version = bytes.u8()?;
    bytes.skip(3)?;
    let (timescale, duration) = if version == 1 {
        bytes.skip(16)?;
        (bytes.u32_be()?, bytes.u64_be()?)
    } else {
        bytes.skip(8)?;
        (bytes.u32_be()?, u64::from(bytes.u32_be()?))
    };
    // All ones means "unknown".
    if duration == u64::MAX || (version == 0 && duration == u64::from(u32::MAX)) {
        return None;
    }
    to_millis(duration, u64::from(timescale))
}

/// Width and height are the last two 16.16 fixed-point fields of `tkhd`.
fn tkhd_dimensions(payload: &[u8]) -> Option<Dimensions> {
    let tail = payload.len().checked_sub(8)?;
    let mut bytes = Bytes::new(&payload[tail..]);
    let width = bytes.u32_be()? >> 16;
    let height = bytes.u32_be()? >> 16;
    (width > 0 && height > 0).then_some(Dimensions { width, height })
}

/// First sample entry of `stsd`: its format code, plus the channel count and
/// sample rate when it is an audio entry.
fn parse_stsd(payload: &[u8], track: &mut Track) {
    let mut bytes = Bytes::new(payload);
    // version/flags, entry count, entry size
    if bytes.skip(12).is_none() {
        return;
    }
    track.codec = bytes.array();
    // reserved (6), data reference index (2), version/revision/vendor (8)
    if bytes.skip(16).is_some()
        && let (Some(channels), Some(_sample_size), Some(_), Some(rate)) =
            (bytes.u16_be(), bytes.u16_be(), bytes.u32_be(), bytes.u32_be())
    {
        track.channels = u8::try_from(channels).ok().filter(|c| *c > 0);
        track.sample_rate = Some(rate >> 16).filter(|r| *r > 0);
    }
}

fn codec_name(fourcc: &[u8; 4]) -> String {
    match fourcc {
        b"avc1" | b"avc3" => "h264",
        b"hvc1" | b"hev1" => "hevc",
        b"av01" => "av1",
        b"vp09" => "vp9",
        b"mp4v" => "mpeg4",
        b"apcn" | b"apch" | b"apcs" | b"apco" | b"ap4h" => "prores",
        b"mp4a" => "aac",
        b"ac-3" => "ac3",
        b"ec-3" => "eac3",
        b"Opus" => "opus",
        b"fLaC" => "flac",
        b"alac" => "alac",
        other => return String::from_utf8_lossy(other).trim().to_ascii_lowercase(),
    }
    .to_string()
}

fn container_name(brand: Option<&[u8; 4]>) -> &'static str {
    match brand {
        None | Some(b"qt  ") => "mov",
        Some(b"M4A " | b"M4B " | b"M4P ") => "m4a",
        Some(_) => "mp4",
    }
}
