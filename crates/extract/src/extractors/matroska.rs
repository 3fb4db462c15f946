//! Matroska and WebM (EBML).
//!
//! Only the head of the file is read: the segment `Info` and `Tracks`
//! elements sit before the first `Cluster` in every muxer worth supporting.

use exn::OptionExt;

use super::{Bytes, Source, latin1, non_empty, read_at};
use crate::consts::HEADER_SCAN_BYTES;
use crate::error::{ErrorKind, Result};
use crate::models::{Dimensions, Extracted, Technical};

const EBML: u32 = 0x1A45_DFA3;
const DOC_TYPE: u32 = 0x4282;
const SEGMENT: u32 = 0x1853_8067;
const INFO: u32 = 0x1549_A966;
const TIMECODE_SCALE: u32 = 0x2A_D7B1;
const DURATION: u32 = 0x4489;
const TITLE: u32 = 0x7BA9;
const TRACKS: u32 = 0x1654_AE6B;
const TRACK_ENTRY: u32 = 0xAE;
const TRACK_TYPE: u32 = 0x83;
const CODEC_ID: u32 = 0x86;
const VIDEO: u32 = 0xE0;
const PIXEL_WIDTH: u32 = 0xB0;
const PIXEL_HEIGHT: u32 = 0xBA;
const AUDIO: u32 = 0xE1;
const SAMPLING_FREQUENCY: u32 = 0xB5;
const CHANNELS: u32 = 0x9F;
const CLUSTER: u32 = 0x1F43_B675;

const TRACK_TYPE_VIDEO: u64 = 1;
const TRACK_TYPE_AUDIO: u64 = 2;
const DEFAULT_TIMECODE_SCALE_NS: u64 = 1_000_000;

pub(crate) fn sniff(head: &[u8]) -> bool {
    head.starts_with(&EBML.to_be_bytes())
}

struct Element<'a> {
    id: u32,
    data: &'a [u8],
    /// Offset within the parsed buffer where the element says it ends;
    /// `None` for unknown-size elements.
    declared_end: Option<u64>,
}
impl Element<'_> {
    fn complete(&self, buffer_len: usize) -> bool {
        self.declared_end.is_some_and(|end| end <= buffer_len as u64)
    }
}

/// EBML elements of a buffer, with data clamped to what is actually
/// present.
struct Elements<'a> {
    bytes: Bytes<'a>,
}
impl<'a> Elements<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { bytes: Bytes::new(data) }
    }

    fn id(&mut self) -> Option<u32> {
        let first = self.bytes.u8()?;
        let len = first.leading_zeros() + 1;
        if len > 4 {
            return None;
        }
        let mut id = u32::from(first);
        for _ in 1..len {
            id = (id << 8) | u32::from(self.bytes.u8()?);
        }
        Some(id)
    }

    /// Returns `Some(None)` for the reserved "unknown size" value.
    fn size(&mut self) -> Option<Option<u64>> {
        let first = self.bytes.u8()?;
        let len = first.leading_zeros() + 1;
        if len > 8 {
            return None;
        }
        let mut value = u64::from(first) & (0xFF >> len);
        for _ in 1..len {
            value = (value << 8) | u64::from(self.bytes.u8()?);
        }
        Some((value != (1u64 << (7 * len)) - 1).then_some(value))
    }
}
impl<'a> Iterator for Elements<'a> {
    type Item = Element<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.id()?;
        let size = self.size()?;
        let start = self.bytes.position() as u64;
        let data = match size {
            Some(size) => self.bytes.take_up_to(usize::try_from(size).unwrap_or(usize::MAX)),
            None => self.bytes.take_up_to(usize::MAX),
        };
        Some(Element { id, data, declared_end: size.map(|size| start.saturating_add(size)) })
    }
}
fn children<'a>(element: &Element<'a>) -> Elements<'a> {
    Elements::new(element.data)
}

fn uint(data: &[u8]) -> Option<u64> {
    (data.len() <= 8).then(|| data.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

fn float(data: &[u8]) -> Option<f64> {
    match data.len() {
        4 => Some(f64::from(f32::from_be_bytes(data.try_into().ok()?))),
        8 => Some(f64::from_be_bytes(data.try_into().ok()?)),
        _ => None,
    }
}

pub(crate) fn extract(source: &mut dyn Source, size: u64) -> Result<Extracted> {
    let buffer = read_at(source, 0, HEADER_SCAN_BYTES)?;
    let mut elements = Elements::new(&buffer);

    let header = elements.next().filter(|e| e.id == EBML).ok_or_raise(|| ErrorKind::corrupt("missing EBML header"))?;
    if !header.complete(buffer.len()) {
        exn::bail!(ErrorKind::corrupt("truncated EBML header"));
    }
    let doc_type = Elements::new(header.data)
        .find(|e| e.id == DOC_TYPE)
        .and_then(|e| latin1(e.data))
        .unwrap_or_else(|| "matroska".to_string());
    if doc_type != "matroska" && doc_type != "webm" {
        exn::bail!(ErrorKind::UnsupportedFormat(format!("EBML document type '{doc_type}'")));
    }

    let segment = elements.find(|e| e.id == SEGMENT).ok_or_raise(|| ErrorKind::corrupt("missing segment"))?;
    // The buffer starts at file offset 0, so a declared end is a file offset.
    if segment.declared_end.is_some_and(|end| end > size) {
        exn::bail!(ErrorKind::corrupt("truncated segment"));
    }

    let mut technical = Technical { container: Some(doc_type), ..Default::default() };
    let mut extracted = Extracted::default();
    for element in children(&segment) {
        match element.id {
            INFO => read_info(&element, &mut technical, &mut extracted),
            TRACKS => {
                for entry in children(&element).filter(|e| e.id == TRACK_ENTRY) {
                    read_track(&entry, &mut technical, &mut extracted);
                }
            },
            CLUSTER => break,
            _ => {},
        }
    }
    extracted.technical = technical;
    Ok(extracted)
}

fn read_info(info: &Element<'_>, technical: &mut Technical, extracted: &mut Extracted) {
    let mut scale = DEFAULT_TIMECODE_SCALE_NS;
    let mut duration = None;
    for element in children(info) {
        match element.id {
            TIMECODE_SCALE => scale = uint(element.data).unwrap_or(scale),
            DURATION => duration = float(element.data),
            TITLE => extracted.title = non_empty(&String::from_utf8_lossy(element.data)),
            _ => {},
        }
    }
    technical.duration_ms = duration.filter(|d| d.is_finite() && *d > 0.0).map(|d| (d * scale as f64 / 1_000_000.0) as u64);
}

fn read_track(entry: &Element<'_>, technical: &mut Technical, extracted: &mut Extracted) {
    let mut track_type = None;
    let mut codec = None;
    let mut dimensions = None;
    let mut sample_rate = None;
    let mut channels = None;
    for element in children(entry) {
        match element.id {
            TRACK_TYPE => track_type = uint(element.data),
            CODEC_ID => codec = latin1(element.data).map(|id| codec_name(&id)),
            VIDEO => {
                let (mut width, mut height) = (None, None);
                for field in children(&element) {
                    match field.id {
                        PIXEL_WIDTH => width = uint(field.data),
                        PIXEL_HEIGHT => height = uint(field.data),
                        _ => {},
                    }
                }
                if let (Some(width), Some(height)) = (width.and_then(|w| u32::try_from(w).ok()), height.and_then(|h| u32::try_from(h).ok()))
                    && width > 0
                    && height > 0
                {
                    dimensions = Some(Dimensions { width, height });
                }
            },
            AUDIO => {
                for field in children(&element) {
                    match field.id {
                        SAMPLING_FREQUENCY => sample_rate = float(field.data).map(|f| f as u32),
                        CHANNELS => channels = uint(field.data).and_then(|c| u8::try_from(c).ok()),
                        _ => {},
                    }
                }
            },
            _ => {},
        }
    }
    match track_type {
        Some(TRACK_TYPE_VIDEO) if technical.video_codec.is_none() => {
            technical.video_codec = codec;
            extracted.dimensions = dimensions;
        },
        Some(TRACK_TYPE_AUDIO) if technical.audio_codec.is_none() => {
            technical.audio_codec = codec;
            technical.sample_rate = sample_rate;
            technical.channels = channels;
        },
        _ => {},
    }
}

fn codec_name(codec_id: &str) -> String {
    match codec_id {
        "V_MPEG4/ISO/AVC" => "h264",
        "V_MPEGH/ISO/HEVC" => "hevc",
        "V_AV1" => "av1",
        "V_VP8" => "vp8",
        "V_VP9" => "vp9",
        "V_MPEG4/ISO/ASP" => "mpeg4",
        "A_AAC" => "aac",
        "A_OPUS" => "opus",
        "A_VORBIS" => "vorbis",
        "A_FLAC" => "flac",
        "A_AC3" => "ac3",
        "A_EAC3" => "eac3",
        "A_DTS" => "dts",
        "A_MPEG/L3" => "mp3",
        other => return other.trim_start_matches(['V', 'A', 'S']).trim_start_matches('_').to_ascii_lowercase(),
    }
    .to_string()
}
