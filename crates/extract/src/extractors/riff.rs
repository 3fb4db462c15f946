//! RIFF containers: AVI video and WAVE audio.

use exn::OptionExt;

use super::{Bytes, Source, read_at, read_exact_at, to_millis};
use crate::error::{ErrorKind, Result};
use crate::models::{Dimensions, Extracted, Technical};

const MAX_CHUNKS: usize = 1024;
const MAX_HEADER_LIST_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RiffForm {
    Avi,
    Wave,
}

pub(crate) fn sniff(head: &[u8]) -> Option<RiffForm> {
    if !head.starts_with(b"RIFF") {
        return None;
    }
    match head.get(8..12) {
        Some(b"AVI ") => Some(RiffForm::Avi),
        Some(b"WAVE") => Some(RiffForm::Wave),
        _ => None,
    }
}

struct Chunk {
    id: [u8; 4],
    /// Offset of the chunk data within the file
    offset: u64,
    size: u64,
}

/// Top-level chunks, read header by header so that large data chunks are
/// skipped rather than read.
fn chunks(source: &mut dyn Source, file_size: u64) -> Result<Vec<Chunk>> {
    let header = read_exact_at(source, 0, 12, "RIFF header")?;
    let riff_size = Bytes::new(&header[4..8]).u32_le().map(u64::from).unwrap_or_default();
    let end = 8 + riff_size;
    if end > file_size {
        exn::bail!(ErrorKind::corrupt("truncated RIFF file"));
    }

    let mut chunks = Vec::new();
    let mut offset = 12;
    while offset + 8 <= end && chunks.len() < MAX_CHUNKS {
        let raw = read_exact_at(source, offset, 8, "chunk header")?;
        let mut bytes = Bytes::new(&raw);
        let (Some(id), Some(size)) = (bytes.array::<4>(), bytes.u32_le()) else {
            exn::bail!(ErrorKind::corrupt("truncated chunk header"));
        };
        let size = u64::from(size);
        if offset + 8 + size > end {
            exn::bail!(ErrorKind::corrupt(format!("truncated '{}' chunk", String::from_utf8_lossy(&id))));
        }
        chunks.push(Chunk { id, offset: offset + 8, size });
        // Chunks are word aligned.
        offset += 8 + size + (size & 1);
    }
    Ok(chunks)
}

/// Sub-chunks of an in-memory `LIST` payload.
fn sub_chunks(data: &[u8]) -> impl Iterator<Item = ([u8; 4], &[u8])> {
    let mut bytes = Bytes::new(data);
    std::iter::from_fn(move || {
        let id = bytes.array::<4>()?;
        let size = usize::try_from(bytes.u32_le()?).ok()?;
        let payload = bytes.take_up_to(size);
        if size & 1 == 1 {
            bytes.skip(1);
        }
        Some((id, payload))
    })
}

pub(crate) fn extract_avi(source: &mut dyn Source, size: u64) -> Result<Extracted> {
    let chunks = chunks(source, size)?;
    let mut header_list = None;
    for chunk in &chunks {
        if &chunk.id == b"LIST" && read_at(source, chunk.offset, 4)? == b"hdrl" {
            header_list = Some(read_at(source, chunk.offset + 4, chunk.size.saturating_sub(4).min(MAX_HEADER_LIST_BYTES))?);
            break;
        }
    }
    let header_list = header_list.ok_or_raise(|| ErrorKind::corrupt("missing AVI header list"))?;

    let mut technical = Technical { container: Some("avi".to_string()), ..Default::default() };
    let mut extracted = Extracted::default();
    for (id, payload) in sub_chunks(&header_list) {
        match &id {
            b"avih" => {
                let mut bytes = Bytes::new(payload);
                let micros_per_frame = bytes.u32_le();
                let total_frames = bytes.skip(12).and_then(|_| bytes.u32_le());
                let dimensions = bytes.skip(12).and_then(|_| Some((bytes.u32_le()?, bytes.u32_le()?)));
                if let (Some(micros), Some(frames)) = (micros_per_frame, total_frames) {
                    technical.duration_ms = Some(u64::from(micros) * u64::from(frames) / 1000).filter(|d| *d > 0);
                }
                if let Some((width, height)) = dimensions.filter(|(w, h)| *w > 0 && *h > 0) {
                    extracted.dimensions = Some(Dimensions { width, height });
                }
            },
            b"LIST" if payload.starts_with(b"strl") => read_stream(&payload[4..], &mut technical),
            _ => {},
        }
    }
    extracted.technical = technical;
    Ok(extracted)
}

fn read_stream(strl: &[u8], technical: &mut Technical) {
    let mut stream_type = None;
    for (id, payload) in sub_chunks(strl) {
        match &id {
            b"strh" => {
                stream_type = payload.get(0..4);
                if matches!(stream_type, Some(b"vids")) && technical.video_codec.is_none() {
                    technical.video_codec = payload.get(4..8).map(fourcc_codec);
                }
            },
            b"strf" if matches!(stream_type, Some(b"auds")) && technical.audio_codec.is_none() => {
                let mut bytes = Bytes::new(payload);
                technical.audio_codec = bytes.u16_le().map(wave_format_name);
                technical.channels = bytes.u16_le().and_then(|c| u8::try_from(c).ok());
                technical.sample_rate = bytes.u32_le();
            },
            _ => {},
        }
    }
}

pub(crate) fn extract_wave(source: &mut dyn Source, size: u64) -> Result<Technical> {
    let chunks = chunks(source, size)?;
    let format = chunks.iter().find(|c| &c.id == b"fmt ").ok_or_raise(|| ErrorKind::corrupt("missing 'fmt ' chunk"))?;
    let raw = read_exact_at(source, format.offset, 16.min(format.size), "'fmt ' chunk")?;
    let mut bytes = Bytes::new(&raw);
    let (Some(tag), Some(channels), Some(sample_rate), Some(byte_rate)) =
        (bytes.u16_le(), bytes.u16_le(), bytes.u32_le(), bytes.u32_le())
    else {
        exn::bail!(ErrorKind::corrupt("short 'fmt ' chunk"));
    };
    let data_size = chunks.iter().find(|c| &c.id == b"data").map(|c| c.size);

    Ok(Technical {
        container: Some("wav".to_string()),
        audio_codec: Some(wave_format_name(tag)),
        duration_ms: data_size.and_then(|data| to_millis(data, u64::from(byte_rate))),
        bitrate: Some(u64::from(byte_rate) * 8).filter(|b| *b > 0),
        sample_rate: Some(sample_rate),
        channels: u8::try_from(channels).ok(),
        ..Default::default()
    })
}

fn fourcc_codec(handler: &[u8]) -> String {
    let handler = String::from_utf8_lossy(handler).trim_matches(['\0', ' ']).to_ascii_lowercase();
    match handler.as_str() {
        "h264" | "x264" | "avc1" => "h264".to_string(),
        "xvid" | "divx" | "dx50" | "fmp4" | "mp4v" => "mpeg4".to_string(),
        "mjpg" => "mjpeg".to_string(),
        _ => handler,
    }
}

fn wave_format_name(tag: u16) -> String {
    match tag {
        0x0001 | 0xFFFE => "pcm".to_string(),
        0x0003 => "pcm_float".to_string(),
        0x0055 => "mp3".to_string(),
        0x00FF => "aac".to_string(),
        0x2000 => "ac3".to_string(),
        other => format!("0x{other:04x}"),
    }
}
