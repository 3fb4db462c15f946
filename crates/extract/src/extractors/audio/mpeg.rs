//! MPEG audio frame headers (MP1/MP2/MP3).

use crate::extractors::{Source, read_at};
use crate::error::Result;

/// How far past the tag to look for the first frame.
const SYNC_SCAN_BYTES: u64 = 64 * 1024;

// Bitrates in kbit/s, indexed by the 4-bit bitrate index.
const V1_L1: [u32; 15] = [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448];
const V1_L2: [u32; 15] = [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384];
const V1_L3: [u32; 15] = [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320];
const V2_L1: [u32; 15] = [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256];
const V2_L23: [u32; 15] = [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FrameHeader {
    pub(crate) codec: &'static str,
    pub(crate) bitrate_kbps: u32,
    pub(crate) sample_rate: u32,
    pub(crate) channels: u8,
}

pub(crate) fn parse_header(raw: [u8; 4]) -> Option<FrameHeader> {
    let header = u32::from_be_bytes(raw);
    if header >> 21 != 0x7FF {
        return None;
    }
    let version = (header >> 19) & 0x3;
    let layer = (header >> 17) & 0x3;
    let bitrate_index = usize::try_from((header >> 12) & 0xF).ok()?;
    let rate_index = usize::try_from((header >> 10) & 0x3).ok()?;
    let mode = (header >> 6) & 0x3;
    // Free-format (0) and bad (15) bitrates can't be used to size the stream.
    if version == 1 || layer == 0 || bitrate_index == 0 || bitrate_index == 15 || rate_index == 3 {
        return None;
    }

    let (table, codec) = match (version, layer) {
        (3, 3) => (&V1_L1, "mp1"),
        (3, 2) => (&V1_L2, "mp2"),
        (3, _) => (&V1_L3, "mp3"),
        (_, 3) => (&V2_L1, "mp1"),
        (_, 2) => (&V2_L23, "mp2"),
        _ => (&V2_L23, "mp3"),
    };
    let rates: [u32; 3] = match version {
        3 => [44_100, 48_000, 32_000],
        2 => [22_050, 24_000, 16_000],
        _ => [11_025, 12_000, 8_000],
    };
    Some(FrameHeader {
        codec,
        bitrate_kbps: table[bitrate_index],
        sample_rate: rates[rate_index],
        channels: if mode == 3 { 1 } else { 2 },
    })
}

/// Finds the first valid frame header at or after `start`.
pub(crate) fn find_frame(source: &mut dyn Source, start: u64) -> Result<Option<(u64, FrameHeader)>> {
    let window = read_at(source, start, SYNC_SCAN_BYTES)?;
    Ok(window
        .windows(4)
        .enumerate()
        .filter(|(_, bytes)| bytes[0] == 0xFF)
        .find_map(|(offset, bytes)| Some((start + offset as u64, parse_header(bytes.try_into().ok()?)?))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_mpeg1_layer3_header() {
        // 128 kbit/s, 44.1 kHz, joint stereo
        let header = parse_header([0xFF, 0xFB, 0x90, 0x40]).unwrap();
        assert_eq!(header, FrameHeader { codec: "mp3", bitrate_kbps: 128, sample_rate: 44_100, channels: 2 });
    }

    #[test]
    fn test_mono_mpeg2_header() {
        // MPEG-2 layer III, 64 kbit/s, 22.05 kHz, mono
        let header = parse_header([0xFF, 0xF3, 0x80, 0xC0]).unwrap();
        assert_eq!(header, FrameHeader { codec: "mp3", bitrate_kbps: 64, sample_rate: 22_050, channels: 1 });
    }

    #[test]
    fn test_rejects_invalid_headers() {
        assert_eq!(parse_header([0xFF, 0xFB, 0xF0, 0x40]), None); // bitrate index 15
        assert_eq!(parse_header([0xFF, 0xFB, 0x9C, 0x40]), None); // rate index 3
        assert_eq!(parse_header([0x00, 0xFB, 0x90, 0x40]), None);
    }

    #[test]
    fn test_find_frame_skips_junk() {
        let mut data = vec![0x00, 0xFF, 0x00, 0x12];
        data.extend([0xFF, 0xFB, 0x90, 0x40]);
        let (offset, header) = find_frame(&mut Cursor::new(data), 0).unwrap().unwrap();
        assert_eq!(offset, 4);
        assert_eq!(header.bitrate_kbps, 128);
    }
}
