use std::io::{BufReader, Seek, SeekFrom};

use exif::{In, Tag, Value};
use file_format::{FileFormat, Kind};
use time::{Date, Month, PrimitiveDateTime, Time};
use tracing::{instrument, trace};

use super::{Extractor, Source, read_at};
use crate::consts::JPEG_SCAN_BYTES;
use crate::error::{ErrorKind, Result};
use crate::models::{Dimensions, Extracted, Technical};

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Image format detection plus EXIF camera, capture time and dimensions.
///
/// EXIF is optional; when it carries no pixel dimensions they are read from
/// the PNG, JPEG or GIF headers instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageExtractor;

impl Extractor for ImageExtractor {
    fn name(&self) -> &'static str {
        "image"
    }

    #[instrument(level = "trace", skip(self, source))]
    fn extract(&self, source: &mut dyn Source, size: u64) -> Result<Extracted> {
        source.seek(SeekFrom::Start(0)).map_err(ErrorKind::from)?;
        let format = FileFormat::from_reader(&mut *source).map_err(ErrorKind::from)?;
        if format.kind() != Kind::Image {
            exn::bail!(ErrorKind::UnsupportedFormat(format!("{} is not an image", format.name())));
        }
        let mut extracted = Extracted {
            technical: Technical { container: Some(format.extension().to_string()), ..Default::default() },
            ..Default::default()
        };

        source.seek(SeekFrom::Start(0)).map_err(ErrorKind::from)?;
        match exif::Reader::new().read_from_container(&mut BufReader::new(&mut *source)) {
            Ok(exif) => apply_exif(&exif, &mut extracted),
            // Most images carry no EXIF at all.
            Err(err) => trace!(%err, "no usable EXIF"),
        }

        if extracted.dimensions.is_none() {
            extracted.dimensions = match format {
                FileFormat::PortableNetworkGraphics => Some(png_dimensions(source)?),
                FileFormat::JointPhotographicExpertsGroup => jpeg_dimensions(source, size)?,
                FileFormat::GraphicsInterchangeFormat => gif_dimensions(source)?,
                _ => None,
            };
        }
        Ok(extracted)
    }
}

fn apply_exif(exif: &exif::Exif, extracted: &mut Extracted) {
    let ascii = |tag: Tag| match exif.get_field(tag, In::PRIMARY).map(|field| &field.value) {
        Some(Value::Ascii(values)) => values
            .first()
            .map(|value| String::from_utf8_lossy(value).trim().to_string())
            .filter(|value| !value.is_empty()),
        _ => None,
    };
    let uint = |tag: Tag| exif.get_field(tag, In::PRIMARY).and_then(|field| field.value.get_uint(0));

    extracted.camera = match (ascii(Tag::Make), ascii(Tag::Model)) {
        (Some(make), Some(model)) if model.starts_with(&make) => Some(model),
        (Some(make), Some(model)) => Some(format!("{make} {model}")),
        (make, model) => model.or(make),
    };
    if let (Some(width), Some(height)) = (uint(Tag::PixelXDimension), uint(Tag::PixelYDimension))
        && width > 0
        && height > 0
    {
        extracted.dimensions = Some(Dimensions { width, height });
    }
    extracted.captured_at = exif
        .get_field(Tag::DateTimeOriginal, In::PRIMARY)
        .and_then(|field| match &field.value {
            Value::Ascii(values) => values.first(),
            _ => None,
        })
        .and_then(|raw| exif::DateTime::from_ascii(raw).ok())
        .and_then(|dt| {
            let date = Date::from_calendar_date(i32::from(dt.year), Month::try_from(dt.month).ok()?, dt.day).ok()?;
            let time = Time::from_hms(dt.hour, dt.minute, dt.second).ok()?;
            Some(PrimitiveDateTime::new(date, time))
        });
}

/// The `IHDR` chunk must come first in a PNG.
fn png_dimensions(source: &mut dyn Source) -> Result<Dimensions> {
    let head = read_at(source, 0, 24)?;
    if head.len() < 24 || !head.starts_with(PNG_SIGNATURE) || &head[12..16] != b"IHDR" {
        exn::bail!(ErrorKind::corrupt("missing PNG IHDR chunk"));
    }
    let width = u32::from_be_bytes([head[16], head[17], head[18], head[19]]);
    let height = u32::from_be_bytes([head[20], head[21], head[22], head[23]]);
    Ok(Dimensions { width, height })
}

fn gif_dimensions(source: &mut dyn Source) -> Result<Option<Dimensions>> {
    let head = read_at(source, 0, 10)?;
    if head.len() < 10 {
        exn::bail!(ErrorKind::corrupt("truncated GIF header"));
    }
    let width = u32::from(u16::from_le_bytes([head[6], head[7]]));
    let height = u32::from(u16::from_le_bytes([head[8], head[9]]));
    Ok(Some(Dimensions { width, height }))
}

/// Walks JPEG segments up to the first start-of-frame marker.
fn jpeg_dimensions(source: &mut dyn Source, size: u64) -> Result<Option<Dimensions>> {
    let data = read_at(source, 0, JPEG_SCAN_BYTES)?;
    let mut pos = 2;
    loop {
        // Markers may be padded with any number of 0xFF fill bytes.
        while data.get(pos) == Some(&0xFF) && data.get(pos + 1) == Some(&0xFF) {
            pos += 1;
        }
        let (Some(&0xFF), Some(&marker)) = (data.get(pos), data.get(pos + 1)) else {
            break;
        };
        match marker {
            0xD0..=0xD9 | 0x01 => {
                pos += 2;
                continue;
            },
            0xDA => exn::bail!(ErrorKind::corrupt("JPEG scan starts before a frame header")),
            _ => {},
        }
        let Some(segment) = data.get(pos + 2..pos + 4).map(|b| usize::from(u16::from_be_bytes([b[0], b[1]]))) else {
            break;
        };
        if matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC) {
            let Some(frame) = data.get(pos + 5..pos + 9) else {
                break;
            };
            let height = u32::from(u16::from_be_bytes([frame[0], frame[1]]));
            let width = u32::from(u16::from_be_bytes([frame[2], frame[3]]));
            return Ok(Some(Dimensions { width, height }));
        }
        pos += 2 + segment;
    }
    if (data.len() as u64) < size {
        // Frame header lies beyond the scan window (huge embedded thumbnail).
        return Ok(None);
    }
    exn::bail!(ErrorKind::corrupt("truncated JPEG before frame header"))
}
