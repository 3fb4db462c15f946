//! Content extractors, one per [`MediaType`](crate::models::MediaType), and
//! the byte-level helpers they share.

mod audio;
mod image;
mod isobmff;
mod matroska;
mod riff;
mod video;

use std::io::{Read, Seek, SeekFrom};

pub use self::audio::AudioExtractor;
pub use self::image::ImageExtractor;
pub use self::video::VideoExtractor;
use crate::error::{ErrorKind, Result};
use crate::models::Extracted;

/// Blocking, seekable byte source handed to an extractor.
pub trait Source: Read + Seek + Send {}
impl<T: Read + Seek + Send> Source for T {}

/// Reads a file's contents and produces the metadata found inside it.
///
/// Extractors are blocking and run on the blocking thread pool; the caller
/// owns the timeout. `size` is the file size as seen by the walker, and is
/// never zero (empty files are rejected before an extractor is chosen).
pub trait Extractor: Send + Sync {
    /// Short name, used in logs.
    fn name(&self) -> &'static str;

    /// # Errors
    ///
    /// - [`UnsupportedFormat`](ErrorKind::UnsupportedFormat) when the
    ///   contents are not a container this extractor understands.
    /// - [`CorruptFile`](ErrorKind::CorruptFile) when the container is
    ///   recognised but truncated or inconsistent.
    fn extract(&self, source: &mut dyn Source, size: u64) -> Result<Extracted>;
}

/// Reads up to `len` bytes starting at `offset`; fewer at end of file.
pub(crate) fn read_at(source: &mut dyn Source, offset: u64, len: u64) -> Result<Vec<u8>> {
    source.seek(SeekFrom::Start(offset)).map_err(ErrorKind::from)?;
    let mut buffer = Vec::with_capacity(usize::try_from(len.min(1 << 20)).unwrap_or_default());
    (&mut *source).take(len).read_to_end(&mut buffer).map_err(ErrorKind::from)?;
    Ok(buffer)
}

/// Reads exactly `len` bytes starting at `offset`, or fails as corrupt.
pub(crate) fn read_exact_at(source: &mut dyn Source, offset: u64, len: u64, what: &str) -> Result<Vec<u8>> {
    let buffer = read_at(source, offset, len)?;
    if (buffer.len() as u64) < len {
        exn::bail!(ErrorKind::corrupt(format!("truncated {what}")));
    }
    Ok(buffer)
}

/// Forward-only cursor over an in-memory buffer. Every read returns `None`
/// once the buffer runs out, so parsers can `?` their way through a header.
#[derive(Debug, Clone)]
pub(crate) struct Bytes<'a> {
    data: &'a [u8],
    pos: usize,
}
impl<'a> Bytes<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let slice = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    /// Like [`take`](Self::take) but clamped to what is left.
    pub(crate) fn take_up_to(&mut self, n: usize) -> &'a [u8] {
        let n = n.min(self.remaining());
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        slice
    }

    pub(crate) fn skip(&mut self, n: usize) -> Option<()> {
        self.take(n).map(|_| ())
    }

    pub(crate) fn array<const N: usize>(&mut self) -> Option<[u8; N]> {
        self.take(N)?.try_into().ok()
    }

    pub(crate) fn u8(&mut self) -> Option<u8> {
        self.array::<1>().map(|[b]| b)
    }

    pub(crate) fn u16_be(&mut self) -> Option<u16> {
        self.array().map(u16::from_be_bytes)
    }

    pub(crate) fn u24_be(&mut self) -> Option<u32> {
        let [a, b, c] = self.array()?;
        Some(u32::from_be_bytes([0, a, b, c]))
    }

    pub(crate) fn u32_be(&mut self) -> Option<u32> {
        self.array().map(u32::from_be_bytes)
    }

    pub(crate) fn u64_be(&mut self) -> Option<u64> {
        self.array().map(u64::from_be_bytes)
    }

    pub(crate) fn u16_le(&mut self) -> Option<u16> {
        self.array().map(u16::from_le_bytes)
    }

    pub(crate) fn u32_le(&mut self) -> Option<u32> {
        self.array().map(u32::from_le_bytes)
    }
}

/// Milliseconds for `units` at `per_second` units per second.
pub(crate) fn to_millis(units: u64, per_second: u64) -> Option<u64> {
    if per_second == 0 {
        return None;
    }
    u64::try_from(u128::from(units) * 1000 / u128::from(per_second)).ok()
}

/// Latin-1 (or ASCII) bytes to a trimmed string; `None` when empty.
pub(crate) fn latin1(bytes: &[u8]) -> Option<String> {
    let text: String = bytes.iter().take_while(|b| **b != 0).map(|b| char::from(*b)).collect();
    non_empty(&text)
}

pub(crate) fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Leading number of strings like `"3/12"` or `"2001-05-04"`.
pub(crate) fn leading_number<T: std::str::FromStr>(text: &str) -> Option<T> {
    let digits: String = text.trim().chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_bytes_cursor() {
        let mut bytes = Bytes::new(&[0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        assert_eq!(bytes.u16_be(), Some(0x0001));
        assert_eq!(bytes.u24_be(), Some(0x020304));
        assert_eq!(bytes.remaining(), 2);
        assert_eq!(bytes.u32_be(), None);
        assert_eq!(bytes.take_up_to(10), &[0x05, 0x06]);
        assert_eq!(bytes.u8(), None);
    }

    #[test]
    fn test_read_exact_at() {
        let mut source = Cursor::new(b"0123456789".to_vec());
        assert_eq!(read_exact_at(&mut source, 2, 3, "x").unwrap(), b"234");
        assert_eq!(read_at(&mut source, 8, 10).unwrap(), b"89");
        let err = read_exact_at(&mut source, 8, 10, "header").unwrap_err();
        assert!(matches!(&*err, ErrorKind::CorruptFile(reason) if reason == "truncated header"));
    }

    #[test]
    fn test_text_helpers() {
        assert_eq!(latin1(b"Caf\xe9\0\0\0"), Some("Café".to_string()));
        assert_eq!(latin1(b"   \0"), None);
        assert_eq!(leading_number::<u32>("3/12"), Some(3));
        assert_eq!(leading_number::<u16>("2001-05-04"), Some(2001));
        assert_eq!(leading_number::<u16>("unknown"), None);
        assert_eq!(to_millis(90_000, 1_000), Some(90_000));
        assert_eq!(to_millis(5, 0), None);
    }
}
