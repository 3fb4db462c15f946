//! Extraction Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::time::Duration;

/// An extraction error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The file is not a media type (or container) that can be read.
    #[display("unsupported format: {_0}")]
    UnsupportedFormat(#[error(not(source))] String),
    /// The file claims to be a known format but its structure is broken
    /// (empty, truncated, or internally inconsistent).
    #[display("corrupt file: {_0}")]
    CorruptFile(#[error(not(source))] String),
    /// Extraction did not finish within the allowed time.
    #[display("extraction timed out after {}ms", _0.as_millis())]
    ExtractionTimeout(#[error(not(source))] Duration),
    /// Reading the file failed for reasons other than its contents.
    #[display("I/O error: {_0}")]
    Io(std::io::Error),
}
impl From<std::io::Error> for ErrorKind {
    /// Running out of bytes while parsing means the file is shorter than its
    /// own headers say it is.
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => Self::CorruptFile("unexpected end of file".to_string()),
            _ => Self::Io(err),
        }
    }
}

impl ErrorKind {
    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        Self::CorruptFile(reason.into())
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Broken or unknown files stay broken; a timeout or a read failure
        // might not happen next time.
        matches!(self, Self::ExtractionTimeout(_) | Self::Io(_))
    }
}
