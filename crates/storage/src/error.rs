//! Errors raised while walking or reading a library.
//!
//! The walker turns most per-entry failures into warnings; these kinds are
//! what reaches the caller when a whole operation fails.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::{Path, PathBuf};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

/// What went wrong, classified by how a scanner reacts to it: a missing or
/// forbidden root fails the scan, the same on a single file only skips it.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Nothing exists at this path.
    #[display("not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// The OS refused to open or list the path.
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Path contains invalid characters, escapes the root, or is not the
    /// kind of filesystem entry expected (e.g. a root that is a file).
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    #[display("backend failure: {_0}")]
    BackendError(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Map an I/O error on `path` to the most specific kind available.
    pub fn from_io(e: IoError, path: &Path) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io(e),
        }
    }

    /// Transient failures, worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::BackendError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_mapped_to_specific_kinds() {
        let path = Path::new("/library/missing.mkv");
        let kind = ErrorKind::from_io(IoError::from(std::io::ErrorKind::NotFound), path);
        assert!(matches!(kind, ErrorKind::NotFound(p) if p == path));
        let kind = ErrorKind::from_io(IoError::from(std::io::ErrorKind::PermissionDenied), path);
        assert!(matches!(kind, ErrorKind::PermissionDenied(_)));
        let kind = ErrorKind::from_io(IoError::from(std::io::ErrorKind::Interrupted), path);
        assert!(kind.is_retryable());
    }
}
