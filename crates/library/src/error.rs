//! Library Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a scan could not start, or had to stop.
///
/// Problems with individual files are never reported this way; they end up
/// in [`ScanResult::errors`](crate::scan::ScanResult::errors).
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The request was rejected before any work started.
    #[display("invalid scan request: {_0}")]
    InvalidRequest(#[error(not(source))] String),
    #[display("library root not found: {}", _0.display())]
    RootNotFound(#[error(not(source))] PathBuf),
    #[display("permission denied on library root: {}", _0.display())]
    RootPermissionDenied(#[error(not(source))] PathBuf),
    /// The root is not a directory, or could not be inspected.
    #[display("library root is not a directory: {}", _0.display())]
    RootInvalid(#[error(not(source))] PathBuf),
    /// The datastore kept failing after every retry, or failed in a way that
    /// retrying can't fix.
    #[display("datastore unavailable")]
    DatastoreUnavailable,
    /// The walk stopped part-way through.
    #[display("library walk failed")]
    Walk,
    /// A scan task panicked or was aborted.
    #[display("scan task failed")]
    Task,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DatastoreUnavailable)
    }
}
