use derive_more::Display;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Error;

/// How a scan ended.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    /// Every discovered file was handled without error.
    #[display("completed")]
    Completed,
    /// The scan ran to the end but some files could not be processed.
    #[display("partial")]
    Partial,
    /// A fatal condition stopped the scan; see [`ScanResult::failure`].
    #[display("failed")]
    Failed,
    #[display("cancelled")]
    Cancelled,
}

/// Why a single file could not be processed.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum FileErrorKind {
    #[display("unsupported format: {_0}")]
    UnsupportedFormat(String),
    #[display("corrupt file: {_0}")]
    CorruptFile(String),
    #[display("extraction timed out")]
    ExtractionTimeout,
    /// The file disappeared, or could not be opened or read.
    #[display("unreadable: {_0}")]
    Unreadable(String),
}

impl FileErrorKind {
    pub(crate) fn from_extract(kind: &omni_extract::error::ErrorKind) -> Self {
        use omni_extract::error::ErrorKind as Kind;
        match kind {
            Kind::UnsupportedFormat(reason) => Self::UnsupportedFormat(reason.clone()),
            Kind::CorruptFile(reason) => Self::CorruptFile(reason.clone()),
            Kind::ExtractionTimeout(_) => Self::ExtractionTimeout,
            Kind::Io(err) => Self::Unreadable(err.to_string()),
        }
    }

    pub(crate) fn from_storage(kind: &omni_storage::error::ErrorKind) -> Self {
        Self::Unreadable(kind.to_string())
    }
}

/// A file that was skipped because of an error, and why.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
#[display("{}: {reason}", path.display())]
pub struct FileError {
    pub path: PathBuf,
    pub reason: FileErrorKind,
}

/// Summary of a finished scan.
///
/// Every discovered file lands in exactly one of `processed`, `skipped` or
/// `errored`, so for a scan that ran to the end
/// `processed + skipped + errored == total`. A cancelled or failed scan may
/// leave some discovered files unaccounted for.
#[derive(Debug)]
pub struct ScanResult {
    /// Files discovered by the walk.
    pub total: u64,
    /// Files whose metadata was extracted and stored.
    pub processed: u64,
    /// Files found unchanged since the previous scan.
    pub skipped: u64,
    pub errored: u64,
    /// Fingerprints removed because their file is gone.
    pub deleted: u64,
    pub errors: Vec<FileError>,
    pub duration: Duration,
    pub status: ScanStatus,
    /// What stopped the scan, when `status` is [`Failed`](ScanStatus::Failed).
    pub failure: Option<Error>,
}

impl ScanResult {
    pub fn is_success(&self) -> bool {
        matches!(self.status, ScanStatus::Completed | ScanStatus::Partial)
    }
}
