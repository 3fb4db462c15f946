//! Incremental scanning of a media library.
//!
//! A [`Scanner`] walks a library through a storage backend, skips files
//! whose fingerprint says they haven't changed, extracts metadata from the
//! rest on a bounded worker pool, and batches the results into a datastore.
//! See the [`scan`] module for the pipeline.

pub mod error;
pub mod scan;

pub use crate::scan::{
    FileError, FileErrorKind, ProgressCallback, ScanProgress, ScanRequest, ScanResult, ScanState, ScanStatus, Scanner,
};
