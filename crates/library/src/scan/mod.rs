//! The scan pipeline.
//!
//! ```text
//!            walk            detect / extract          batch_write
//! backend ─────────▶ feeder ─────────▶ workers (N) ─────────▶ writer ─▶ datastore
//!                                          │                    │
//!                                          └──── counters ◀─────┘──▶ progress forwarder ─▶ callback
//! ```
//!
//! The feeder walks the library and claims each path once. Workers share a
//! bounded queue; each owns a file from change detection through extraction
//! and hands a [`WriteOp`](omni_cache::models::WriteOp) to the single writer,
//! which persists them in batches. When the walk has finished cleanly, the
//! fingerprints of files that are gone are removed in a last pass.

pub mod detect;
mod progress;
mod request;
mod result;
mod scanner;
mod worker;
mod writer;

pub use self::progress::{ScanProgress, ScanState};
pub use self::request::{ProgressCallback, ScanRequest};
pub use self::result::{FileError, FileErrorKind, ScanResult, ScanStatus};
pub use self::scanner::Scanner;
