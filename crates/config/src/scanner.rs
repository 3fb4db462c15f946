use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ErrorKind, Result};

/// Largest worker pool a scan may ask for.
pub const MAX_CONCURRENCY: usize = 16;

/// Tuning for the scan pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Default worker count, used when a scan request doesn't set one.
    pub concurrency: usize,
    /// Write operations per datastore batch.
    pub batch_size: usize,
    /// Flush a partial batch after this long.
    pub flush_interval_ms: u64,
    /// Per-file limit on metadata extraction.
    pub extraction_timeout_ms: u64,
    /// Files up to this size are hashed in full; larger ones are sampled.
    pub full_hash_limit_bytes: u64,
    /// Size of each of the three windows of a sampled hash.
    pub sample_window_bytes: u64,
    /// Hash every file in full, even when size and mtime are unchanged.
    pub verify_hashes: bool,
    /// Attempts after the first before a failing batch becomes fatal.
    pub write_retries: u32,
    /// First retry delay; doubles on each further attempt.
    pub retry_backoff_ms: u64,
    /// Minimum gap between progress callbacks.
    pub progress_interval_ms: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            batch_size: 64,
            flush_interval_ms: 500,
            extraction_timeout_ms: 30_000,
            full_hash_limit_bytes: 64 * 1024 * 1024,
            sample_window_bytes: 1024 * 1024,
            verify_hashes: false,
            write_retries: 3,
            retry_backoff_ms: 100,
            progress_interval_ms: 250,
        }
    }
}

impl ScannerConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| Err(exn::Exn::from(ErrorKind::Invalid(reason.to_string())));
        if self.batch_size == 0 {
            return invalid("scanner.batch_size must be at least 1");
        }
        if self.extraction_timeout_ms == 0 {
            return invalid("scanner.extraction_timeout_ms must be at least 1");
        }
        if self.flush_interval_ms == 0 {
            return invalid("scanner.flush_interval_ms must be at least 1");
        }
        if self.sample_window_bytes == 0 {
            return invalid("scanner.sample_window_bytes must be at least 1");
        }
        if !(1..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return invalid("scanner.concurrency must be between 1 and 16");
        }
        Ok(())
    }

    /// Never zero, which a timer interval can't take.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_millis(self.extraction_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}
