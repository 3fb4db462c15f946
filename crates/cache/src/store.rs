//! The datastore seam between the scanner and persistence.

use crate::error::Result;
use crate::models::{Fingerprint, WriteOp};
use async_trait::async_trait;
use omni_extract::models::MediaRecord;
use std::path::Path;

/// Persistence for fingerprints and media records.
///
/// The scanner only ever talks to this trait, so the SQLite
/// [`Repository`](crate::Repository) can be swapped for an in-memory store in
/// tests. Reads are expected to be cheap and may run concurrently; writes
/// come from a single batching writer.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// The fingerprint stored for `(user_id, path)`, if any.
    async fn get_fingerprint(&self, user_id: &str, path: &Path) -> Result<Option<Fingerprint>>;

    /// Every fingerprint a user has in one category.
    async fn list_fingerprints(&self, user_id: &str, category_id: &str) -> Result<Vec<Fingerprint>>;

    /// Insert or update by `(user_id, path)`, returning the fingerprint id.
    async fn upsert_fingerprint(&self, fingerprint: &Fingerprint) -> Result<i64>;

    /// Insert or replace the record linked to a fingerprint.
    async fn upsert_media_record(&self, fingerprint_id: i64, record: &MediaRecord) -> Result<()>;

    async fn get_media_record(&self, fingerprint_id: i64) -> Result<Option<MediaRecord>>;

    /// Remove a fingerprint and its record. Returns `false` if there was
    /// nothing to remove.
    async fn delete_fingerprint(&self, user_id: &str, path: &Path) -> Result<bool>;

    /// Apply every operation, or none of them.
    async fn batch_write(&self, ops: &[WriteOp]) -> Result<()>;
}
