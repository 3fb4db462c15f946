//! In-memory datastore for testing.

use crate::error::{ErrorKind, Result};
use crate::models::{FileState, Fingerprint, WriteOp};
use crate::store::Datastore;
use async_trait::async_trait;
use omni_extract::models::MediaRecord;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
struct State {
    next_id: i64,
    fingerprints: BTreeMap<(String, PathBuf), Fingerprint>,
    records: HashMap<i64, MediaRecord>,
}
impl State {
    fn upsert_fingerprint(&mut self, fingerprint: &Fingerprint) -> i64 {
        let key = (fingerprint.user_id.clone(), fingerprint.path.clone());
        let id = match self.fingerprints.get(&key).and_then(|existing| existing.id) {
            Some(id) => id,
            None => {
                self.next_id += 1;
                self.next_id
            },
        };
        self.fingerprints.insert(key, Fingerprint { id: Some(id), ..fingerprint.clone() });
        id
    }

    fn delete_fingerprint(&mut self, user_id: &str, path: &Path) -> bool {
        match self.fingerprints.remove(&(user_id.to_string(), path.to_path_buf())) {
            Some(removed) => {
                if let Some(id) = removed.id {
                    self.records.remove(&id);
                }
                true
            },
            None => false,
        }
    }
}

/// In-memory [`Datastore`] with fault injection.
///
/// Writes can be made to fail with [`Unavailable`](ErrorKind::Unavailable),
/// either for the next N calls or until switched back on, to exercise retry
/// and failure handling. Counters record how many batches and record writes
/// reached the store.
///
/// # Examples
///
/// ```
/// use omni_cache::{Datastore, MemoryStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = MemoryStore::new();
/// store.fail_next_writes(1);
/// assert!(store.batch_write(&[]).await.is_err());
/// assert!(store.batch_write(&[]).await.is_ok());
/// assert_eq!(store.batch_count(), 1);
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    failing_writes: AtomicUsize,
    writes_down: AtomicBool,
    reads_down: AtomicBool,
    batches: AtomicUsize,
    record_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` write calls.
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Fail every write call until switched back.
    pub fn set_writes_unavailable(&self, down: bool) {
        self.writes_down.store(down, Ordering::SeqCst);
    }

    /// Fail every read call until switched back.
    pub fn set_reads_unavailable(&self, down: bool) {
        self.reads_down.store(down, Ordering::SeqCst);
    }

    /// Number of batches committed.
    pub fn batch_count(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    /// Number of media records written, across batches and single upserts.
    pub fn record_writes(&self) -> usize {
        self.record_writes.load(Ordering::SeqCst)
    }

    /// Snapshot of every stored fingerprint, ordered by user then path.
    pub async fn fingerprints(&self) -> Vec<Fingerprint> {
        self.state.read().await.fingerprints.values().cloned().collect()
    }

    /// The record stored for a user's file, if any.
    pub async fn record_for(&self, user_id: &str, path: &Path) -> Option<MediaRecord> {
        let state = self.state.read().await;
        let id = state.fingerprints.get(&(user_id.to_string(), path.to_path_buf()))?.id?;
        state.records.get(&id).cloned()
    }

    fn check_reads(&self) -> Result<()> {
        if self.reads_down.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::Unavailable);
        }
        Ok(())
    }

    fn check_writes(&self) -> Result<()> {
        let injected =
            self.failing_writes.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok();
        if injected || self.writes_down.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::Unavailable);
        }
        Ok(())
    }
}

#[async_trait]
impl Datastore for MemoryStore {
    async fn get_fingerprint(&self, user_id: &str, path: &Path) -> Result<Option<Fingerprint>> {
        self.check_reads()?;
        let state = self.state.read().await;
        Ok(state.fingerprints.get(&(user_id.to_string(), path.to_path_buf())).cloned())
    }

    async fn list_fingerprints(&self, user_id: &str, category_id: &str) -> Result<Vec<Fingerprint>> {
        self.check_reads()?;
        let state = self.state.read().await;
        Ok(state
            .fingerprints
            .values()
            .filter(|f| f.user_id == user_id && f.category_id == category_id)
            .cloned()
            .collect())
    }

    async fn upsert_fingerprint(&self, fingerprint: &Fingerprint) -> Result<i64> {
        self.check_writes()?;
        Ok(self.state.write().await.upsert_fingerprint(fingerprint))
    }

    async fn upsert_media_record(&self, fingerprint_id: i64, record: &MediaRecord) -> Result<()> {
        self.check_writes()?;
        let mut state = self.state.write().await;
        if !state.fingerprints.values().any(|f| f.id == Some(fingerprint_id)) {
            exn::bail!(ErrorKind::Database);
        }
        state.records.insert(fingerprint_id, record.clone());
        self.record_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_media_record(&self, fingerprint_id: i64) -> Result<Option<MediaRecord>> {
        self.check_reads()?;
        Ok(self.state.read().await.records.get(&fingerprint_id).cloned())
    }

    async fn delete_fingerprint(&self, user_id: &str, path: &Path) -> Result<bool> {
        self.check_writes()?;
        Ok(self.state.write().await.delete_fingerprint(user_id, path))
    }

    async fn batch_write(&self, ops: &[WriteOp]) -> Result<()> {
        self.check_writes()?;
        let mut guard = self.state.write().await;
        // Apply to a copy so the batch lands all at once.
        let mut state = guard.clone();
        let mut records = 0;
        for op in ops {
            match op {
                WriteOp::Upsert { fingerprint, record } => {
                    let id = state.upsert_fingerprint(fingerprint);
                    match (record, fingerprint.state) {
                        (Some(record), _) => {
                            state.records.insert(id, record.clone());
                            records += 1;
                        },
                        (None, FileState::Errored) => {
                            state.records.remove(&id);
                        },
                        (None, FileState::Ok) => {},
                    }
                },
                WriteOp::Delete { user_id, path } => {
                    state.delete_fingerprint(user_id, path);
                },
            }
        }
        *guard = state;
        self.batches.fetch_add(1, Ordering::SeqCst);
        self.record_writes.fetch_add(records, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentHash, HashKind};
    use omni_extract::models::{MediaKind, MediaType, Technical};
    use time::UtcDateTime;

    fn fingerprint(path: &str) -> Fingerprint {
        Fingerprint {
            id: None,
            user_id: "user".to_string(),
            category_id: "music".to_string(),
            path: PathBuf::from(path),
            hash: Some(ContentHash::new(HashKind::Full, "abc")),
            size: 3,
            modified: UtcDateTime::now(),
            scanned_at: UtcDateTime::now(),
            state: FileState::Ok,
        }
    }

    fn record() -> MediaRecord {
        MediaRecord {
            media_type: MediaType::Audio,
            kind: MediaKind::Music,
            title: "Song".to_string(),
            year: None,
            season: None,
            episode: None,
            artist: Some("Band".to_string()),
            album: None,
            track: Some(1),
            dimensions: None,
            camera: None,
            captured_at: None,
            resolution: None,
            source: None,
            technical: Technical::default(),
            extracted_at: UtcDateTime::now(),
        }
    }

    #[tokio::test]
    async fn test_ids_are_stable_per_path() {
        let store = MemoryStore::new();
        let a = store.upsert_fingerprint(&fingerprint("/m/a.mp3")).await.unwrap();
        let b = store.upsert_fingerprint(&fingerprint("/m/b.mp3")).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.upsert_fingerprint(&fingerprint("/m/a.mp3")).await.unwrap(), a);
    }

    #[tokio::test]
    async fn test_batch_write_and_delete() {
        let store = MemoryStore::new();
        let ops = [
            WriteOp::Upsert { fingerprint: fingerprint("/m/a.mp3"), record: Some(record()) },
            WriteOp::Upsert { fingerprint: fingerprint("/m/b.mp3"), record: None },
        ];
        store.batch_write(&ops).await.unwrap();
        assert_eq!(store.record_writes(), 1);
        assert_eq!(store.record_for("user", Path::new("/m/a.mp3")).await, Some(record()));
        assert_eq!(store.list_fingerprints("user", "music").await.unwrap().len(), 2);

        let delete = [WriteOp::Delete { user_id: "user".to_string(), path: PathBuf::from("/m/a.mp3") }];
        store.batch_write(&delete).await.unwrap();
        assert_eq!(store.record_for("user", Path::new("/m/a.mp3")).await, None);
        assert_eq!(store.fingerprints().await.len(), 1);
        assert_eq!(store.batch_count(), 2);
    }

    #[tokio::test]
    async fn test_injected_write_failures() {
        let store = MemoryStore::new();
        store.fail_next_writes(2);
        let ops = [WriteOp::Upsert { fingerprint: fingerprint("/m/a.mp3"), record: None }];
        for _ in 0..2 {
            let err = store.batch_write(&ops).await.unwrap_err();
            assert!(err.is_retryable());
        }
        store.batch_write(&ops).await.unwrap();
        assert_eq!(store.batch_count(), 1);

        store.set_writes_unavailable(true);
        assert!(store.upsert_fingerprint(&fingerprint("/m/b.mp3")).await.is_err());
        store.set_reads_unavailable(true);
        assert!(store.list_fingerprints("user", "music").await.is_err());
    }

    #[tokio::test]
    async fn test_record_requires_fingerprint() {
        let store = MemoryStore::new();
        assert!(store.upsert_media_record(42, &record()).await.is_err());
    }
}
