//! Change detection: decides from a file's metadata, and if need be its
//! content hash, whether it has to be extracted again.
//!
//! Hashing follows one policy for the whole scan ([`HashPolicy`]):
//!
//! - files up to `full_hash_limit` bytes get a BLAKE3 hash of every byte,
//! - larger files get a *sampled* BLAKE3 hash of the file size followed by
//!   three windows of `sample_window` bytes at the head, the middle and the
//!   tail of the file,
//! - with `verify` on every file is hashed in full, and the cheap size and
//!   modification time check is never trusted.
//!
//! Hashes of different kinds never compare equal, so raising the limit (or
//! turning on verification) makes the next scan re-extract large files once.

use omni_cache::models::{FileState, Fingerprint};
use omni_config::ScannerConfig;
use omni_storage::error::{ErrorKind, Result};
use omni_storage::file::{ContentHash, HashKind};
use omni_storage::{BackendHandle, FileInfo, ReadSeek};
use std::collections::HashSet;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{instrument, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Never seen before.
    New,
    /// Seen before, with different contents (or it failed last time).
    Modified,
    Unchanged,
    /// Seen before, but no longer there.
    Deleted,
}

/// Result of comparing a file against its previous fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub change: Change,
    /// The content hash, when the file had to be read to decide.
    pub hash: Option<ContentHash>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashPolicy {
    pub full_hash_limit: u64,
    pub sample_window: u64,
    pub verify: bool,
}

impl HashPolicy {
    pub fn new(settings: &ScannerConfig, verify: Option<bool>) -> Self {
        Self {
            full_hash_limit: settings.full_hash_limit_bytes,
            sample_window: settings.sample_window_bytes,
            verify: verify.unwrap_or(settings.verify_hashes),
        }
    }

    pub fn kind_for(&self, size: u64) -> HashKind {
        match self.verify || size <= self.full_hash_limit {
            true => HashKind::Full,
            false => HashKind::Sampled,
        }
    }
}

/// Hash `reader` (holding `size` bytes) according to `policy`. Blocking.
pub fn hash_reader(reader: &mut dyn ReadSeek, size: u64, policy: &HashPolicy) -> io::Result<ContentHash> {
    let kind = policy.kind_for(size);
    let mut hasher = blake3::Hasher::new();
    match kind {
        HashKind::Full => {
            reader.seek(SeekFrom::Start(0))?;
            io::copy(reader, &mut hasher)?;
        },
        HashKind::Sampled => {
            let window = policy.sample_window.min(size);
            hasher.update(&size.to_le_bytes());
            for offset in [0, (size / 2).saturating_sub(window / 2), size - window] {
                reader.seek(SeekFrom::Start(offset))?;
                let copied = io::copy(&mut (&mut *reader).take(window), &mut hasher)?;
                if copied < window {
                    return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
                }
            }
        },
    }
    Ok(ContentHash::new(kind, hasher.finalize().to_hex().to_string()))
}

/// Whether size and modification time alone prove `file` unchanged.
fn looks_unchanged(file: &FileInfo, prior: &Fingerprint) -> bool {
    prior.state == FileState::Ok && prior.hash.is_some() && prior.size == file.size && prior.modified == file.modified
}

/// Decide what happened to `file` since `prior` was recorded.
///
/// Reads (and hashes) the file unless the cheap check settles it. A prior in
/// the [`Errored`](FileState::Errored) state is always reported as
/// [`Modified`](Change::Modified) so the file gets another try.
#[instrument(level = "trace", skip_all, fields(path = %file.path.display()))]
pub async fn detect(backend: &BackendHandle, file: &FileInfo, prior: Option<&Fingerprint>, policy: HashPolicy) -> Result<Detection> {
    if let Some(prior) = prior
        && !policy.verify
        && looks_unchanged(file, prior)
    {
        trace!("Size and modification time match");
        return Ok(Detection { change: Change::Unchanged, hash: None });
    }

    let mut reader = backend.reader(&file.path).await?;
    let (path, size) = (file.path.clone(), file.size);
    let hash = tokio::task::spawn_blocking(move || hash_reader(&mut *reader, size, &policy).map_err(|e| ErrorKind::from_io(e, &path)))
        .await
        .map_err(|e| ErrorKind::BackendError(format!("hashing task failed: {e}")))??;

    let change = match prior {
        None => Change::New,
        Some(prior) if prior.state == FileState::Errored => Change::Modified,
        Some(prior) if prior.hash.as_ref() == Some(&hash) => Change::Unchanged,
        Some(_) => Change::Modified,
    };
    trace!(?change, %hash, "Hashed");
    Ok(Detection { change, hash: Some(hash) })
}

/// Paths of `priors` that `in_scope` accepts but the walk never saw.
pub fn deleted<'a>(
    priors: impl IntoIterator<Item = &'a Fingerprint>,
    seen: &HashSet<PathBuf>,
    in_scope: impl Fn(&Path) -> bool,
) -> Vec<PathBuf> {
    priors
        .into_iter()
        .filter(|prior| in_scope(&prior.path) && !seen.contains(&prior.path))
        .map(|prior| prior.path.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use omni_storage::StorageBackend;
    use omni_storage::backend::MockBackend;
    use rstest::rstest;
    use std::io::Cursor;
    use std::sync::Arc;
    use time::UtcDateTime;
    use time::macros::utc_datetime;

    const MODIFIED: UtcDateTime = utc_datetime!(2024-03-01 12:00:00);

    fn policy(full_hash_limit: u64, sample_window: u64, verify: bool) -> HashPolicy {
        HashPolicy { full_hash_limit, sample_window, verify }
    }

    fn hash_of(data: &[u8], policy: &HashPolicy) -> ContentHash {
        hash_reader(&mut Cursor::new(data.to_vec()), data.len() as u64, policy).unwrap()
    }

    fn fingerprint(path: &str, hash: Option<ContentHash>, size: u64, state: FileState) -> Fingerprint {
        Fingerprint {
            id: Some(1),
            user_id: "u".to_string(),
            category_id: "c".to_string(),
            path: PathBuf::from(path),
            hash,
            size,
            modified: MODIFIED,
            scanned_at: MODIFIED,
            state,
        }
    }

    async fn backend_with(path: &str, data: &[u8]) -> (BackendHandle, FileInfo) {
        let backend = MockBackend::default();
        backend.write_with_modified(Path::new(path), data, MODIFIED).await.unwrap();
        let file = backend.stat(Path::new(path)).await.unwrap();
        let backend: BackendHandle = Arc::new(backend);
        (backend, file)
    }

    #[test]
    fn test_full_hash_is_blake3_of_contents() {
        let hash = hash_of(b"hello world", &policy(1024, 4, false));
        assert_eq!(hash.kind, HashKind::Full);
        assert_eq!(hash.value, blake3::hash(b"hello world").to_hex().to_string());
    }

    #[test]
    fn test_sampled_hash_ignores_unsampled_bytes() {
        let policy = policy(16, 4, false);
        let mut data = (0u8..64).collect::<Vec<_>>();
        let before = hash_of(&data, &policy);
        assert_eq!(before.kind, HashKind::Sampled);
        // Outside the head, middle and tail windows.
        data[10] ^= 0xFF;
        assert_eq!(hash_of(&data, &policy), before);
        // Inside the middle window.
        data[31] ^= 0xFF;
        assert_ne!(hash_of(&data, &policy), before);
    }

    #[test]
    fn test_verify_forces_full_hash() {
        let data = vec![7u8; 64];
        assert_eq!(hash_of(&data, &policy(16, 4, true)).kind, HashKind::Full);
    }

    #[rstest]
    #[case(100, HashKind::Full)]
    #[case(101, HashKind::Sampled)]
    fn test_kind_threshold_is_inclusive(#[case] size: u64, #[case] kind: HashKind) {
        assert_eq!(policy(100, 10, false).kind_for(size), kind);
    }

    #[tokio::test]
    async fn test_new_file_is_hashed() {
        let (backend, file) = backend_with("a.mkv", b"data").await;
        let detection = detect(&backend, &file, None, policy(1024, 4, false)).await.unwrap();
        assert_eq!(detection.change, Change::New);
        assert!(detection.hash.is_some());
    }

    #[tokio::test]
    async fn test_matching_metadata_skips_reading() {
        let (backend, file) = backend_with("a.mkv", b"data").await;
        let prior = fingerprint("/mock/a.mkv", Some(ContentHash::new(HashKind::Full, "stale")), 4, FileState::Ok);
        let detection = detect(&backend, &file, Some(&prior), policy(1024, 4, false)).await.unwrap();
        assert_eq!(detection, Detection { change: Change::Unchanged, hash: None });
    }

    #[tokio::test]
    async fn test_verify_compares_hashes() {
        let (backend, file) = backend_with("a.mkv", b"data").await;
        let policy = policy(1024, 4, true);
        let stale = fingerprint("/mock/a.mkv", Some(ContentHash::new(HashKind::Full, "stale")), 4, FileState::Ok);
        let detection = detect(&backend, &file, Some(&stale), policy).await.unwrap();
        assert_eq!(detection.change, Change::Modified);

        let current = fingerprint("/mock/a.mkv", detection.hash.clone(), 4, FileState::Ok);
        let detection = detect(&backend, &file, Some(&current), policy).await.unwrap();
        assert_eq!(detection.change, Change::Unchanged);
        assert!(detection.hash.is_some());
    }

    #[tokio::test]
    async fn test_touched_file_with_same_contents_is_unchanged() {
        let (backend, file) = backend_with("a.mkv", b"data").await;
        let hash = hash_of(b"data", &policy(1024, 4, false));
        let mut prior = fingerprint("/mock/a.mkv", Some(hash), 4, FileState::Ok);
        prior.modified = utc_datetime!(2020-01-01 0:00);
        let detection = detect(&backend, &file, Some(&prior), policy(1024, 4, false)).await.unwrap();
        assert_eq!(detection.change, Change::Unchanged);
    }

    #[tokio::test]
    async fn test_errored_prior_is_always_reprocessed() {
        let (backend, file) = backend_with("a.mkv", b"data").await;
        let hash = hash_of(b"data", &policy(1024, 4, false));
        let prior = fingerprint("/mock/a.mkv", Some(hash), 4, FileState::Errored);
        let detection = detect(&backend, &file, Some(&prior), policy(1024, 4, false)).await.unwrap();
        assert_eq!(detection.change, Change::Modified);
    }

    #[tokio::test]
    async fn test_hash_kind_mismatch_is_a_modification() {
        let (backend, file) = backend_with("a.mkv", b"0123456789").await;
        let full = hash_of(b"0123456789", &policy(1024, 2, false));
        let mut prior = fingerprint("/mock/a.mkv", Some(full), 10, FileState::Ok);
        prior.size = 11;
        let detection = detect(&backend, &file, Some(&prior), policy(4, 2, false)).await.unwrap();
        assert_eq!(detection.change, Change::Modified);
        assert_eq!(detection.hash.unwrap().kind, HashKind::Sampled);
    }

    #[tokio::test]
    async fn test_unreadable_file_fails() {
        let mock = MockBackend::default();
        mock.write(Path::new("a.mkv"), b"data").await.unwrap();
        mock.deny_read(Path::new("a.mkv")).await.unwrap();
        let file = mock.stat(Path::new("a.mkv")).await.unwrap();
        let backend: BackendHandle = Arc::new(mock);
        let err = detect(&backend, &file, None, policy(1024, 4, false)).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::PermissionDenied(_)));
    }

    #[test]
    fn test_deleted_respects_scope() {
        let priors = [
            fingerprint("/lib/kept.mkv", None, 1, FileState::Ok),
            fingerprint("/lib/gone.mkv", None, 1, FileState::Ok),
            fingerprint("/lib/sub/gone.mkv", None, 1, FileState::Ok),
            fingerprint("/other/gone.mkv", None, 1, FileState::Ok),
        ];
        let seen = HashSet::from([PathBuf::from("/lib/kept.mkv")]);
        let gone = deleted(&priors, &seen, |path| path.parent() == Some(Path::new("/lib")));
        assert_eq!(gone, vec![PathBuf::from("/lib/gone.mkv")]);
    }
}
