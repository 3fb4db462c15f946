//! SQLite implementation of [`Datastore`].
//!
//! Fingerprints and media records are tightly coupled: a record can't exist
//! without its fingerprint, and deleting a fingerprint cascades to the
//! record.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{FileState, Fingerprint, FingerprintRow, MediaRow, WriteOp};
use crate::store::Datastore;
use async_trait::async_trait;
use exn::OptionExt;
use omni_extract::models::MediaRecord;
use sqlx::{SqliteConnection, SqlitePool};
use std::path::Path;
use tracing::{debug, instrument};

/// Repository for fingerprints and media records in the SQLite database.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self::new(db.pool().clone())
    }
}
impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn sqlx_hates_paths(path: &Path) -> Result<&str> {
        path.to_str().ok_or_raise(|| ErrorKind::InvalidData("path"))
    }

    // =========================================================================
    // Statements, shared between single operations and batches
    // =========================================================================

    async fn upsert_fingerprint_on(conn: &mut SqliteConnection, fingerprint: &Fingerprint) -> Result<i64> {
        let row = FingerprintRow::try_from(fingerprint)?;
        sqlx::query_scalar::<_, i64>(include_str!("../queries/upsert_fingerprint.sql"))
            .bind(row.user_id)
            .bind(row.category_id)
            .bind(row.path)
            .bind(row.hash)
            .bind(row.hash_kind)
            .bind(row.size)
            .bind(row.modified_ns)
            .bind(row.scanned_at)
            .bind(row.state)
            .fetch_one(conn)
            .await
            .map_err(ErrorKind::database)
    }

    async fn upsert_media_record_on(conn: &mut SqliteConnection, fingerprint_id: i64, record: &MediaRecord) -> Result<()> {
        let row = MediaRow::new(fingerprint_id, record)?;
        sqlx::query(include_str!("../queries/upsert_media_record.sql"))
            .bind(row.fingerprint_id)
            .bind(row.media_type)
            .bind(row.kind)
            .bind(row.title)
            .bind(row.year)
            .bind(row.season)
            .bind(row.episode)
            .bind(row.artist)
            .bind(row.album)
            .bind(row.track)
            .bind(row.width)
            .bind(row.height)
            .bind(row.camera)
            .bind(row.captured_at)
            .bind(row.resolution)
            .bind(row.source)
            .bind(row.container)
            .bind(row.video_codec)
            .bind(row.audio_codec)
            .bind(row.duration_ms)
            .bind(row.bitrate)
            .bind(row.sample_rate)
            .bind(row.channels)
            .bind(row.extracted_at)
            .execute(conn)
            .await
            .map_err(ErrorKind::database)?;
        Ok(())
    }

    async fn delete_media_record_on(conn: &mut SqliteConnection, fingerprint_id: i64) -> Result<()> {
        sqlx::query(include_str!("../queries/delete_media_record.sql"))
            .bind(fingerprint_id)
            .execute(conn)
            .await
            .map_err(ErrorKind::database)?;
        Ok(())
    }

    async fn delete_fingerprint_on(conn: &mut SqliteConnection, user_id: &str, path: &Path) -> Result<bool> {
        let result = sqlx::query(include_str!("../queries/delete_fingerprint.sql"))
            .bind(user_id)
            .bind(Self::sqlx_hates_paths(path)?)
            .execute(conn)
            .await
            .map_err(ErrorKind::database)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl Datastore for Repository {
    async fn get_fingerprint(&self, user_id: &str, path: &Path) -> Result<Option<Fingerprint>> {
        let row: Option<FingerprintRow> = sqlx::query_as(include_str!("../queries/get_fingerprint.sql"))
            .bind(user_id)
            .bind(Self::sqlx_hates_paths(path)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(ErrorKind::database)?;
        row.map(Fingerprint::try_from).transpose()
    }

    #[instrument(level = "debug", skip(self))]
    async fn list_fingerprints(&self, user_id: &str, category_id: &str) -> Result<Vec<Fingerprint>> {
        let rows: Vec<FingerprintRow> = sqlx::query_as(include_str!("../queries/list_fingerprints.sql"))
            .bind(user_id)
            .bind(category_id)
            .fetch_all(&self.pool)
            .await
            .map_err(ErrorKind::database)?;
        rows.into_iter().map(Fingerprint::try_from).collect()
    }

    async fn upsert_fingerprint(&self, fingerprint: &Fingerprint) -> Result<i64> {
        let mut conn = self.pool.acquire().await.map_err(ErrorKind::database)?;
        Self::upsert_fingerprint_on(&mut *conn, fingerprint).await
    }

    async fn upsert_media_record(&self, fingerprint_id: i64, record: &MediaRecord) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(ErrorKind::database)?;
        Self::upsert_media_record_on(&mut *conn, fingerprint_id, record).await
    }

    async fn get_media_record(&self, fingerprint_id: i64) -> Result<Option<MediaRecord>> {
        let row: Option<MediaRow> = sqlx::query_as(include_str!("../queries/get_media_record.sql"))
            .bind(fingerprint_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ErrorKind::database)?;
        row.map(MediaRecord::try_from).transpose()
    }

    async fn delete_fingerprint(&self, user_id: &str, path: &Path) -> Result<bool> {
        let mut conn = self.pool.acquire().await.map_err(ErrorKind::database)?;
        Self::delete_fingerprint_on(&mut *conn, user_id, path).await
    }

    /// One transaction per batch: a failure part-way through leaves the
    /// database as it was before the batch.
    #[instrument(level = "debug", skip_all, fields(ops = ops.len()))]
    async fn batch_write(&self, ops: &[WriteOp]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(ErrorKind::database)?;
        for op in ops {
            match op {
                WriteOp::Upsert { fingerprint, record } => {
                    let id = Self::upsert_fingerprint_on(&mut *tx, fingerprint).await?;
                    match (record, fingerprint.state) {
                        (Some(record), _) => Self::upsert_media_record_on(&mut *tx, id, record).await?,
                        (None, FileState::Errored) => Self::delete_media_record_on(&mut *tx, id).await?,
                        (None, FileState::Ok) => {},
                    }
                },
                WriteOp::Delete { user_id, path } => {
                    Self::delete_fingerprint_on(&mut *tx, user_id, path).await?;
                },
            }
        }
        tx.commit().await.map_err(ErrorKind::database)?;
        debug!(ops = ops.len(), "batch committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentHash, HashKind};
    use omni_extract::models::{MediaKind, MediaType, Technical};
    use std::path::PathBuf;
    use time::UtcDateTime;

    async fn repository() -> Repository {
        Repository::from(&Database::connect_in_memory().await.unwrap())
    }

    fn fingerprint(path: &str, hash: &str) -> Fingerprint {
        Fingerprint {
            id: None,
            user_id: "user-1".to_string(),
            category_id: "tv".to_string(),
            path: PathBuf::from(path),
            hash: Some(ContentHash::new(HashKind::Full, hash)),
            size: 1024,
            modified: UtcDateTime::from_unix_timestamp_nanos(1_700_000_000_000_000_001).unwrap(),
            scanned_at: UtcDateTime::from_unix_timestamp(1_700_000_500).unwrap(),
            state: FileState::Ok,
        }
    }

    fn record(title: &str) -> MediaRecord {
        MediaRecord {
            media_type: MediaType::Video,
            kind: MediaKind::TvEpisode,
            title: title.to_string(),
            year: None,
            season: Some(1),
            episode: Some(2),
            artist: None,
            album: None,
            track: None,
            dimensions: None,
            camera: None,
            captured_at: None,
            resolution: Some("1080p".to_string()),
            source: None,
            technical: Technical {
                container: Some("mp4".to_string()),
                duration_ms: Some(1_320_000),
                ..Default::default()
            },
            extracted_at: UtcDateTime::from_unix_timestamp(1_700_000_600).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let repo = repository().await;
        let id = repo.upsert_fingerprint(&fingerprint("/tv/a.mp4", "aa")).await.unwrap();
        let stored = repo.get_fingerprint("user-1", Path::new("/tv/a.mp4")).await.unwrap().unwrap();
        assert_eq!(stored, Fingerprint { id: Some(id), ..fingerprint("/tv/a.mp4", "aa") });
        assert!(repo.get_fingerprint("user-2", Path::new("/tv/a.mp4")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_is_keyed_by_user_and_path() {
        let repo = repository().await;
        let first = repo.upsert_fingerprint(&fingerprint("/tv/a.mp4", "aa")).await.unwrap();
        let second = repo.upsert_fingerprint(&fingerprint("/tv/a.mp4", "bb")).await.unwrap();
        assert_eq!(first, second);
        let stored = repo.get_fingerprint("user-1", Path::new("/tv/a.mp4")).await.unwrap().unwrap();
        assert_eq!(stored.hash.unwrap().value, "bb");
        assert_eq!(repo.list_fingerprints("user-1", "tv").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_media_record_round_trip() {
        let repo = repository().await;
        let id = repo.upsert_fingerprint(&fingerprint("/tv/a.mp4", "aa")).await.unwrap();
        repo.upsert_media_record(id, &record("Show")).await.unwrap();
        repo.upsert_media_record(id, &record("Show Renamed")).await.unwrap();
        assert_eq!(repo.get_media_record(id).await.unwrap(), Some(record("Show Renamed")));
    }

    #[tokio::test]
    async fn test_delete_cascades_to_record() {
        let repo = repository().await;
        let id = repo.upsert_fingerprint(&fingerprint("/tv/a.mp4", "aa")).await.unwrap();
        repo.upsert_media_record(id, &record("Show")).await.unwrap();
        assert!(repo.delete_fingerprint("user-1", Path::new("/tv/a.mp4")).await.unwrap());
        assert!(!repo.delete_fingerprint("user-1", Path::new("/tv/a.mp4")).await.unwrap());
        assert_eq!(repo.get_media_record(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_batch_write() {
        let repo = repository().await;
        repo.upsert_fingerprint(&fingerprint("/tv/gone.mp4", "00")).await.unwrap();
        let errored = Fingerprint { hash: None, state: FileState::Errored, ..fingerprint("/tv/bad.mkv", "") };
        let ops = vec![
            WriteOp::Upsert { fingerprint: fingerprint("/tv/a.mp4", "aa"), record: Some(record("A")) },
            WriteOp::Upsert { fingerprint: errored, record: None },
            WriteOp::Delete { user_id: "user-1".to_string(), path: PathBuf::from("/tv/gone.mp4") },
        ];
        repo.batch_write(&ops).await.unwrap();

        let stored = repo.list_fingerprints("user-1", "tv").await.unwrap();
        let paths: Vec<_> = stored.iter().map(|f| f.path.to_str().unwrap()).collect();
        assert_eq!(paths, vec!["/tv/a.mp4", "/tv/bad.mkv"]);
        assert_eq!(stored[1].state, FileState::Errored);
        assert_eq!(repo.get_media_record(stored[0].id.unwrap()).await.unwrap(), Some(record("A")));
    }

    #[tokio::test]
    async fn test_errored_upsert_removes_stale_record() {
        let repo = repository().await;
        let id = repo.upsert_fingerprint(&fingerprint("/tv/a.mp4", "aa")).await.unwrap();
        repo.upsert_media_record(id, &record("A")).await.unwrap();
        let errored = Fingerprint { hash: None, state: FileState::Errored, ..fingerprint("/tv/a.mp4", "") };
        repo.batch_write(&[WriteOp::Upsert { fingerprint: errored, record: None }]).await.unwrap();
        assert_eq!(repo.get_media_record(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_batch_rolls_back() {
        let repo = repository().await;
        let invalid = Fingerprint { size: u64::MAX, ..fingerprint("/tv/huge.mkv", "ff") };
        let ops = vec![
            WriteOp::Upsert { fingerprint: fingerprint("/tv/a.mp4", "aa"), record: None },
            WriteOp::Upsert { fingerprint: invalid, record: None },
        ];
        let err = repo.batch_write(&ops).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData(_)));
        assert!(repo.list_fingerprints("user-1", "tv").await.unwrap().is_empty());
    }
}
