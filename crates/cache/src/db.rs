//! SQLite pool setup: connection options, per-connection tuning and the
//! embedded schema migrations.

use exn::ResultExt;
use sqlx::SqliteConnection;
use sqlx::sqlite::{SqliteAutoVacuum, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::{ErrorKind, Result};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// One connection for the batch writer, the rest for fingerprint lookups
/// from scan workers.
const POOL_SIZE: u32 = 5;
/// How long a connection waits on a locked database before giving up with
/// `SQLITE_BUSY`, which surfaces as [`Unavailable`](ErrorKind::Unavailable)
/// and is retried by the scanner's writer.
const BUSY_TIMEOUT: Duration = Duration::from_millis(1500);
/// Tuning that `SqliteConnectOptions` has no setter for. Run on every new
/// pooled connection.
const CONNECTION_PRAGMAS: &[&str] = &[
    "PRAGMA wal_autocheckpoint = 1000",
    "PRAGMA cache_size = -16384",
    "PRAGMA temp_store = MEMORY",
    "PRAGMA analysis_limit = 400",
];

/// Connection pool for the fingerprint database.
///
/// Connecting runs the embedded migrations, so a `Database` always has the
/// current schema. Build a [`Repository`](crate::Repository) from it to read
/// and write.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database file at `path`.
    ///
    /// The parent directory must already exist.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let options = Self::options().filename(path.as_ref()).create_if_missing(true);
        Self::open(options, POOL_SIZE).await
    }

    /// Open a private in-memory database, gone once the pool closes.
    ///
    /// Not test-only: other crates build their own test fixtures on it.
    pub async fn connect_in_memory() -> Result<Self> {
        // Each in-memory connection is its own database, so the pool must
        // never hold more than one.
        let options = Self::options().filename(":memory:");
        Self::open(options, 1).await
    }

    fn options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .journal_mode(SqliteJournalMode::Wal)
            // Media records are removed with their fingerprint by cascade.
            .foreign_keys(true)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
            .auto_vacuum(SqliteAutoVacuum::None)
    }

    async fn open(options: SqliteConnectOptions, connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(connections)
            .after_connect(|conn, _meta| Box::pin(async move { Self::tune(conn).await }))
            .connect_with(options)
            .await
            .map_err(ErrorKind::database)?;
        let database = Self { pool };
        database.migrate().await?;
        Ok(database)
    }

    async fn tune(conn: &mut SqliteConnection) -> sqlx::Result<()> {
        for pragma in CONNECTION_PRAGMAS {
            sqlx::query(pragma).execute(&mut *conn).await?;
        }
        Ok(())
    }

    async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.or_raise(|| ErrorKind::Migration)?;
        debug!("Schema is up to date");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Refresh query planner statistics, then wait for every connection to
    /// be returned and close the pool.
    pub async fn close(&self) {
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database_opens_and_closes() {
        let db = Database::connect_in_memory().await.unwrap();
        assert!(!db.pool().is_closed());
        db.close().await;
        assert!(db.pool().is_closed());
    }

    #[tokio::test]
    async fn test_migrating_twice_is_harmless() {
        let db = Database::connect_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        db.close().await;
    }

    #[tokio::test]
    async fn test_schema_is_created() {
        let db = Database::connect_in_memory().await.unwrap();
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' \
             AND name NOT LIKE 'sqlite%' AND name != '_sqlx_migrations' ORDER BY name",
        )
        .fetch_all(db.pool())
        .await
        .unwrap();
        assert_eq!(tables, vec!["fingerprints", "media_records"]);
        db.close().await;
    }

    #[tokio::test]
    async fn test_connect_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("omni.db");
        let db = Database::connect(&path).await.unwrap();
        db.close().await;
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_connections_are_tuned() {
        let db = Database::connect_in_memory().await.unwrap();
        let foreign_keys: i64 = sqlx::query_scalar("PRAGMA foreign_keys").fetch_one(db.pool()).await.unwrap();
        assert_eq!(foreign_keys, 1);
        let checkpoint: i64 = sqlx::query_scalar("PRAGMA wal_autocheckpoint").fetch_one(db.pool()).await.unwrap();
        assert_eq!(checkpoint, 1000);
        db.close().await;
    }
}
