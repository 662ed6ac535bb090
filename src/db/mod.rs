//! Queue database: connection pool, schema, and health check.
//!
//! Both queues share one SQLite file. Client and server run as separate
//! processes against it, so the pool uses WAL journaling and a busy
//! timeout, and every queue mutation is a single atomic statement.

pub mod lease;
pub mod status;
pub mod work;

use crate::error::Result;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;

pub use lease::ConsumerLease;
pub use status::StatusQueue;
pub use work::WorkQueue;

/// Database handle. Owns the connection pool shared by both queues.
#[derive(Debug, Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Open (creating if needed) the queue database at `path`.
    ///
    /// An unusable location is reported as a store error like any other
    /// failure to reach the database.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(sqlx::Error::Io)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// In-memory database (for testing). A single connection keeps every
    /// query on the same memory store.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self { pool })
    }

    /// Create the queue tables if they do not exist yet.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(
            "
            CREATE TABLE IF NOT EXISTS queue_work (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                payload     TEXT NOT NULL,
                state       TEXT NOT NULL DEFAULT 'pending',
                enqueued_at TEXT NOT NULL,
                dequeued_at TEXT
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_work_pending_payload
                ON queue_work(payload) WHERE state = 'pending';

            CREATE TABLE IF NOT EXISTS queue_status (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                message     TEXT NOT NULL,
                enqueued_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS consumer_lease (
                id           INTEGER PRIMARY KEY CHECK (id = 1),
                owner        TEXT NOT NULL,
                pid          INTEGER NOT NULL,
                heartbeat_at INTEGER NOT NULL
            );
            ",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Round-trip a trivial query to prove the store is reachable.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Handle to the deduplicating work queue.
    pub fn work_queue(&self, poll_interval: Duration) -> WorkQueue {
        WorkQueue::new(self.pool.clone(), poll_interval)
    }

    /// Handle to the FIFO status queue.
    pub fn status_queue(&self, poll_interval: Duration) -> StatusQueue {
        StatusQueue::new(self.pool.clone(), poll_interval)
    }
}

/// Encode a payload the way it is persisted: as a JSON string literal.
pub(crate) fn encode_payload(payload: &str) -> Result<String> {
    serde_json::to_string(payload)
        .map_err(|e| crate::error::Error::Other(format!("serialize payload: {e}")))
}

/// Decode a persisted payload. A row that is not a JSON string is corrupt.
pub(crate) fn decode_payload(raw: &str) -> Result<String> {
    serde_json::from_str(raw).map_err(|e| {
        crate::error::Error::Store(sqlx::Error::Decode(
            format!("corrupt queue payload {raw:?}: {e}").into(),
        ))
    })
}
