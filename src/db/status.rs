//! Status queue: durable FIFO of completion messages.
//!
//! Reads are destructive; a message is handed out once and never
//! acknowledged separately.

use crate::db::{decode_payload, encode_payload};
use crate::error::Result;
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use sqlx::SqlitePool;
use std::time::Duration;

const QUEUE: &str = "status";

/// Handle to the status queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct StatusQueue {
    pool: SqlitePool,
    poll_interval: Duration,
}

impl StatusQueue {
    pub(crate) fn new(pool: SqlitePool, poll_interval: Duration) -> Self {
        Self {
            pool,
            poll_interval,
        }
    }

    /// Append a message.
    pub async fn put(&self, message: &str) -> Result<()> {
        sqlx::query("INSERT INTO queue_status (message, enqueued_at) VALUES ($1, $2)")
            .bind(encode_payload(message)?)
            .bind(chrono::Utc::now())
            .execute(&self.pool)
            .await?;
        record("put");
        Ok(())
    }

    /// Remove and return the oldest message, if any.
    pub async fn try_get(&self) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            "DELETE FROM queue_status
             WHERE id = (SELECT MIN(id) FROM queue_status)
             RETURNING message",
        )
        .fetch_optional(&self.pool)
        .await?;

        record(if row.is_some() { "get" } else { "get_empty" });
        row.map(|(raw,)| decode_payload(&raw)).transpose()
    }

    /// Block until a message exists, then remove and return it.
    pub async fn get(&self) -> Result<String> {
        loop {
            if let Some(message) = self.try_get().await? {
                return Ok(message);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Number of unread messages.
    pub async fn count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM queue_status")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}

fn record(operation: &'static str) {
    metrics::queue_operations().add(
        1,
        &[
            KeyValue::new("queue", QUEUE),
            KeyValue::new("operation", operation),
        ],
    );
}
