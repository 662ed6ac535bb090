//! Work queue: durable, deduplicating, acknowledged explicitly.
//!
//! An entry moves `pending → dequeued → (deleted)`. Dedup applies to pending
//! entries only, enforced by a partial unique index on the payload.

use crate::db::{ConsumerLease, decode_payload, encode_payload};
use crate::error::{Error, Result};
use crate::model::{Delivery, QueueState, WorkEntry};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use sqlx::SqlitePool;
use std::time::Duration;

const QUEUE: &str = "work";

/// Handle to the work queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    pool: SqlitePool,
    poll_interval: Duration,
}

impl WorkQueue {
    pub(crate) fn new(pool: SqlitePool, poll_interval: Duration) -> Self {
        Self {
            pool,
            poll_interval,
        }
    }

    /// Enqueue `payload` unless an identical entry is already pending.
    ///
    /// Returns `true` when a new entry was stored, `false` on a dedup hit.
    pub async fn put(&self, payload: &str) -> Result<bool> {
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO queue_work (payload, state, enqueued_at)
             VALUES ($1, 'pending', $2)",
        )
        .bind(encode_payload(payload)?)
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await?
        .rows_affected()
            > 0;

        record(if inserted { "put" } else { "put_duplicate" });
        Ok(inserted)
    }

    /// Claim the oldest pending entry, if any.
    ///
    /// The claim is one `UPDATE … RETURNING` statement, so concurrent
    /// callers in other processes can never receive the same entry.
    pub async fn try_get(&self) -> Result<Option<Delivery>> {
        let row: Option<(i64, String, chrono::DateTime<chrono::Utc>)> = sqlx::query_as(
            "UPDATE queue_work SET state = 'dequeued', dequeued_at = $1
             WHERE id = (SELECT id FROM queue_work WHERE state = 'pending' ORDER BY id LIMIT 1)
             RETURNING id, payload, enqueued_at",
        )
        .bind(chrono::Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        let delivery = match row {
            Some((id, raw, enqueued_at)) => Some(Delivery {
                id,
                payload: decode_payload(&raw)?,
                enqueued_at,
            }),
            None => None,
        };

        record(if delivery.is_some() { "get" } else { "get_empty" });
        Ok(delivery)
    }

    /// Block until a pending entry exists, then claim it.
    pub async fn get(&self) -> Result<Delivery> {
        loop {
            if let Some(delivery) = self.try_get().await? {
                return Ok(delivery);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Acknowledge a delivery, removing it from the store.
    pub async fn done(&self, delivery: &Delivery) -> Result<()> {
        let rows_affected = sqlx::query("DELETE FROM queue_work WHERE id = $1 AND state = 'dequeued'")
            .bind(delivery.id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows_affected == 0 {
            return Err(Error::Other(format!(
                "work entry {} is not awaiting acknowledgement",
                delivery.id
            )));
        }

        record("done");
        Ok(())
    }

    /// Return entries a previous consumer claimed but never acknowledged to
    /// the pending state, keeping their original position.
    ///
    /// Requires the consumer lease, so no live consumer can be holding any
    /// of those entries. An entry whose payload is already pending again is
    /// dropped instead. Returns how many entries were requeued.
    pub async fn requeue_unacknowledged(&self, lease: &ConsumerLease) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        lease.verify(&mut tx).await?;

        sqlx::query(
            "DELETE FROM queue_work
             WHERE state = 'dequeued'
             AND (payload IN (SELECT payload FROM queue_work WHERE state = 'pending')
                  OR id NOT IN (SELECT MIN(id) FROM queue_work WHERE state = 'dequeued' GROUP BY payload))",
        )
        .execute(&mut *tx)
        .await?;

        let requeued = sqlx::query(
            "UPDATE queue_work SET state = 'pending', dequeued_at = NULL WHERE state = 'dequeued'",
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        if requeued > 0 {
            record("requeue");
        }
        Ok(requeued)
    }

    /// Take the exclusive consumer lease for this queue.
    ///
    /// Fails with [`Error::ConsumerBusy`] while another consumer holds a
    /// lease refreshed within `ttl`.
    pub async fn acquire_lease(&self, ttl: Duration) -> Result<ConsumerLease> {
        ConsumerLease::acquire(self.pool.clone(), ttl).await
    }

    /// Pending entries in delivery order.
    pub async fn pending(&self) -> Result<Vec<WorkEntry>> {
        self.entries(QueueState::Pending).await
    }

    /// Claimed entries that have not been acknowledged.
    pub async fn unacknowledged(&self) -> Result<Vec<WorkEntry>> {
        self.entries(QueueState::Dequeued).await
    }

    async fn entries(&self, state: QueueState) -> Result<Vec<WorkEntry>> {
        let rows: Vec<WorkEntryRow> = sqlx::query_as(
            "SELECT id, payload, state, enqueued_at, dequeued_at
             FROM queue_work WHERE state = $1 ORDER BY id",
        )
        .bind(state.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(WorkEntryRow::try_into_entry).collect()
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

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct WorkEntryRow {
    id: i64,
    payload: String,
    state: String,
    enqueued_at: chrono::DateTime<chrono::Utc>,
    dequeued_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl WorkEntryRow {
    fn try_into_entry(self) -> Result<WorkEntry> {
        Ok(WorkEntry {
            id: self.id,
            payload: decode_payload(&self.payload)?,
            state: self.state.parse()?,
            enqueued_at: self.enqueued_at,
            dequeued_at: self.dequeued_at,
        })
    }
}
