//! Consumer lease: at most one server works the queue at a time.
//!
//! The lease is a single row holding the owner, its pid, and a heartbeat in
//! unix milliseconds. A lease whose heartbeat is older than its TTL is
//! considered abandoned and may be taken over, so a crashed server does not
//! lock the queue forever.

use crate::error::{Error, Result};
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Proof of exclusive consumer access to the work queue.
///
/// Not `Clone`: the holder is the one consumer allowed to recover and
/// claim entries.
#[derive(Debug)]
pub struct ConsumerLease {
    pool: SqlitePool,
    owner: String,
    ttl: Duration,
}

impl ConsumerLease {
    /// Take the lease, or fail with [`Error::ConsumerBusy`] while another
    /// owner's heartbeat is younger than `ttl`.
    pub(crate) async fn acquire(pool: SqlitePool, ttl: Duration) -> Result<Self> {
        let owner = owner_token();
        let now = now_millis();
        let stale_before = now.saturating_sub(millis(ttl));

        let taken = sqlx::query(
            "INSERT INTO consumer_lease (id, owner, pid, heartbeat_at)
             VALUES (1, $1, $2, $3)
             ON CONFLICT(id) DO UPDATE
                SET owner = excluded.owner, pid = excluded.pid, heartbeat_at = excluded.heartbeat_at
                WHERE consumer_lease.heartbeat_at < $4",
        )
        .bind(&owner)
        .bind(i64::from(std::process::id()))
        .bind(now)
        .bind(stale_before)
        .execute(&pool)
        .await?
        .rows_affected()
            > 0;

        if !taken {
            let pid: Option<(i64,)> =
                sqlx::query_as("SELECT pid FROM consumer_lease WHERE id = 1")
                    .fetch_optional(&pool)
                    .await?;
            return Err(Error::ConsumerBusy {
                pid: pid.map(|(pid,)| pid).unwrap_or_default(),
            });
        }

        info!(%owner, ?ttl, "consumer lease acquired");
        Ok(Self { pool, owner, ttl })
    }

    /// Refresh the heartbeat. Fails with [`Error::LeaseLost`] if another
    /// consumer has taken the lease over.
    pub async fn heartbeat(&self) -> Result<()> {
        let rows_affected =
            sqlx::query("UPDATE consumer_lease SET heartbeat_at = $1 WHERE id = 1 AND owner = $2")
                .bind(now_millis())
                .bind(&self.owner)
                .execute(&self.pool)
                .await?
                .rows_affected();

        if rows_affected == 0 {
            return Err(Error::LeaseLost);
        }
        debug!(owner = %self.owner, "consumer lease renewed");
        Ok(())
    }

    /// Confirm the lease is still ours inside an open transaction.
    pub(crate) async fn verify(&self, conn: &mut sqlx::SqliteConnection) -> Result<()> {
        let held: Option<(String,)> =
            sqlx::query_as("SELECT owner FROM consumer_lease WHERE id = 1 AND owner = $1")
                .bind(&self.owner)
                .fetch_optional(conn)
                .await?;
        held.map(|_| ()).ok_or(Error::LeaseLost)
    }

    /// Renew the heartbeat every third of the TTL until it fails.
    ///
    /// Only returns on error; the caller treats that as fatal.
    pub async fn keep_alive(&self) -> Result<()> {
        let mut interval = tokio::time::interval((self.ttl / 3).max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;
        loop {
            interval.tick().await;
            self.heartbeat().await?;
        }
    }

    /// Give the lease up so the next server can start immediately.
    pub async fn release(self) -> Result<()> {
        sqlx::query("DELETE FROM consumer_lease WHERE id = 1 AND owner = $1")
            .bind(&self.owner)
            .execute(&self.pool)
            .await?;
        info!(owner = %self.owner, "consumer lease released");
        Ok(())
    }
}

fn owner_token() -> String {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    format!(
        "{}-{}-{}",
        std::process::id(),
        now_millis(),
        SEQ.fetch_add(1, Ordering::Relaxed)
    )
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}
