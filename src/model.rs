//! Core data model.
//!
//! A work item is one unsubscribe target URL. It has no identity beyond its
//! exact string value, which is also its dedup key.

use chrono::{DateTime, Utc};

// ---------------------------------------------------------------------------
// Queue state
// ---------------------------------------------------------------------------

/// Lifecycle state of a work queue entry while it is still in the store.
///
/// Acknowledged entries are deleted, so there is no terminal state here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueState {
    /// Waiting for the consumer.
    Pending,
    /// Claimed by the consumer, not yet acknowledged.
    Dequeued,
}

impl std::fmt::Display for QueueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QueueState::Pending => "pending",
            QueueState::Dequeued => "dequeued",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for QueueState {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QueueState::Pending),
            "dequeued" => Ok(QueueState::Dequeued),
            other => Err(crate::error::Error::Other(format!(
                "unknown queue state: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// A row of the work queue as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkEntry {
    pub id: i64,
    pub payload: String,
    pub state: QueueState,
    pub enqueued_at: DateTime<Utc>,
    pub dequeued_at: Option<DateTime<Utc>>,
}

/// Receipt for an entry claimed by [`WorkQueue::get`](crate::db::work::WorkQueue::get).
///
/// Acknowledging requires the receipt, so `done` can only follow a matching
/// `get`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: i64,
    pub payload: String,
    pub enqueued_at: DateTime<Utc>,
}

/// Status line published after a target was handled.
pub fn status_message(target: &str) -> String {
    format!("{target} done")
}
