//! Producer: the client half. Extracts a target from a mail, enqueues it,
//! and optionally picks up the result of an earlier unsubscribe.

use crate::db::{StatusQueue, WorkQueue};
use crate::error::{Error, Result};
use crate::extract::extract_unsubscribe_target;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// What one client invocation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub target: String,
    /// `false` when the target was already pending.
    pub enqueued: bool,
    /// A completion message from an earlier run, if one arrived in time.
    pub status: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Producer {
    work: WorkQueue,
    status: StatusQueue,
}

impl Producer {
    pub fn new(work: WorkQueue, status: StatusQueue) -> Self {
        Self { work, status }
    }

    /// Enqueue one target. Never touches the network.
    pub async fn enqueue(&self, target: &str) -> Result<bool> {
        let enqueued = self.work.put(target).await?;
        info!(url = target, enqueued, "target queued");
        Ok(enqueued)
    }

    /// Start a task that reads exactly one status message.
    ///
    /// The task blocks until a message exists; dropping the handle does not
    /// stop it, aborting does.
    pub fn spawn_status_reporter(&self) -> JoinHandle<Result<String>> {
        let status = self.status.clone();
        tokio::spawn(async move { status.get().await })
    }

    /// Extract the target from `raw` and enqueue it.
    ///
    /// With `status_wait`, a status reporter runs alongside the enqueue and
    /// is given that long after the enqueue to deliver a message. Extraction
    /// failures return before anything is enqueued or spawned.
    pub async fn submit(&self, raw: &[u8], status_wait: Option<Duration>) -> Result<Submission> {
        let target = extract_unsubscribe_target(raw)?;
        debug!(url = %target, "extracted unsubscribe target");

        let reporter = status_wait.map(|wait| (self.spawn_status_reporter(), wait));
        let enqueued = self.enqueue(&target).await?;

        let status = match reporter {
            Some((handle, wait)) => await_status(handle, wait).await?,
            None => None,
        };

        Ok(Submission {
            target,
            enqueued,
            status,
        })
    }
}

async fn await_status(
    mut handle: JoinHandle<Result<String>>,
    wait: Duration,
) -> Result<Option<String>> {
    match tokio::time::timeout(wait, &mut handle).await {
        Ok(Ok(message)) => message.map(Some),
        Ok(Err(e)) => Err(Error::Other(format!("status reporter failed: {e}"))),
        Err(_) => {
            debug!(?wait, "no status message arrived");
            handle.abort();
            Ok(None)
        }
    }
}
