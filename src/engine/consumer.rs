//! Consumer: drains the work queue one target at a time, retrying each until
//! the remote action succeeds.

use crate::action::UnsubscribeAction;
use crate::db::{ConsumerLease, StatusQueue, WorkQueue};
use crate::error::Result;
use crate::model::{Delivery, status_message};
use crate::retry::{AttemptOutcome, retry_forever};
use crate::telemetry::metrics;
use crate::telemetry::work::{record_attempt, start_unsubscribe_span};
use opentelemetry::KeyValue;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{Instrument, error, info, warn};

/// Configuration for the consumer loop.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Fixed wait between failed attempts on the same target.
    pub retry_delay: Duration,
    /// Print each dequeued target and its completion on stdout.
    pub echo_progress: bool,
    /// How long a silent consumer keeps its lease before another server
    /// may take over. Renewed every third of this while running.
    pub lease_ttl: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(30),
            echo_progress: false,
            lease_ttl: Duration::from_secs(30),
        }
    }
}

/// The single sequential worker.
///
/// Strict FIFO: a target that never succeeds keeps the worker busy forever
/// and everything behind it waits.
pub struct Consumer<A> {
    work: WorkQueue,
    status: StatusQueue,
    action: Arc<A>,
    config: ConsumerConfig,
    shutdown: Arc<Notify>,
}

impl<A> Clone for Consumer<A> {
    fn clone(&self) -> Self {
        Self {
            work: self.work.clone(),
            status: self.status.clone(),
            action: Arc::clone(&self.action),
            config: self.config.clone(),
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

impl<A: UnsubscribeAction> Consumer<A> {
    pub fn new(work: WorkQueue, status: StatusQueue, action: A, config: ConsumerConfig) -> Self {
        Self {
            work,
            status,
            action: Arc::new(action),
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Signal the consumer to stop. An attempt in flight is abandoned; its
    /// entry stays unacknowledged in the store.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Take the consumer lease, recover entries a previous run left
    /// unacknowledged, then process work until shutdown.
    ///
    /// Fails with [`Error::ConsumerBusy`](crate::error::Error::ConsumerBusy)
    /// without touching the queue while another consumer is live. Store
    /// errors and a lost lease end the loop.
    pub async fn run(&self) -> Result<()> {
        let lease = self.work.acquire_lease(self.config.lease_ttl).await?;
        let result = self.run_leased(&lease).await;
        if let Err(e) = lease.release().await {
            warn!(error = %e, "failed to release consumer lease");
        }
        result
    }

    async fn run_leased(&self, lease: &ConsumerLease) -> Result<()> {
        let requeued = self.work.requeue_unacknowledged(lease).await?;
        if requeued > 0 {
            warn!(requeued, "re-delivering targets from an interrupted run");
        }
        let backlog = self.work.pending().await?.len();
        info!(backlog, "consumer started, waiting for work");

        let keep_alive = lease.keep_alive();
        tokio::pin!(keep_alive);

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("consumer shutting down");
                    return Ok(());
                }
                lost = &mut keep_alive => {
                    error!("consumer lease lost, stopping");
                    return lost;
                }
                result = self.process_next() => result?,
            }
        }
    }

    /// Wait for one target and handle it to completion.
    pub async fn process_next(&self) -> Result<()> {
        let delivery = self.work.get().await?;
        self.handle(delivery).await
    }

    async fn handle(&self, delivery: Delivery) -> Result<()> {
        let span = start_unsubscribe_span(&delivery.payload);
        let started = Instant::now();

        async {
            info!(id = delivery.id, enqueued_at = %delivery.enqueued_at, "dequeued");
            if self.config.echo_progress {
                println!("{}", delivery.payload);
            }

            retry_forever(
                || self.action.unsubscribe(&delivery.payload),
                self.config.retry_delay,
                |attempt, outcome| match outcome {
                    AttemptOutcome::Succeeded => {
                        record_attempt(&span, attempt, None);
                        metrics::unsubscribe_attempts().add(1, &[KeyValue::new("result", "ok")]);
                    }
                    AttemptOutcome::Failed { error, retry_in } => {
                        record_attempt(&span, attempt, Some(error as &dyn std::fmt::Display));
                        metrics::unsubscribe_attempts()
                            .add(1, &[KeyValue::new("result", "error")]);
                        info!(retry_in_secs = retry_in.as_secs_f64(), "waiting before retry");
                    }
                },
            )
            .await;

            let message = status_message(&delivery.payload);
            self.work.done(&delivery).await?;
            self.status.put(&message).await?;
            if self.config.echo_progress {
                println!("{message}");
            }

            let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
            metrics::unsubscribe_duration_ms().record(duration_ms, &[]);
            info!(duration_ms, "unsubscribed");
            Ok(())
        }
        .instrument(span.clone())
        .await
    }
}
