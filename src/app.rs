//! Entry points for the two modes of the executable.

use crate::action::HttpUnsubscriber;
use crate::config::Config;
use crate::db::Db;
use crate::engine::{Consumer, ConsumerConfig, Producer, Submission};
use crate::error::{Error, Result};
use tokio::io::AsyncReadExt as _;
use tracing::{info, warn};

/// Which half of the pipeline this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Read a mail on stdin and queue its unsubscribe target.
    Client,
    /// Work the queue until interrupted.
    Server,
}

#[cfg(unix)]
type Listener = tokio::signal::unix::Signal;
#[cfg(windows)]
type Listener = tokio::signal::windows::CtrlC;

/// Ctrl-c listener. The handler is registered when this is created, not
/// when it is first awaited, so no startup step runs unguarded.
pub struct Interrupt {
    listener: Option<Listener>,
}

impl Interrupt {
    /// Register the handler. Must be called inside the runtime.
    ///
    /// If registration fails the error is logged and [`recv`](Self::recv)
    /// never completes; the process then keeps the default signal action.
    pub fn install() -> Self {
        #[cfg(unix)]
        let listener =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt());
        #[cfg(windows)]
        let listener = tokio::signal::windows::ctrl_c();

        match listener {
            Ok(listener) => Self {
                listener: Some(listener),
            },
            Err(e) => {
                warn!(error = %e, "cannot listen for interrupts");
                Self { listener: None }
            }
        }
    }

    /// Wait for the next interrupt.
    pub async fn recv(&mut self) {
        if let Some(listener) = self.listener.as_mut() {
            if listener.recv().await.is_some() {
                return;
            }
        }
        std::future::pending::<()>().await
    }
}

/// Open the queue store and run `command` to completion.
///
/// An interrupt (ctrl-c) at any point ends either mode cleanly with `Ok(())`.
pub async fn run(command: Command, config: &Config) -> Result<()> {
    let mut interrupt = Interrupt::install();

    match command {
        Command::Client => tokio::select! {
            result = run_client(config) => result,
            _ = interrupt.recv() => {
                info!("interrupted");
                Ok(())
            }
        },
        Command::Server => run_server(config, interrupt).await,
    }
}

async fn open_store(config: &Config) -> Result<Db> {
    let db = Db::open(&config.database_path()).await?;
    db.migrate().await?;
    info!(path = %config.database_path().display(), "queue store ready");
    Ok(db)
}

async fn run_client(config: &Config) -> Result<()> {
    let mut raw = Vec::new();
    tokio::io::stdin().read_to_end(&mut raw).await?;

    let db = open_store(config).await?;
    let producer = Producer::new(
        db.work_queue(config.poll_interval),
        db.status_queue(config.poll_interval),
    );

    let submission = producer.submit(&raw, Some(config.status_wait)).await?;
    render(&submission, config.debug);
    Ok(())
}

async fn run_server(config: &Config, mut interrupt: Interrupt) -> Result<()> {
    let consumer = tokio::select! {
        consumer = build_consumer(config) => consumer?,
        _ = interrupt.recv() => {
            info!("interrupted during startup");
            return Ok(());
        }
    };

    let ctrl = consumer.clone();
    tokio::spawn(async move {
        interrupt.recv().await;
        ctrl.shutdown();
    });

    consumer.run().await
}

async fn build_consumer(config: &Config) -> Result<Consumer<HttpUnsubscriber>> {
    let db = open_store(config).await?;
    let action = HttpUnsubscriber::new(config.debug)
        .map_err(|e| Error::Other(format!("failed to build HTTP client: {e}")))?;
    Ok(Consumer::new(
        db.work_queue(config.poll_interval),
        db.status_queue(config.poll_interval),
        action,
        ConsumerConfig {
            retry_delay: config.retry_delay,
            echo_progress: !config.debug,
            lease_ttl: config.lease_ttl,
        },
    ))
}

/// Show the outcome of a client run to whoever invoked it.
///
/// Without debug, the status line is printed after a cursor-home escape so
/// it lands at the top of the mail reader's screen.
fn render(submission: &Submission, debug: bool) {
    let Some(ref status) = submission.status else {
        return;
    };
    if debug {
        info!(status = %status, "earlier unsubscribe finished");
    } else {
        println!("\x1b[H{status}");
    }
}
