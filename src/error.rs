//! Error types for discourse-unsubscriber.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot extract unsubscribe target: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("queue store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("another server (pid {pid}) is already working the queue")]
    ConsumerBusy { pid: i64 },

    #[error("consumer lease was taken over by another server")]
    LeaseLost,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Why a raw message did not yield an unsubscribe target.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("message has no List-Unsubscribe header")]
    MissingHeader,

    #[error("malformed message headers: {0}")]
    Malformed(#[from] mailparse::MailParseError),

    #[error("List-Unsubscribe header is empty")]
    Empty,
}

/// Why one remote unsubscribe attempt failed. Always retried by the worker.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("invalid target {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("no form found on {url}")]
    MissingForm { url: String },
}

pub type Result<T> = std::result::Result<T, Error>;
