//! # discourse-unsubscriber
//!
//! Leave Discourse threads from your mail reader. The client extracts the
//! `List-Unsubscribe` target from a mail and queues it; the server works the
//! queue, submitting each confirmation form until it succeeds.
//!
//! Both sides share two SQLite-backed queues: a deduplicating work queue
//! and a FIFO status queue that reports completions back to the client.

pub mod action;
pub mod app;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod extract;
pub mod model;
pub mod retry;
pub mod telemetry;
