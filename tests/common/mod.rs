//! Shared test utilities: in-memory and file-backed stores, and a scripted
//! stand-in for the remote unsubscribe action.

#![allow(dead_code)]

use discourse_unsubscriber::action::{ActionError, UnsubscribeAction};
use discourse_unsubscriber::db::Db;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const POLL: Duration = Duration::from_millis(10);

/// Fresh in-memory store with the schema applied.
pub async fn test_db() -> Db {
    let db = Db::in_memory().await.unwrap();
    db.migrate().await.unwrap();
    db
}

/// A unique scratch directory under the system temp dir.
pub fn scratch_dir(name: &str) -> PathBuf {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!(
        "discourse-unsubscriber-{name}-{}-{n}",
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

/// Raw mail with the given `List-Unsubscribe` header value.
pub fn mail(unsubscribe: &str) -> Vec<u8> {
    format!(
        "From: forum@example.com\r\n\
         To: me@example.com\r\n\
         Subject: [Forum] New reply\r\n\
         List-Unsubscribe: {unsubscribe}\r\n\
         \r\n\
         Someone replied.\r\n"
    )
    .into_bytes()
}

/// Remote action whose outcome per target is scripted up front.
///
/// Targets fail a set number of times (or forever) before succeeding.
/// Clones share the call log.
#[derive(Clone, Default)]
pub struct Scripted {
    failures_left: Arc<Mutex<HashMap<String, u32>>>,
    always_fail: Arc<HashSet<String>>,
    calls: Arc<Mutex<Vec<(String, Instant)>>>,
}

impl Scripted {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(self, target: &str, times: u32) -> Self {
        self.failures_left
            .lock()
            .unwrap()
            .insert(target.to_string(), times);
        self
    }

    pub fn failing_forever(mut self, target: &str) -> Self {
        let mut set = (*self.always_fail).clone();
        set.insert(target.to_string());
        self.always_fail = Arc::new(set);
        self
    }

    /// Targets in the order they were attempted.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(target, _)| target.clone())
            .collect()
    }

    /// Instants of every attempt, in order.
    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }
}

impl UnsubscribeAction for Scripted {
    async fn unsubscribe(&self, target: &str) -> Result<(), ActionError> {
        self.calls
            .lock()
            .unwrap()
            .push((target.to_string(), Instant::now()));

        if self.always_fail.contains(target) {
            return Err(ActionError::MissingForm {
                url: target.to_string(),
            });
        }

        let mut failures = self.failures_left.lock().unwrap();
        match failures.get_mut(target) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(ActionError::MissingForm {
                    url: target.to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}
