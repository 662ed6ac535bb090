//! Queue store tests: dedup, ordering, blocking reads, acknowledgement,
//! recovery, and sharing one file between independent handles.

mod common;

use common::{POLL, scratch_dir, test_db};
use discourse_unsubscriber::db::Db;
use discourse_unsubscriber::error::Error;
use discourse_unsubscriber::model::QueueState;
use std::collections::HashSet;
use std::time::Duration;

const LEASE_TTL: Duration = Duration::from_secs(30);

#[tokio::test]
async fn connects_and_migrates() {
    let db = test_db().await;
    assert!(db.health_check().await.is_ok());
    // Migrating twice is harmless.
    db.migrate().await.unwrap();
}

// ---------------------------------------------------------------------------
// Work queue
// ---------------------------------------------------------------------------

#[tokio::test]
async fn put_twice_leaves_one_pending_entry() {
    let work = test_db().await.work_queue(POLL);

    assert!(work.put("http://example.com/unsub").await.unwrap());
    assert!(!work.put("http://example.com/unsub").await.unwrap());

    let pending = work.pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].payload, "http://example.com/unsub");
    assert_eq!(pending[0].state, QueueState::Pending);
    assert_eq!(pending[0].dequeued_at, None);
    // Listing is read-only.
    assert_eq!(work.pending().await.unwrap(), pending);
}

#[tokio::test]
async fn dedup_is_exact_string_equality() {
    let work = test_db().await.work_queue(POLL);

    assert!(work.put("http://example.com/unsub?a=1&b=2").await.unwrap());
    assert!(work.put("http://example.com/unsub?b=2&a=1").await.unwrap());
    assert!(work.put("HTTP://example.com/unsub?a=1&b=2").await.unwrap());

    assert_eq!(work.pending().await.unwrap().len(), 3);
}

#[tokio::test]
async fn get_returns_oldest_distinct_payload_first() {
    let work = test_db().await.work_queue(POLL);

    work.put("u1").await.unwrap();
    work.put("u2").await.unwrap();
    work.put("u1").await.unwrap();

    assert_eq!(work.get().await.unwrap().payload, "u1");
    assert_eq!(work.get().await.unwrap().payload, "u2");
    assert!(work.try_get().await.unwrap().is_none());
}

#[tokio::test]
async fn get_blocks_until_something_is_put() {
    let work = test_db().await.work_queue(POLL);

    let reader = {
        let work = work.clone();
        tokio::spawn(async move { work.get().await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!reader.is_finished(), "get returned on an empty queue");

    work.put("late").await.unwrap();
    let delivery = tokio::time::timeout(Duration::from_secs(5), reader)
        .await
        .expect("get did not wake up")
        .unwrap()
        .unwrap();
    assert_eq!(delivery.payload, "late");
}

#[tokio::test]
async fn dequeued_entry_is_not_handed_out_again() {
    let work = test_db().await.work_queue(POLL);

    work.put("once").await.unwrap();
    let delivery = work.get().await.unwrap();

    assert!(work.try_get().await.unwrap().is_none());
    let unacked = work.unacknowledged().await.unwrap();
    assert_eq!(unacked.len(), 1);
    assert_eq!(unacked[0].id, delivery.id);
    assert_eq!(unacked[0].state, QueueState::Dequeued);
    assert!(unacked[0].dequeued_at.is_some());
}

#[tokio::test]
async fn dedup_only_covers_pending_entries() {
    let work = test_db().await.work_queue(POLL);

    work.put("again").await.unwrap();
    let _in_flight = work.get().await.unwrap();

    assert!(work.put("again").await.unwrap());
    assert_eq!(work.pending().await.unwrap().len(), 1);
    assert_eq!(work.unacknowledged().await.unwrap().len(), 1);
}

#[tokio::test]
async fn done_removes_the_entry_once() {
    let work = test_db().await.work_queue(POLL);

    work.put("target").await.unwrap();
    let delivery = work.get().await.unwrap();
    work.done(&delivery).await.unwrap();

    assert!(work.pending().await.unwrap().is_empty());
    assert!(work.unacknowledged().await.unwrap().is_empty());
    assert!(matches!(work.done(&delivery).await, Err(Error::Other(_))));
}

#[tokio::test]
async fn requeue_restores_unacknowledged_entries_in_place() {
    let work = test_db().await.work_queue(POLL);

    work.put("a").await.unwrap();
    work.put("b").await.unwrap();
    let interrupted = work.get().await.unwrap();
    assert_eq!(interrupted.payload, "a");

    let lease = work.acquire_lease(LEASE_TTL).await.unwrap();
    assert_eq!(work.requeue_unacknowledged(&lease).await.unwrap(), 1);
    assert!(work.unacknowledged().await.unwrap().is_empty());

    let redelivered = work.get().await.unwrap();
    assert_eq!(redelivered.payload, "a");
    assert_eq!(redelivered.id, interrupted.id);
}

#[tokio::test]
async fn requeue_drops_entry_already_pending_again() {
    let work = test_db().await.work_queue(POLL);

    work.put("dup").await.unwrap();
    let _interrupted = work.get().await.unwrap();
    work.put("dup").await.unwrap();

    let lease = work.acquire_lease(LEASE_TTL).await.unwrap();
    assert_eq!(work.requeue_unacknowledged(&lease).await.unwrap(), 0);
    let pending = work.pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert!(work.unacknowledged().await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Consumer lease
// ---------------------------------------------------------------------------

#[tokio::test]
async fn live_lease_blocks_a_second_consumer_on_the_same_file() {
    let dir = scratch_dir("lease");
    let path = dir.join("data.db");
    let first = Db::open(&path).await.unwrap();
    first.migrate().await.unwrap();
    let second = Db::open(&path).await.unwrap();

    let a = first.work_queue(POLL);
    let b = second.work_queue(POLL);
    a.put("http://example.com/unsub").await.unwrap();
    let in_flight = a.get().await.unwrap();
    let lease = a.acquire_lease(LEASE_TTL).await.unwrap();

    let refused = b.acquire_lease(LEASE_TTL).await;
    assert!(
        matches!(refused, Err(Error::ConsumerBusy { pid }) if pid == i64::from(std::process::id()))
    );

    // The in-flight entry stays with its first consumer.
    assert!(b.try_get().await.unwrap().is_none());
    a.done(&in_flight).await.unwrap();

    lease.release().await.unwrap();
    let taken_over = b.acquire_lease(LEASE_TTL).await.unwrap();
    assert_eq!(b.requeue_unacknowledged(&taken_over).await.unwrap(), 0);

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn stale_lease_is_taken_over_and_old_holder_loses_it() {
    let work = test_db().await.work_queue(POLL);
    let ttl = Duration::from_millis(50);

    let stale = work.acquire_lease(ttl).await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;

    let fresh = work.acquire_lease(ttl).await.unwrap();
    assert!(matches!(stale.heartbeat().await, Err(Error::LeaseLost)));
    assert!(matches!(
        work.requeue_unacknowledged(&stale).await,
        Err(Error::LeaseLost)
    ));
    fresh.heartbeat().await.unwrap();

    // Releasing a lost lease must not free the new holder's lease.
    stale.release().await.unwrap();
    assert!(matches!(
        work.acquire_lease(ttl).await,
        Err(Error::ConsumerBusy { .. })
    ));
}

#[tokio::test]
async fn heartbeat_keeps_the_lease_past_its_ttl() {
    let work = test_db().await.work_queue(POLL);
    let ttl = Duration::from_millis(60);
    let lease = work.acquire_lease(ttl).await.unwrap();

    for _ in 0..5 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        lease.heartbeat().await.unwrap();
    }
    assert!(matches!(
        work.acquire_lease(ttl).await,
        Err(Error::ConsumerBusy { .. })
    ));
}

// ---------------------------------------------------------------------------
// Status queue
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_messages_are_fifo_and_read_once() {
    let status = test_db().await.status_queue(POLL);

    status.put("u1 done").await.unwrap();
    status.put("u2 done").await.unwrap();
    status.put("u1 done").await.unwrap();
    assert_eq!(status.count().await.unwrap(), 3);

    assert_eq!(status.get().await.unwrap(), "u1 done");
    assert_eq!(status.get().await.unwrap(), "u2 done");
    assert_eq!(status.get().await.unwrap(), "u1 done");
    assert!(status.try_get().await.unwrap().is_none());
    assert_eq!(status.count().await.unwrap(), 0);
}

#[tokio::test]
async fn status_get_blocks_until_a_message_exists() {
    let status = test_db().await.status_queue(POLL);

    let reader = {
        let status = status.clone();
        tokio::spawn(async move { status.get().await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!reader.is_finished());

    status.put("x done").await.unwrap();
    let message = tokio::time::timeout(Duration::from_secs(5), reader)
        .await
        .expect("status get did not wake up")
        .unwrap()
        .unwrap();
    assert_eq!(message, "x done");
}

// ---------------------------------------------------------------------------
// File-backed store
// ---------------------------------------------------------------------------

#[tokio::test]
async fn entries_survive_reopening_the_store() {
    let dir = scratch_dir("reopen");
    let path = dir.join("data.db");

    {
        let db = Db::open(&path).await.unwrap();
        db.migrate().await.unwrap();
        db.work_queue(POLL).put("durable").await.unwrap();
        db.status_queue(POLL).put("earlier done").await.unwrap();
    }

    let db = Db::open(&path).await.unwrap();
    db.migrate().await.unwrap();
    assert_eq!(db.work_queue(POLL).get().await.unwrap().payload, "durable");
    assert_eq!(db.status_queue(POLL).get().await.unwrap(), "earlier done");

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn independent_handles_never_claim_the_same_entry() {
    let dir = scratch_dir("shared");
    let path = dir.join("data.db");

    let first = Db::open(&path).await.unwrap();
    first.migrate().await.unwrap();
    let second = Db::open(&path).await.unwrap();

    let producer = first.work_queue(POLL);
    for i in 0..40 {
        producer.put(&format!("http://example.com/unsub/{i}")).await.unwrap();
    }

    let drain = |db: Db| {
        tokio::spawn(async move {
            let work = db.work_queue(POLL);
            let mut seen = Vec::new();
            while let Some(delivery) = work.try_get().await.unwrap() {
                seen.push(delivery.id);
            }
            seen
        })
    };
    let a = drain(first.clone());
    let b = drain(second.clone());
    let (a, b) = (a.await.unwrap(), b.await.unwrap());

    let all: HashSet<i64> = a.iter().chain(b.iter()).copied().collect();
    assert_eq!(a.len() + b.len(), 40);
    assert_eq!(all.len(), 40, "an entry was claimed twice");

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn open_fails_when_store_is_unreachable() {
    let dir = scratch_dir("unreachable");
    std::fs::create_dir_all(&dir).unwrap();
    let blocker = dir.join("not-a-dir");
    std::fs::write(&blocker, b"file").unwrap();

    let result = Db::open(&blocker.join("data.db")).await;
    assert!(matches!(result, Err(Error::Store(_))));

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn corrupt_database_file_is_a_store_error() {
    let dir = scratch_dir("corrupt");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("data.db");
    std::fs::write(&path, "this is not a database ".repeat(200)).unwrap();

    let result = match Db::open(&path).await {
        Ok(db) => db.migrate().await,
        Err(e) => Err(e),
    };
    assert!(matches!(result, Err(Error::Store(_))));

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn corrupt_payload_is_a_store_error() {
    let dir = scratch_dir("payload");
    let path = dir.join("data.db");
    let db = Db::open(&path).await.unwrap();
    db.migrate().await.unwrap();

    let raw = sqlx::SqlitePool::connect(&format!("sqlite://{}", path.display()))
        .await
        .unwrap();
    sqlx::query("INSERT INTO queue_work (payload, state, enqueued_at) VALUES ('not json', 'pending', $1)")
        .bind(chrono::Utc::now())
        .execute(&raw)
        .await
        .unwrap();
    raw.close().await;

    let result = db.work_queue(POLL).try_get().await;
    assert!(matches!(result, Err(Error::Store(_))));

    let _ = std::fs::remove_dir_all(dir);
}
