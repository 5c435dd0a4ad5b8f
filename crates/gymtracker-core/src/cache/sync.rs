//! Replays the pending queue against the remote store.
//!
//! Entries are replayed oldest-first. Each entry gets a bounded number of
//! attempts with exponential backoff; when an entry exhausts its attempts the
//! whole drain stops so later mutations never overtake a stuck one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::remote::{Document, RemoteStore};
use crate::storage::KeyValueStore;

use super::queue::{PendingQueue, QueueEntry};
use super::snapshot::SnapshotStore;
use super::CachedRecord;

/// Attempts per queue entry before a drain gives up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Backoff before the second attempt; doubles after every further failure.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Wait after the `attempt`-th failure (1-based): `base * 2^(attempt-1)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }
}

/// How a call to `drain` ended.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum DrainOutcome {
    /// Another drain was in progress; nothing was done.
    AlreadyRunning,
    /// The queue is empty.
    Completed { applied: usize },
    /// An entry ran out of attempts; it and everything behind it are kept.
    Aborted {
        applied: usize,
        remaining: usize,
        error: String,
    },
}

impl DrainOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, DrainOutcome::Completed { .. })
    }
}

/// Releases the drain flag even if the drain future is dropped mid-flight.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SyncEngine<T, R, S> {
    remote: Arc<R>,
    queue: Arc<PendingQueue<T, S>>,
    snapshot: Arc<SnapshotStore<T, S>>,
    policy: RetryPolicy,
    syncing: AtomicBool,
}

impl<T, R, S> SyncEngine<T, R, S>
where
    T: CachedRecord,
    R: RemoteStore,
    S: KeyValueStore,
{
    pub fn new(
        remote: Arc<R>,
        queue: Arc<PendingQueue<T, S>>,
        snapshot: Arc<SnapshotStore<T, S>>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            remote,
            queue,
            snapshot,
            policy,
            syncing: AtomicBool::new(false),
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    fn try_begin(&self) -> Option<DrainGuard<'_>> {
        self.syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| DrainGuard(&self.syncing))
    }

    pub async fn drain(&self) -> DrainOutcome {
        let Some(_guard) = self.try_begin() else {
            debug!(queue = %self.queue.key(), "Drain already in progress");
            return DrainOutcome::AlreadyRunning;
        };

        let mut queue = self.queue.peek_all();
        if queue.is_empty() {
            return DrainOutcome::Completed { applied: 0 };
        }
        info!(queue = %self.queue.key(), pending = queue.len(), "Draining pending queue");

        let mut applied = 0;
        while let Some(head) = queue.first().cloned() {
            match self.apply_with_retry(&head).await {
                Ok(assigned_id) => {
                    applied += 1;
                    queue = self.queue.remove_applied(&head);
                    if let Some(new_id) = assigned_id.filter(|id| id != head.record_id()) {
                        debug!(old = head.record_id(), new = %new_id, "Remote store assigned a new id");
                        queue = self.queue.remap_id(head.record_id(), &new_id);
                        self.snapshot.remap_id(head.record_id(), &new_id);
                    }
                }
                Err(e) => {
                    warn!(
                        queue = %self.queue.key(),
                        action = head.action(),
                        id = head.record_id(),
                        error = %e,
                        "Giving up on drain, entry kept at head of queue"
                    );
                    return DrainOutcome::Aborted {
                        applied,
                        remaining: self.queue.len(),
                        error: e.to_string(),
                    };
                }
            }
        }

        info!(queue = %self.queue.key(), applied, "Pending queue drained");
        DrainOutcome::Completed { applied }
    }

    async fn apply_with_retry(&self, entry: &QueueEntry<T>) -> Result<Option<String>, SyncError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.apply_once(entry).await {
                Ok(assigned_id) => return Ok(assigned_id),
                Err(e) if !e.is_retryable() || attempt >= self.policy.max_attempts => return Err(e),
                Err(e) => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        action = entry.action(),
                        id = entry.record_id(),
                        attempt,
                        backoff_ms = delay.as_millis() as u64,
                        error = %e,
                        "Remote write failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// One remote call for `entry`. Returns the store-assigned id for adds.
    async fn apply_once(&self, entry: &QueueEntry<T>) -> Result<Option<String>, SyncError> {
        let collection = T::collection();
        match entry {
            QueueEntry::Add { record } => {
                debug!(collection, id = record.record_id(), "Creating remote document");
                let fields = to_document(record)?;
                let id = self.remote.create(collection, fields).await?;
                Ok(Some(id))
            }
            QueueEntry::Update { id, fields } => {
                let mut fields = fields.clone();
                fields.remove(T::id_field());
                self.remote.update(collection, id, fields).await?;
                Ok(None)
            }
            QueueEntry::Delete { id } => {
                self.remote.delete(collection, id).await?;
                Ok(None)
            }
        }
    }
}

fn to_document<T: CachedRecord>(record: &T) -> Result<Document, SyncError> {
    match serde_json::to_value(record)? {
        Value::Object(fields) => Ok(fields),
        other => Err(SyncError::Encode(serde::ser::Error::custom(format!(
            "record serialized to {} instead of an object",
            type_name(&other)
        )))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::storage::MemoryStore;
    use crate::test_support::{FakeRemote, Note, RemoteCall};
    use tokio::time::Instant;

    struct Harness {
        engine: Arc<SyncEngine<Note, FakeRemote, MemoryStore>>,
        queue: Arc<PendingQueue<Note, MemoryStore>>,
        snapshot: Arc<SnapshotStore<Note, MemoryStore>>,
        remote: Arc<FakeRemote>,
    }

    fn harness() -> Harness {
        let storage = Arc::new(MemoryStore::new());
        let remote = Arc::new(FakeRemote::new());
        let queue = Arc::new(PendingQueue::new("u1", storage.clone()));
        let snapshot = Arc::new(SnapshotStore::new(
            "u1",
            Duration::from_secs(600),
            storage,
            Arc::new(SystemClock),
        ));
        let engine = Arc::new(SyncEngine::new(
            remote.clone(),
            queue.clone(),
            snapshot.clone(),
            RetryPolicy::default(),
        ));
        Harness {
            engine,
            queue,
            snapshot,
            remote,
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(1000));
        assert_eq!(policy.backoff(2), Duration::from_millis(2000));
        assert_eq!(policy.backoff(3), Duration::from_millis(4000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_queue_completes() {
        let h = harness();
        assert_eq!(h.engine.drain().await, DrainOutcome::Completed { applied: 0 });
        assert!(h.remote.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_second_attempt() {
        let h = harness();
        h.queue.enqueue(QueueEntry::Add { record: Note::new("a") });
        h.remote.fail_creates_for("a", 1);

        let started = Instant::now();
        let outcome = h.engine.drain().await;

        assert_eq!(outcome, DrainOutcome::Completed { applied: 1 });
        assert!(h.queue.is_empty());
        assert_eq!(h.remote.create_calls_for("a"), 2);
        assert!(started.elapsed() >= DEFAULT_BASE_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_head_of_line_blocking() {
        let h = harness();
        h.queue.enqueue(QueueEntry::Add { record: Note::new("a") });
        h.queue.enqueue(QueueEntry::Add { record: Note::new("b") });
        h.remote.fail_creates_for("a", u32::MAX);

        let outcome = h.engine.drain().await;

        assert!(matches!(outcome, DrainOutcome::Aborted { applied: 0, remaining: 2, .. }));
        assert_eq!(h.queue.len(), 2);
        assert_eq!(h.remote.create_calls_for("a"), DEFAULT_MAX_ATTEMPTS as usize);
        assert_eq!(h.remote.create_calls_for("b"), 0);
        assert!(!h.engine.is_syncing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_counts_entries_enqueued_during_retries() {
        let h = harness();
        h.queue.enqueue(QueueEntry::Add { record: Note::new("a") });
        h.remote.fail_creates_for("a", u32::MAX);

        let drain = tokio::spawn({
            let engine = h.engine.clone();
            async move { engine.drain().await }
        });
        tokio::task::yield_now().await;
        h.queue.enqueue(QueueEntry::Add { record: Note::new("b") });

        let outcome = drain.await.unwrap();
        assert!(matches!(outcome, DrainOutcome::Aborted { applied: 0, remaining: 2, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_drain_is_noop_while_first_in_flight() {
        let h = harness();
        h.queue.enqueue(QueueEntry::Add { record: Note::new("a") });
        let gate = h.remote.hold_calls();

        let first = tokio::spawn({
            let engine = h.engine.clone();
            async move { engine.drain().await }
        });
        tokio::task::yield_now().await;
        assert!(h.engine.is_syncing());

        assert_eq!(h.engine.drain().await, DrainOutcome::AlreadyRunning);

        gate.notify_one();
        assert_eq!(first.await.unwrap(), DrainOutcome::Completed { applied: 1 });
        assert_eq!(h.remote.create_calls_for("a"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_strips_id_and_delete_replays_in_order() {
        let h = harness();
        let mut fields = Document::new();
        fields.insert("id".to_string(), Value::from("a"));
        fields.insert("body".to_string(), Value::from("edited"));
        h.queue.enqueue(QueueEntry::Update { id: "a".to_string(), fields });
        h.queue.enqueue(QueueEntry::Delete { id: "a".to_string() });

        assert_eq!(h.engine.drain().await, DrainOutcome::Completed { applied: 2 });

        let calls = h.remote.calls();
        assert_eq!(calls.len(), 2);
        match &calls[0] {
            RemoteCall::Update { id, fields } => {
                assert_eq!(id, "a");
                assert!(!fields.contains_key("id"));
                assert_eq!(fields["body"], "edited");
            }
            other => panic!("expected update, got {other:?}"),
        }
        assert_eq!(calls[1], RemoteCall::Delete { id: "a".to_string() });
    }

    #[tokio::test(start_paused = true)]
    async fn test_assigned_id_is_remapped() {
        let h = harness();
        h.snapshot.write(vec![Note::new("local")]);
        h.queue.enqueue(QueueEntry::Add { record: Note::new("local") });
        h.queue.enqueue(QueueEntry::Delete { id: "local".to_string() });
        h.remote.assign_id("local", "server-1");

        assert_eq!(h.engine.drain().await, DrainOutcome::Completed { applied: 2 });

        assert_eq!(h.snapshot.read()[0].id, "server-1");
        assert_eq!(
            h.remote.calls().last(),
            Some(&RemoteCall::Delete { id: "server-1".to_string() })
        );
    }
}
