use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::remote::RemoteStore;
use crate::storage::KeyValueStore;

use super::queue::PendingQueue;
use super::snapshot::SnapshotStore;
use super::CachedRecord;

/// How a refresh from the remote store ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The snapshot was overwritten with `records` remote records.
    Refreshed { records: usize },
    /// The queue was non-empty; the refresh waits for the next completed drain.
    Deferred,
    /// The remote client answered "empty" from its offline cache.
    SkippedOfflineEmpty,
    Failed(String),
}

/// Keeps the snapshot eventually consistent with the remote store.
///
/// A refresh never overwrites the snapshot while mutations are pending, so
/// unsynced optimistic state is not replaced by older remote data.
pub struct RefreshTrigger<T, R, S> {
    uid: String,
    remote: Arc<R>,
    queue: Arc<PendingQueue<T, S>>,
    snapshot: Arc<SnapshotStore<T, S>>,
    clock: Arc<dyn Clock>,
    requested: AtomicBool,
}

impl<T, R, S> RefreshTrigger<T, R, S>
where
    T: CachedRecord,
    R: RemoteStore,
    S: KeyValueStore,
{
    pub fn new(
        uid: &str,
        remote: Arc<R>,
        queue: Arc<PendingQueue<T, S>>,
        snapshot: Arc<SnapshotStore<T, S>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            uid: uid.to_string(),
            remote,
            queue,
            snapshot,
            clock,
            requested: AtomicBool::new(false),
        }
    }

    /// Ask for a refresh once the pending queue is empty.
    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Consume a pending request if the queue is empty now.
    pub fn take_if_ready(&self) -> bool {
        if !self.is_requested() || !self.queue.is_empty() {
            return false;
        }
        self.requested.swap(false, Ordering::AcqRel)
    }

    pub async fn refresh_from_remote(&self) -> RefreshOutcome {
        if !self.queue.is_empty() {
            debug!(collection = T::collection(), "Mutations pending, deferring refresh");
            self.request();
            return RefreshOutcome::Deferred;
        }

        debug!(collection = T::collection(), uid = %self.uid, "Fetching from remote store");
        let snapshot = match self.remote.query_by_user_id(T::collection(), &self.uid).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(collection = T::collection(), error = %e, "Failed to fetch from remote store");
                return RefreshOutcome::Failed(e.to_string());
            }
        };

        if snapshot.from_cache && snapshot.documents.is_empty() {
            warn!(collection = T::collection(), "Offline or no data in client cache, keeping snapshot");
            return RefreshOutcome::SkippedOfflineEmpty;
        }

        let now = self.clock.now();
        let mut records: Vec<T> = snapshot
            .documents
            .into_iter()
            .filter_map(|doc| {
                let id = doc.id.clone();
                match T::from_remote(doc, now) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!(collection = T::collection(), id = %id, error = %e, "Skipping malformed document");
                        None
                    }
                }
            })
            .collect();
        T::sort_snapshot(&mut records);

        // A mutation may have landed while the query was in flight.
        if !self.queue.is_empty() {
            debug!(collection = T::collection(), "Queue changed during fetch, discarding result");
            self.request();
            return RefreshOutcome::Deferred;
        }

        info!(collection = T::collection(), records = records.len(), "Fetched from remote store");
        let count = records.len();
        self.snapshot.write(records);
        RefreshOutcome::Refreshed { records: count }
    }
}
