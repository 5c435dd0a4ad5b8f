//! Exercise history collection as seen by the UI.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::cache::{DrainOutcome, LocalFirstCache, QueueEntry, RefreshOutcome};
use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::models::ExerciseHistoryRecord;
use crate::remote::RemoteStore;
use crate::storage::KeyValueStore;

/// Local-first cache of one user's logged exercise history.
pub struct HistoryCache<R, S>
where
    R: RemoteStore,
    S: KeyValueStore,
{
    cache: LocalFirstCache<ExerciseHistoryRecord, R, S>,
}

impl<R, S> HistoryCache<R, S>
where
    R: RemoteStore,
    S: KeyValueStore,
{
    pub fn new(
        uid: &str,
        config: CacheConfig,
        storage: Arc<S>,
        remote: Arc<R>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache: LocalFirstCache::new(uid, config, storage, remote, clock),
        }
    }

    pub fn retrieve_on_load(&self) {
        self.cache.retrieve_on_load();
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<ExerciseHistoryRecord>> {
        self.cache.subscribe()
    }

    pub fn records(&self) -> Vec<ExerciseHistoryRecord> {
        self.cache.records()
    }

    /// Log a played exercise. The record is stamped with the cache's user.
    pub fn add_record(&self, mut record: ExerciseHistoryRecord) {
        record.uid = self.cache.uid().to_string();
        debug!(doc_id = %record.doc_id, exercise_id = %record.exercise_id, "Adding history record");
        self.cache.insert(record);
    }

    pub fn record(&self, doc_id: &str) -> Option<ExerciseHistoryRecord> {
        self.cache.records().into_iter().find(|r| r.doc_id == doc_id)
    }

    pub fn delete_record(&self, record: &ExerciseHistoryRecord) {
        self.cache.remove(&record.doc_id);
    }

    /// Every record for `exercise_id`, newest first.
    pub fn history_for_exercise(&self, exercise_id: &str) -> Vec<ExerciseHistoryRecord> {
        let mut records: Vec<_> = self
            .cache
            .records()
            .into_iter()
            .filter(|r| r.exercise_id == exercise_id)
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records
    }

    pub fn latest_for_exercise(&self, exercise_id: &str) -> Option<ExerciseHistoryRecord> {
        self.cache
            .records()
            .into_iter()
            .filter(|r| r.exercise_id == exercise_id)
            .max_by_key(|r| r.timestamp)
    }

    pub fn pending(&self) -> Vec<QueueEntry<ExerciseHistoryRecord>> {
        self.cache.pending()
    }

    pub async fn sync_queue(&self) -> DrainOutcome {
        self.cache.sync_queue().await
    }

    pub async fn refresh_from_remote(&self) -> RefreshOutcome {
        self.cache.refresh_from_remote().await
    }

    pub fn set_online(&self, online: bool) {
        self.cache.set_online(online);
    }

    pub fn shutdown(&self) {
        self.cache.shutdown();
    }
}
