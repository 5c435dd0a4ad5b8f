use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::storage::KeyValueStore;

use super::CachedRecord;

/// Persisted blob: the full collection plus an absolute expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<D> {
    pub data: D,
    /// Unix epoch milliseconds
    pub expiry: i64,
}

impl<D> CacheEntry<D> {
    pub fn is_fresh(&self, now_millis: i64) -> bool {
        now_millis < self.expiry
    }
}

/// Last known full collection for one (user, entity kind) pair.
///
/// Reads are synchronous and never fail. Every write is published to
/// subscribers, whether or not it could be persisted.
pub struct SnapshotStore<T, S> {
    key: String,
    ttl: Duration,
    storage: Arc<S>,
    clock: Arc<dyn Clock>,
    notifier: watch::Sender<Vec<T>>,
    write_lock: Mutex<()>,
}

impl<T: CachedRecord, S: KeyValueStore> SnapshotStore<T, S> {
    pub fn new(uid: &str, ttl: Duration, storage: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        let (notifier, _) = watch::channel(Vec::new());
        Self {
            key: format!("{}_{}", T::entity_kind(), uid),
            ttl,
            storage,
            clock,
            notifier,
            write_lock: Mutex::new(()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<T>> {
        self.notifier.subscribe()
    }

    /// The collection most recently published to subscribers.
    pub fn latest(&self) -> Vec<T> {
        self.notifier.borrow().clone()
    }

    /// Replace the stored collection and publish it.
    pub fn write(&self, data: Vec<T>) {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.persist_and_publish(data);
    }

    /// Stored collection if present and unexpired, else empty.
    pub fn read(&self) -> Vec<T> {
        match self.load_entry() {
            Some(entry) if entry.is_fresh(self.clock.now_millis()) => {
                debug!(key = %self.key, records = entry.data.len(), "Snapshot hit");
                entry.data
            }
            Some(_) => {
                debug!(key = %self.key, "Snapshot expired");
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    /// Publish whatever the store holds so the UI has something to render
    /// before any network activity completes.
    pub fn push_to_ui_from_store(&self) {
        self.notifier.send_replace(self.read());
    }

    /// Read-modify-write of the collection. No other write can interleave.
    pub fn modify(&self, f: impl FnOnce(&mut Vec<T>)) {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut data = self.read();
        f(&mut data);
        self.persist_and_publish(data);
    }

    /// Rename a record after the remote store assigned it a different id.
    /// The stored expiry is preserved.
    pub fn remap_id(&self, old_id: &str, new_id: &str) {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let rename = |records: &mut Vec<T>| {
            let mut changed = false;
            for record in records.iter_mut().filter(|r| r.record_id() == old_id) {
                record.set_record_id(new_id.to_string());
                changed = true;
            }
            changed
        };

        if let Some(mut entry) = self.load_entry() {
            if rename(&mut entry.data) {
                self.persist(&entry);
            }
        }
        self.notifier.send_if_modified(rename);
    }

    fn load_entry(&self) -> Option<CacheEntry<Vec<T>>> {
        let raw = match self.storage.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to read snapshot");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(key = %self.key, error = %e, "Discarding malformed snapshot");
                None
            }
        }
    }

    fn persist(&self, entry: &CacheEntry<Vec<T>>) {
        let result = serde_json::to_string(entry)
            .map_err(|e| e.to_string())
            .and_then(|raw| self.storage.set(&self.key, &raw).map_err(|e| e.to_string()));
        if let Err(e) = result {
            warn!(key = %self.key, error = %e, "Failed to persist snapshot");
        }
    }

    fn persist_and_publish(&self, data: Vec<T>) {
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        let expiry = self.clock.now_millis().saturating_add(ttl_ms);
        let entry = CacheEntry { data, expiry };
        self.persist(&entry);
        self.notifier.send_replace(entry.data);
    }
}
