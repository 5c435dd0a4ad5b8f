use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::remote::{Document, RemoteStore};
use crate::storage::KeyValueStore;

use super::debounce::Debouncer;
use super::queue::{PendingQueue, QueueEntry};
use super::refresh::{RefreshOutcome, RefreshTrigger};
use super::snapshot::SnapshotStore;
use super::sync::{DrainOutcome, SyncEngine};
use super::CachedRecord;

struct Inner<T, R, S> {
    uid: String,
    config: CacheConfig,
    snapshot: Arc<SnapshotStore<T, S>>,
    queue: Arc<PendingQueue<T, S>>,
    engine: SyncEngine<T, R, S>,
    refresh: RefreshTrigger<T, R, S>,
    debouncer: Debouncer,
    online: AtomicBool,
}

impl<T, R, S> Inner<T, R, S>
where
    T: CachedRecord,
    R: RemoteStore,
    S: KeyValueStore,
{
    fn schedule_sync(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        let armed = self.debouncer.schedule(move || async move {
            let _ = inner.sync_queue().await;
        });
        if armed {
            debug!(queue = %self.queue.key(), "Sync scheduled");
        }
    }

    async fn sync_queue(self: &Arc<Self>) -> DrainOutcome {
        let outcome = self.engine.drain().await;
        if outcome.is_completed() && self.refresh.take_if_ready() {
            self.spawn_refresh();
        }
        outcome
    }

    fn spawn_refresh(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        let delay = self.config.refresh_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = inner.refresh.refresh_from_remote().await;
        });
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }
}

/// Periodic drain while entries are pending. Holds only a weak reference so
/// the timer never keeps a dropped cache alive.
fn spawn_periodic_sync<T, R, S>(inner: &Arc<Inner<T, R, S>>) -> JoinHandle<()>
where
    T: CachedRecord,
    R: RemoteStore,
    S: KeyValueStore,
{
    let weak: Weak<Inner<T, R, S>> = Arc::downgrade(inner);
    let period = inner.config.sync_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(inner) = weak.upgrade() else {
                break;
            };
            if inner.is_online() && !inner.queue.is_empty() {
                debug!(queue = %inner.queue.key(), "Periodic sync");
                let _ = inner.sync_queue().await;
            }
        }
    })
}

/// Local-first cache for one entity collection of one user.
///
/// Reads and writes hit the local snapshot synchronously; mutations are
/// queued and replayed to the remote store in the background. Must be created
/// inside a Tokio runtime: construction starts the periodic sync timer, which
/// is cancelled by `shutdown` or on drop.
pub struct LocalFirstCache<T, R, S>
where
    T: CachedRecord,
    R: RemoteStore,
    S: KeyValueStore,
{
    inner: Arc<Inner<T, R, S>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl<T, R, S> LocalFirstCache<T, R, S>
where
    T: CachedRecord,
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
        let snapshot = Arc::new(SnapshotStore::new(uid, config.ttl, storage.clone(), clock.clone()));
        let queue = Arc::new(PendingQueue::new(uid, storage));
        let engine = SyncEngine::new(remote.clone(), queue.clone(), snapshot.clone(), config.retry);
        let refresh = RefreshTrigger::new(uid, remote, queue.clone(), snapshot.clone(), clock);
        let inner = Arc::new(Inner {
            uid: uid.to_string(),
            debouncer: Debouncer::new(config.debounce),
            config,
            snapshot,
            queue,
            engine,
            refresh,
            online: AtomicBool::new(true),
        });
        let timer = spawn_periodic_sync(&inner);

        Self {
            inner,
            timer: Mutex::new(Some(timer)),
        }
    }

    pub fn uid(&self) -> &str {
        &self.inner.uid
    }

    /// Receiver of every snapshot pushed to the UI.
    pub fn subscribe(&self) -> watch::Receiver<Vec<T>> {
        self.inner.snapshot.subscribe()
    }

    /// The collection most recently pushed to the UI.
    pub fn records(&self) -> Vec<T> {
        self.inner.snapshot.latest()
    }

    /// The stored collection, empty once expired.
    pub fn read(&self) -> Vec<T> {
        self.inner.snapshot.read()
    }

    pub fn pending(&self) -> Vec<QueueEntry<T>> {
        self.inner.queue.peek_all()
    }

    pub fn pending_len(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn is_syncing(&self) -> bool {
        self.inner.engine.is_syncing()
    }

    /// Show the stored snapshot right away, then refresh from the remote
    /// store once every pending mutation has been replayed.
    pub fn retrieve_on_load(&self) {
        self.inner.snapshot.push_to_ui_from_store();
        self.inner.refresh.request();
        self.inner.schedule_sync();
    }

    pub fn insert(&self, record: T) {
        let entry = QueueEntry::Add {
            record: record.clone(),
        };
        self.inner.snapshot.modify(|records| records.push(record));
        self.enqueue(entry);
    }

    /// Apply `fields` to the record with `id` locally and queue the partial
    /// update. The update is queued even when the record is not in the local
    /// snapshot, since the remote store is authoritative.
    pub fn update(&self, id: &str, mut fields: Document) {
        fields.remove(T::id_field());
        self.inner.snapshot.modify(|records| {
            if let Some(record) = records.iter_mut().find(|r| r.record_id() == id) {
                match merge_fields(record, &fields) {
                    Ok(updated) => *record = updated,
                    Err(e) => warn!(id, error = %e, "Patch does not fit record, local copy unchanged"),
                }
            }
        });
        self.enqueue(QueueEntry::Update {
            id: id.to_string(),
            fields,
        });
    }

    pub fn remove(&self, id: &str) {
        self.inner.snapshot.modify(|records| records.retain(|r| r.record_id() != id));
        self.enqueue(QueueEntry::Delete { id: id.to_string() });
    }

    fn enqueue(&self, entry: QueueEntry<T>) {
        self.inner.queue.enqueue(entry);
        self.inner.schedule_sync();
    }

    /// Drain the pending queue now. Returns `AlreadyRunning` if a drain is in
    /// progress.
    pub async fn sync_queue(&self) -> DrainOutcome {
        self.inner.sync_queue().await
    }

    pub async fn refresh_from_remote(&self) -> RefreshOutcome {
        self.inner.refresh.refresh_from_remote().await
    }

    /// Report connectivity. Coming back online with pending mutations
    /// schedules a sync right away.
    pub fn set_online(&self, online: bool) {
        let was_online = self.inner.online.swap(online, Ordering::AcqRel);
        if online && !was_online {
            info!(queue = %self.inner.queue.key(), "Back online");
            if !self.inner.queue.is_empty() {
                self.inner.schedule_sync();
            }
        }
    }

    pub fn is_online(&self) -> bool {
        self.inner.is_online()
    }

    /// Stop the periodic sync timer.
    pub fn shutdown(&self) {
        if let Some(timer) = self.timer.lock().unwrap_or_else(|e| e.into_inner()).take() {
            timer.abort();
        }
    }
}

impl<T, R, S> Drop for LocalFirstCache<T, R, S>
where
    T: CachedRecord,
    R: RemoteStore,
    S: KeyValueStore,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Overlay `fields` onto the serialized form of `record`.
fn merge_fields<T: CachedRecord>(record: &T, fields: &Document) -> serde_json::Result<T> {
    let mut value = serde_json::to_value(record)?;
    if let Value::Object(map) = &mut value {
        for (key, field) in fields {
            map.insert(key.clone(), field.clone());
        }
    }
    serde_json::from_value(value)
}
