use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::remote::Document;
use crate::storage::KeyValueStore;

use super::CachedRecord;

/// A mutation awaiting remote acknowledgment.
///
/// Entries are removed one at a time as the remote store confirms them. A
/// confirmed entry takes only its exact duplicates with it: a later update or
/// delete for the same record stays queued until it is replayed itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum QueueEntry<T> {
    Add { record: T },
    /// `fields` never contains the identifier field.
    Update { id: String, fields: Document },
    Delete { id: String },
}

impl<T: CachedRecord> QueueEntry<T> {
    /// Identifier of the record this entry targets.
    pub fn record_id(&self) -> &str {
        match self {
            QueueEntry::Add { record } => record.record_id(),
            QueueEntry::Update { id, .. } | QueueEntry::Delete { id } => id.as_str(),
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            QueueEntry::Add { .. } => "add",
            QueueEntry::Update { .. } => "update",
            QueueEntry::Delete { .. } => "delete",
        }
    }

    fn set_record_id(&mut self, new_id: &str) {
        match self {
            QueueEntry::Add { record } => record.set_record_id(new_id.to_string()),
            QueueEntry::Update { id, .. } | QueueEntry::Delete { id } => *id = new_id.to_string(),
        }
    }
}

/// Durable FIFO of mutations for one (user, entity kind) pair.
///
/// Only the sync engine removes entries, and only after the remote store
/// confirmed them.
pub struct PendingQueue<T, S> {
    key: String,
    storage: Arc<S>,
    lock: Mutex<()>,
    _record: PhantomData<fn() -> T>,
}

impl<T: CachedRecord, S: KeyValueStore> PendingQueue<T, S> {
    pub fn new(uid: &str, storage: Arc<S>) -> Self {
        Self {
            key: format!("{}_{}_pendingQueue", T::entity_kind(), uid),
            storage,
            lock: Mutex::new(()),
            _record: PhantomData,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn enqueue(&self, entry: QueueEntry<T>) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = self.load();
        debug!(key = %self.key, action = entry.action(), id = entry.record_id(), "Enqueued mutation");
        entries.push(entry);
        self.persist(&entries);
    }

    pub fn peek_all(&self) -> Vec<QueueEntry<T>> {
        self.load()
    }

    pub fn len(&self) -> usize {
        self.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.load().is_empty()
    }

    /// Atomically overwrite the persisted queue.
    pub fn replace(&self, entries: &[QueueEntry<T>]) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.persist(entries);
    }

    /// Drop a confirmed entry from a freshly re-read queue, together with
    /// later entries for the same record that are identical to it. Returns
    /// the remaining queue.
    pub fn remove_applied(&self, applied: &QueueEntry<T>) -> Vec<QueueEntry<T>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = self.load();
        let before = entries.len();
        entries.retain(|entry| entry != applied);
        if entries.len() != before {
            self.persist(&entries);
        }
        entries
    }

    /// Point queued entries at the id the remote store assigned.
    pub fn remap_id(&self, old_id: &str, new_id: &str) -> Vec<QueueEntry<T>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = self.load();
        let mut changed = false;
        for entry in entries.iter_mut().filter(|e| e.record_id() == old_id) {
            entry.set_record_id(new_id);
            changed = true;
        }
        if changed {
            self.persist(&entries);
        }
        entries
    }

    fn load(&self) -> Vec<QueueEntry<T>> {
        let raw = match self.storage.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to read pending queue");
                return Vec::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(key = %self.key, error = %e, "Discarding malformed pending queue");
            Vec::new()
        })
    }

    fn persist(&self, entries: &[QueueEntry<T>]) {
        let result = serde_json::to_string(entries)
            .map_err(|e| e.to_string())
            .and_then(|raw| self.storage.set(&self.key, &raw).map_err(|e| e.to_string()));
        if let Err(e) = result {
            warn!(key = %self.key, error = %e, "Failed to persist pending queue");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::test_support::Note;
    use serde_json::json;

    fn queue() -> (PendingQueue<Note, MemoryStore>, Arc<MemoryStore>) {
        let storage = Arc::new(MemoryStore::new());
        (PendingQueue::new("u1", storage.clone()), storage)
    }

    fn update(id: &str, body: &str) -> QueueEntry<Note> {
        QueueEntry::Update {
            id: id.to_string(),
            fields: json!({ "body": body }).as_object().cloned().unwrap(),
        }
    }

    #[test]
    fn test_persisted_layout() {
        let (queue, storage) = queue();
        queue.enqueue(QueueEntry::Add { record: Note::new("a") });
        queue.enqueue(QueueEntry::Delete { id: "b".to_string() });

        let raw: serde_json::Value =
            serde_json::from_str(&storage.get("notes_u1_pendingQueue").unwrap().unwrap()).unwrap();
        assert_eq!(raw[0]["action"], "add");
        assert_eq!(raw[0]["record"]["id"], "a");
        assert_eq!(raw[1], json!({"action": "delete", "id": "b"}));
    }

    #[test]
    fn test_fifo_order() {
        let (queue, _) = queue();
        queue.enqueue(QueueEntry::Add { record: Note::new("a") });
        queue.enqueue(update("a", "x"));
        queue.enqueue(QueueEntry::Delete { id: "a".to_string() });

        let actions: Vec<_> = queue.peek_all().iter().map(|e| e.action()).collect();
        assert_eq!(actions, vec!["add", "update", "delete"]);
    }

    #[test]
    fn test_remove_applied_keeps_later_distinct_mutations() {
        let (queue, _) = queue();
        queue.enqueue(update("a", "x"));
        queue.enqueue(QueueEntry::Add { record: Note::new("b") });
        queue.enqueue(update("a", "x"));
        queue.enqueue(update("a", "y"));

        let remaining = queue.remove_applied(&update("a", "x"));

        assert_eq!(remaining, vec![QueueEntry::Add { record: Note::new("b") }, update("a", "y")]);
        assert_eq!(queue.peek_all(), remaining);
    }

    #[test]
    fn test_remove_applied_rereads_storage() {
        let (queue, storage) = queue();
        queue.enqueue(QueueEntry::Add { record: Note::new("a") });
        let head = queue.peek_all().remove(0);

        // Another writer appends while the head is in flight.
        let other = PendingQueue::<Note, MemoryStore>::new("u1", storage);
        other.enqueue(QueueEntry::Delete { id: "c".to_string() });

        let remaining = queue.remove_applied(&head);
        assert_eq!(remaining, vec![QueueEntry::Delete { id: "c".to_string() }]);
    }

    #[test]
    fn test_remap_id() {
        let (queue, _) = queue();
        queue.enqueue(update("local", "x"));
        queue.enqueue(QueueEntry::Delete { id: "local".to_string() });
        queue.enqueue(QueueEntry::Delete { id: "other".to_string() });

        let remaining = queue.remap_id("local", "remote");
        let ids: Vec<_> = remaining.iter().map(|e| e.record_id().to_string()).collect();
        assert_eq!(ids, vec!["remote", "remote", "other"]);
    }

    #[test]
    fn test_malformed_queue_reads_empty() {
        let (queue, storage) = queue();
        storage.set("notes_u1_pendingQueue", "[{\"action\":\"explode\"}]").unwrap();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_replace() {
        let (queue, _) = queue();
        queue.enqueue(QueueEntry::Delete { id: "a".to_string() });
        queue.replace(&[]);
        assert_eq!(queue.len(), 0);
    }
}
