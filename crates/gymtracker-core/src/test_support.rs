//! Shared fixtures for unit tests: a minimal record type and a scriptable
//! in-memory remote store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Notify;

use crate::cache::CachedRecord;
use crate::error::RemoteError;
use crate::remote::{Document, QuerySnapshot, RemoteDocument, RemoteStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    #[serde(default)]
    pub body: String,
}

impl Note {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            body: String::new(),
        }
    }
}

impl CachedRecord for Note {
    fn entity_kind() -> &'static str {
        "notes"
    }

    fn collection() -> &'static str {
        "notes"
    }

    fn id_field() -> &'static str {
        "id"
    }

    fn record_id(&self) -> &str {
        &self.id
    }

    fn set_record_id(&mut self, id: String) {
        self.id = id;
    }

    fn from_remote(doc: RemoteDocument, _now: DateTime<Utc>) -> serde_json::Result<Self> {
        let mut fields = doc.fields;
        fields.insert("id".to_string(), Value::String(doc.id));
        serde_json::from_value(Value::Object(fields))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    Query { collection: String, uid: String },
    Create { collection: String, fields: Document },
    Update { id: String, fields: Document },
    Delete { id: String },
}

/// Remote store double. Every call is recorded before it succeeds or fails.
#[derive(Default)]
pub struct FakeRemote {
    calls: Mutex<Vec<RemoteCall>>,
    offline: AtomicBool,
    create_failures: Mutex<HashMap<String, u32>>,
    assigned_ids: Mutex<HashMap<String, String>>,
    documents: Mutex<QuerySnapshot>,
    gate: Mutex<Option<Arc<Notify>>>,
    queries: AtomicUsize,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn create_calls_for(&self, id: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| {
                matches!(call, RemoteCall::Create { fields, .. } if fields.get("id").and_then(Value::as_str) == Some(id))
            })
            .count()
    }

    /// Every call fails with `RemoteError::Offline` while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// The next `times` creates of the record with `id` fail.
    pub fn fail_creates_for(&self, id: &str, times: u32) {
        self.create_failures.lock().unwrap().insert(id.to_string(), times);
    }

    /// Creating the record with `local_id` returns `remote_id`.
    pub fn assign_id(&self, local_id: &str, remote_id: &str) {
        self.assigned_ids
            .lock()
            .unwrap()
            .insert(local_id.to_string(), remote_id.to_string());
    }

    pub fn set_documents(&self, documents: Vec<RemoteDocument>) {
        *self.documents.lock().unwrap() = QuerySnapshot::from_server(documents);
    }

    pub fn set_documents_from_cache(&self, documents: Vec<RemoteDocument>) {
        *self.documents.lock().unwrap() = QuerySnapshot {
            documents,
            from_cache: true,
        };
    }

    /// Calls that get past the offline check wait for a notification.
    pub fn hold_calls(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&notify));
        notify
    }

    async fn enter(&self, call: RemoteCall) -> Result<(), RemoteError> {
        self.calls.lock().unwrap().push(call);
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Offline);
        }
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(())
    }
}

impl RemoteStore for FakeRemote {
    async fn query_by_user_id(&self, collection: &str, uid: &str) -> Result<QuerySnapshot, RemoteError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.enter(RemoteCall::Query {
            collection: collection.to_string(),
            uid: uid.to_string(),
        })
        .await?;
        Ok(self.documents.lock().unwrap().clone())
    }

    async fn create(&self, collection: &str, fields: Document) -> Result<String, RemoteError> {
        let local_id = fields
            .get("id")
            .or_else(|| fields.get("docId"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.enter(RemoteCall::Create {
            collection: collection.to_string(),
            fields,
        })
        .await?;

        {
            let mut failures = self.create_failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&local_id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(RemoteError::ServerError("scripted failure".to_string()));
                }
            }
        }

        let assigned = self.assigned_ids.lock().unwrap().get(&local_id).cloned();
        Ok(assigned.unwrap_or(local_id))
    }

    async fn update(&self, _collection: &str, id: &str, fields: Document) -> Result<(), RemoteError> {
        self.enter(RemoteCall::Update {
            id: id.to_string(),
            fields,
        })
        .await
    }

    async fn delete(&self, _collection: &str, id: &str) -> Result<(), RemoteError> {
        self.enter(RemoteCall::Delete { id: id.to_string() }).await
    }
}
