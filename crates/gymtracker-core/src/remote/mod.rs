//! Remote document store port.
//!
//! The remote store is authoritative. Documents are JSON objects keyed by a
//! store-assigned id and grouped into named collections; every document
//! carries the owning user's `uid` so collections can be queried per user.

pub mod http;

pub use http::HttpRemoteStore;

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::RemoteError;

/// A JSON object of document fields.
pub type Document = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDocument {
    pub id: String,
    #[serde(default)]
    pub fields: Document,
}

/// Result of a per-user collection query.
#[derive(Debug, Clone, Default)]
pub struct QuerySnapshot {
    pub documents: Vec<RemoteDocument>,
    /// Set when the client answered from its own offline cache rather than
    /// the server.
    pub from_cache: bool,
}

impl QuerySnapshot {
    pub fn from_server(documents: Vec<RemoteDocument>) -> Self {
        Self {
            documents,
            from_cache: false,
        }
    }
}

pub trait RemoteStore: Send + Sync + 'static {
    fn query_by_user_id(
        &self,
        collection: &str,
        uid: &str,
    ) -> impl Future<Output = Result<QuerySnapshot, RemoteError>> + Send;

    /// Creates a document and returns the id the store assigned to it.
    fn create(
        &self,
        collection: &str,
        fields: Document,
    ) -> impl Future<Output = Result<String, RemoteError>> + Send;

    fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Document,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    fn delete(
        &self,
        collection: &str,
        id: &str,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;
}
