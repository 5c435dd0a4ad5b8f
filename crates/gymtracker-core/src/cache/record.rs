//! Core trait for entities held by a local-first cache.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

use crate::remote::RemoteDocument;

/// Trait for entities that can be cached and replayed to the remote store.
///
/// The cache treats records as opaque apart from their identifier.
pub trait CachedRecord:
    Clone + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// Entity kind, the prefix of the persisted keys (e.g. "routines")
    fn entity_kind() -> &'static str;

    /// Remote collection the records live in
    fn collection() -> &'static str;

    /// Name of the identifier field in the serialized record
    fn id_field() -> &'static str;

    fn record_id(&self) -> &str;

    fn set_record_id(&mut self, id: String);

    /// Map a remote document into the local record shape, normalizing
    /// timestamps. `now` fills in missing timestamps.
    fn from_remote(doc: RemoteDocument, now: DateTime<Utc>) -> serde_json::Result<Self>;

    /// Order applied to a freshly fetched collection before it is stored.
    fn sort_snapshot(_records: &mut [Self]) {}
}
