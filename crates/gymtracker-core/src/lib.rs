//! GymTracker core - local-first caching of routines and exercise history.
//!
//! The UI reads from and writes to a local snapshot synchronously. Writes are
//! queued and replayed to the remote document store in the background, so the
//! app keeps working offline and converges once connectivity returns.
//!
//! The two collections are exposed through `RoutinesCache` and
//! `HistoryCache`, both thin wrappers around the generic `LocalFirstCache`.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod history;
pub mod models;
pub mod remote;
pub mod routines;
pub mod storage;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use cache::{CachedRecord, DrainOutcome, LocalFirstCache, QueueEntry, RefreshOutcome};
pub use clock::{Clock, SystemClock};
pub use config::{CacheConfig, Config};
pub use error::{RemoteError, StoreError, SyncError};
pub use history::HistoryCache;
pub use remote::{HttpRemoteStore, RemoteStore};
pub use routines::RoutinesCache;
pub use storage::{FileStore, KeyValueStore, MemoryStore};
