//! Local-first caching for offline data access.
//!
//! Each cached collection is held as a time-stamped snapshot in local
//! storage, so the UI can render without a network round trip. Mutations are
//! applied to the snapshot optimistically and appended to a persisted pending
//! queue that is replayed to the remote store in order, with retries.
//!
//! Components:
//! - `SnapshotStore`: TTL-bounded snapshot plus UI notification
//! - `PendingQueue`: durable FIFO of unsynced mutations
//! - `SyncEngine`: single-flight drain with exponential backoff
//! - `RefreshTrigger`: pulls remote state once the queue is empty
//! - `LocalFirstCache`: wires the above together for one collection

mod debounce;
pub mod local_first;
pub mod queue;
pub mod record;
pub mod refresh;
pub mod snapshot;
pub mod sync;

pub use debounce::Debouncer;
pub use local_first::LocalFirstCache;
pub use queue::{PendingQueue, QueueEntry};
pub use record::CachedRecord;
pub use refresh::{RefreshOutcome, RefreshTrigger};
pub use snapshot::{CacheEntry, SnapshotStore};
pub use sync::{DrainOutcome, RetryPolicy, SyncEngine};
