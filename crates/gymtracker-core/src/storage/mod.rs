//! Synchronous key-value persistence for snapshots and pending queues.
//!
//! Both operations are fallible (quota, missing directory, private mode);
//! callers in the cache layer degrade failures to a cache miss.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::StoreError;

pub trait KeyValueStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}
