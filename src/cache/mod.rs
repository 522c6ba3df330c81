//! Cached user snapshot: a best-effort, denormalized copy of the last known
//! authenticated user kept in a persistent key-value slot. Never a source of
//! truth; read at bootstrap and on remote failure, deleted on sign-out.

mod file;
mod memory;
mod snapshot;

pub use file::FileSlot;
pub use memory::MemorySlot;
pub use snapshot::{clear, load, store, CachedSnapshot, SNAPSHOT_VERSION};

/// Persistent string key-value slot backing the snapshot. Implementations are
/// local and synchronous; failures on read degrade to a miss, never an error.
pub trait SnapshotSlot: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&self, key: &str);
}
