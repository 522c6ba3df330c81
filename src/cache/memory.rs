use std::collections::HashMap;

use parking_lot::RwLock;

use super::SnapshotSlot;

/// In-memory slot for tests and embedded callers.
#[derive(Default)]
pub struct MemorySlot {
    map: RwLock<HashMap<String, String>>,
}

impl MemorySlot {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.map.read().len() }
    pub fn is_empty(&self) -> bool { self.map.read().is_empty() }
}

impl SnapshotSlot for MemorySlot {
    fn get(&self, key: &str) -> Option<String> {
        self.map.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.map.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) {
        self.map.write().remove(key);
    }
}
