use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::RwLock;

use crate::identity::{ProfileUpdate, UserIdentity};

/// The user-profile record API, an external collaborator distinct from the auth
/// service. Only the update operation is consumed by this core.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn update_user(&self, id: &str, update: &ProfileUpdate) -> Result<UserIdentity>;
}

/// In-memory profile records, keyed by user id.
#[derive(Default)]
pub struct MemoryProfileStore {
    records: RwLock<HashMap<String, UserIdentity>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self { Self::default() }

    /// Seed a record, as the platform's registration pipeline would.
    pub fn insert(&self, user: UserIdentity) {
        self.records.write().insert(user.id.clone(), user);
    }

    pub fn get(&self, id: &str) -> Option<UserIdentity> {
        self.records.read().get(id).cloned()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn update_user(&self, id: &str, update: &ProfileUpdate) -> Result<UserIdentity> {
        let mut w = self.records.write();
        let record = w.get_mut(id).ok_or_else(|| anyhow!("profile record not found: {}", id))?;
        update.merge_into(record);
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Role;

    #[tokio::test]
    async fn update_merges_into_record() {
        let store = MemoryProfileStore::new();
        store.insert(UserIdentity::new("u1", Role::Warehouse));
        let up = ProfileUpdate { name: Some("Depot A".into()), ..Default::default() };
        let out = store.update_user("u1", &up).await.unwrap();
        assert_eq!(out.name.as_deref(), Some("Depot A"));
        assert_eq!(store.get("u1").unwrap().name.as_deref(), Some("Depot A"));
    }

    #[tokio::test]
    async fn missing_record_is_an_error() {
        let store = MemoryProfileStore::new();
        let up = ProfileUpdate::default();
        assert!(store.update_user("ghost", &up).await.is_err());
    }
}
