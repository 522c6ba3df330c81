use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::SnapshotSlot;
use crate::identity::UserIdentity;

pub const SNAPSHOT_VERSION: u32 = 1;

/// Persisted envelope around the cached user. Versioned so a format change
/// reads as a miss instead of a decode error on old installs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedSnapshot {
    pub version: u32,
    pub saved_at_ms: i64,
    pub user: UserIdentity,
}

impl CachedSnapshot {
    pub fn of(user: UserIdentity) -> Self {
        Self { version: SNAPSHOT_VERSION, saved_at_ms: Utc::now().timestamp_millis(), user }
    }

    pub fn encode(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Tolerant decode: parse failures and unknown versions yield None.
    pub fn decode(text: &str) -> Option<Self> {
        match serde_json::from_str::<CachedSnapshot>(text) {
            Ok(snap) if snap.version == SNAPSHOT_VERSION => Some(snap),
            Ok(snap) => {
                debug!(target: "agrilink", "discarding snapshot with version {}", snap.version);
                None
            }
            Err(e) => {
                debug!(target: "agrilink", "discarding undecodable snapshot: {}", e);
                None
            }
        }
    }
}

/// Read the snapshot from a slot. Any failure is a cache miss.
pub fn load<S: SnapshotSlot + ?Sized>(slot: &S, key: &str) -> Option<CachedSnapshot> {
    slot.get(key).and_then(|text| CachedSnapshot::decode(&text))
}

/// Write the snapshot. Called on every successful login and profile update.
pub fn store<S: SnapshotSlot + ?Sized>(slot: &S, key: &str, user: &UserIdentity) -> anyhow::Result<()> {
    let snap = CachedSnapshot::of(user.clone());
    slot.set(key, &snap.encode()?)
}

/// Drop the snapshot. Called on sign-out.
pub fn clear<S: SnapshotSlot + ?Sized>(slot: &S, key: &str) {
    slot.remove(key);
}
