use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::user::UserIdentity;

/// Session issued by the auth provider. Timestamps are epoch milliseconds so the
/// type can cross the serde boundary in auth events and envelopes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderSession {
    pub token: String,
    pub user_id: String,
    pub issued_at_ms: i64,
    pub expires_at_ms: i64,
}

impl ProviderSession {
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp_millis() >= self.expires_at_ms
    }

    pub fn remaining_secs(&self) -> i64 {
        ((self.expires_at_ms - Utc::now().timestamp_millis()) / 1000).max(0)
    }
}

/// The published triple. Created empty at startup, populated by a successful
/// login or a cache hit, cleared on logout.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthState {
    pub user: Option<UserIdentity>,
    pub session: Option<ProviderSession>,
    pub loading: bool,
}

impl AuthState {
    pub fn anonymous() -> Self {
        Self { user: None, session: None, loading: false }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Cached snapshot present but no provider session: remote writes are pointless
    /// and profile changes merge straight into the cache.
    pub fn is_cache_only(&self) -> bool {
        self.user.is_some() && self.session.is_none()
    }
}
