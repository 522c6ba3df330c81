use tokio::sync::watch;

use crate::identity::{AuthState, ProviderSession, UserIdentity};

/// Injectable container for the published (user, session, loading) triple.
/// Every mutation goes through one of the publish methods here, so operations
/// stay independently testable and observers see every committed state.
pub struct StateCell {
    tx: watch::Sender<AuthState>,
}

impl StateCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AuthState::anonymous());
        Self { tx }
    }

    pub fn snapshot(&self) -> AuthState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.tx.subscribe()
    }

    pub fn set_loading(&self, loading: bool) {
        self.tx.send_modify(|s| s.loading = loading);
    }

    pub fn publish(&self, user: Option<UserIdentity>, session: Option<ProviderSession>, loading: bool) {
        self.tx.send_replace(AuthState { user, session, loading });
    }

    /// Replace the user, keep the session, clear loading.
    pub fn publish_user(&self, user: Option<UserIdentity>) {
        self.tx.send_modify(|s| {
            s.user = user;
            s.loading = false;
        });
    }

    pub fn clear(&self) {
        self.tx.send_replace(AuthState::anonymous());
    }
}

impl Default for StateCell {
    fn default() -> Self { Self::new() }
}
