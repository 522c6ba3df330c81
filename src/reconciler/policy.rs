use crate::cache::CachedSnapshot;
use crate::identity::UserIdentity;
use crate::remote::RemoteError;

/// Where the published user came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Remote,
    Cache,
    Anonymous,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub user: Option<UserIdentity>,
    pub source: Source,
}

/// Explicit precedence between the competing sources of truth, isolated from
/// network timing so it can be tested as a pure function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PrecedencePolicy {
    /// Remote supersedes the cache unconditionally whenever it is reachable,
    /// including a reachable "no user" answer. The cache is consulted only when
    /// the remote read fails.
    #[default]
    RemoteElseCache,
}

impl PrecedencePolicy {
    pub fn resolve(
        &self,
        remote: Result<Option<UserIdentity>, RemoteError>,
        cached: Option<CachedSnapshot>,
    ) -> Resolution {
        let PrecedencePolicy::RemoteElseCache = self;
        match remote {
            Ok(Some(user)) => Resolution { user: Some(user), source: Source::Remote },
            Ok(None) => Resolution { user: None, source: Source::Anonymous },
            Err(_) => match cached {
                Some(snap) => Resolution { user: Some(snap.user), source: Source::Cache },
                None => Resolution { user: None, source: Source::Anonymous },
            },
        }
    }
}
