//! Unified error model for the session core.
//! Four classes cover every failure the reconciler can see: remote-unreachable
//! (non-fatal, triggers cache fallback), invalid-credential (fatal to the attempt),
//! no-current-user (profile operations without a session), and internal (local
//! serialization/slot faults). Soft errors (a usable payload riding alongside a
//! provider warning) are not modeled here; they reconcile as success and the
//! warning is logged at the call site.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthError {
    #[error("remote_unreachable: {message}")]
    RemoteUnreachable { message: String },
    #[error("invalid_credential: {message}")]
    InvalidCredential { message: String },
    #[error("no_current_user: {message}")]
    NoCurrentUser { message: String },
    #[error("internal: {message}")]
    Internal { message: String },
}

impl AuthError {
    pub fn unreachable<S: Into<String>>(msg: S) -> Self { AuthError::RemoteUnreachable { message: msg.into() } }
    pub fn credential<S: Into<String>>(msg: S) -> Self { AuthError::InvalidCredential { message: msg.into() } }
    pub fn no_user() -> Self { AuthError::NoCurrentUser { message: "no authenticated user".into() } }
    pub fn internal<S: Into<String>>(msg: S) -> Self { AuthError::Internal { message: msg.into() } }

    pub fn code_str(&self) -> &'static str {
        match self {
            AuthError::RemoteUnreachable { .. } => "remote_unreachable",
            AuthError::InvalidCredential { .. } => "invalid_credential",
            AuthError::NoCurrentUser { .. } => "no_current_user",
            AuthError::Internal { .. } => "internal",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AuthError::RemoteUnreachable { message }
            | AuthError::InvalidCredential { message }
            | AuthError::NoCurrentUser { message }
            | AuthError::Internal { message } => message.as_str(),
        }
    }

    /// Unreachable faults may be retried or satisfied from cache; the rest are terminal
    /// for the attempt that raised them.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::RemoteUnreachable { .. })
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        AuthError::Internal { message: err.to_string() }
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        AuthError::Internal { message: err.to_string() }
    }
}
