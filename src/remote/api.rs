use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::identity::{ProfileUpdate, ProviderSession, Role, UserIdentity};

/// Response envelope every remote operation returns. Both fields may be present
/// at once: a payload riding alongside an error is a soft error (degraded
/// backend), not a failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self { data: Some(data), error: None }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self { data: None, error: Some(msg.into()) }
    }

    pub fn degraded(data: T, warning: impl Into<String>) -> Self {
        Self { data: Some(data), error: Some(warning.into()) }
    }

    pub fn empty() -> Self {
        Self { data: None, error: None }
    }

    pub fn is_soft_error(&self) -> bool {
        self.data.is_some() && self.error.is_some()
    }
}

/// Transport-level failure: the service never produced an envelope.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("remote unreachable: {0}")]
    Unreachable(String),
    #[error("remote call timed out after {0}ms")]
    Timeout(u64),
}

pub type RemoteResult<T> = Result<ApiEnvelope<T>, RemoteError>;

/// Payload of a completed sign-in/sign-up exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInPayload {
    pub user: Option<UserIdentity>,
    pub session: Option<ProviderSession>,
}

/// Attributes accepted at account creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewUserAttrs {
    pub role: Option<Role>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
}

/// Step selector for the staged phone exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhoneAction {
    SendOtp,
    VerifyOtp,
    /// First-time phone users finish registration by setting a password after a
    /// verified OTP.
    SetPassword,
}

/// Step selector for the Aadhaar exchange. Aadhaar accounts always exist before
/// OTP sign-in, so there is no set-password step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AadhaarAction {
    SendOtp,
    VerifyOtp,
}

/// Outcome of a phone/Aadhaar step. Only `SignedIn` carries reconcilable state;
/// the other arms report dispatch progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum OtpStep {
    Dispatched,
    /// OTP verified for a phone with no account yet; a set-password call must
    /// follow to complete registration.
    PendingRegistration,
    SignedIn(SignInPayload),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthEventKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// Push notification of a session change. Once a listener is attached this is
/// the authoritative channel: payloads republish verbatim, the cache is never
/// consulted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub user: Option<UserIdentity>,
    pub session: Option<ProviderSession>,
}

/// The remote auth service consumed by the reconciler. Every operation returns
/// the `{data, error}` envelope; transport failures surface as `RemoteError`.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn get_session(&self) -> RemoteResult<ProviderSession>;

    async fn get_user(&self) -> RemoteResult<UserIdentity>;

    async fn sign_up(&self, email: &str, password: &str, attrs: NewUserAttrs) -> RemoteResult<SignInPayload>;

    async fn sign_in(&self, email: &str, password: &str) -> RemoteResult<SignInPayload>;

    async fn sign_in_with_phone(
        &self,
        phone: &str,
        action: PhoneAction,
        otp: Option<&str>,
        password: Option<&str>,
    ) -> RemoteResult<OtpStep>;

    async fn sign_in_with_aadhaar(
        &self,
        aadhaar: &str,
        action: AadhaarAction,
        phone: Option<&str>,
        otp: Option<&str>,
    ) -> RemoteResult<OtpStep>;

    /// Initiates the redirect-based flow; returns the provider URL. The user is
    /// only known after the external redirect returns.
    async fn sign_in_with_google(&self, role: Option<Role>) -> RemoteResult<String>;

    async fn sign_out(&self) -> RemoteResult<()>;

    /// Update account metadata for the current session.
    async fn update_user(&self, update: &ProfileUpdate) -> RemoteResult<UserIdentity>;

    /// Push channel for session changes, when the service supports one.
    fn events(&self) -> Option<mpsc::Receiver<AuthEvent>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_error_requires_both_fields() {
        let full = ApiEnvelope::degraded(1u32, "offline mode");
        assert!(full.is_soft_error());
        assert!(!ApiEnvelope::ok(1u32).is_soft_error());
        assert!(!ApiEnvelope::<u32>::err("down").is_soft_error());
        assert!(!ApiEnvelope::<u32>::empty().is_soft_error());
    }
}
