//! In-process implementation of the auth service, used by the demo binary and
//! the integration tests. Accounts live in memory with Argon2 PHC password
//! hashes; OTP codes are bounded-TTL and single-use; provider tokens are
//! 128-bit random base64url. Fault-injection toggles simulate an unreachable
//! or degraded backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use parking_lot::RwLock;
use password_hash::{PasswordHash, SaltString};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use super::api::{
    AadhaarAction, ApiEnvelope, AuthApi, AuthEvent, AuthEventKind, NewUserAttrs, OtpStep,
    PhoneAction, RemoteError, RemoteResult, SignInPayload,
};
use crate::config::Settings;
use crate::identity::{ProfileUpdate, ProviderSession, Role, UserIdentity};

fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2.hash_password(password.as_bytes(), &salt).map_err(|e| anyhow!(e.to_string()))?.to_string();
    Ok(phc)
}

fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else { false }
}

fn gen_token() -> String {
    // 128-bit random token base64url without padding
    let mut buf = [0u8; 32];
    let _ = getrandom::getrandom(&mut buf);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

fn gen_otp() -> String {
    let mut buf = [0u8; 4];
    let _ = getrandom::getrandom(&mut buf);
    format!("{:06}", u32::from_le_bytes(buf) % 1_000_000)
}

#[derive(Clone)]
struct Account {
    user: UserIdentity,
    password_hash: Option<String>,
}

struct OtpEntry {
    code: String,
    expires_at: Instant,
}

pub struct LocalAuthApi {
    otp_ttl: Duration,
    session_ttl: Duration,
    accounts: RwLock<HashMap<String, Account>>,
    /// Dispatched codes keyed by the phone/Aadhaar identifier.
    otps: RwLock<HashMap<String, OtpEntry>>,
    /// Phones with a verified OTP but no account yet; completed by SetPassword.
    pending: RwLock<HashMap<String, Instant>>,
    current: RwLock<Option<ProviderSession>>,
    listeners: RwLock<Vec<mpsc::Sender<AuthEvent>>>,
    offline: AtomicBool,
    degraded: AtomicBool,
}

impl LocalAuthApi {
    pub fn new(otp_ttl: Duration, session_ttl: Duration) -> Self {
        Self {
            otp_ttl,
            session_ttl,
            accounts: RwLock::new(HashMap::new()),
            otps: RwLock::new(HashMap::new()),
            pending: RwLock::new(HashMap::new()),
            current: RwLock::new(None),
            listeners: RwLock::new(Vec::new()),
            offline: AtomicBool::new(false),
            degraded: AtomicBool::new(false),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            Duration::from_secs(settings.otp_ttl_secs),
            Duration::from_secs(settings.session_ttl_secs),
        )
    }

    /// Simulate an unreachable backend: every call fails at the transport level.
    pub fn set_offline(&self, on: bool) {
        self.offline.store(on, Ordering::SeqCst);
    }

    /// Simulate a degraded backend: calls succeed but carry a soft error.
    pub fn set_degraded(&self, on: bool) {
        self.degraded.store(on, Ordering::SeqCst);
    }

    /// Seed an account, as the platform's provisioning pipeline would.
    pub fn register(&self, user: UserIdentity, password: Option<&str>) -> Result<()> {
        let hash = match password {
            Some(pw) => Some(hash_password(pw)?),
            None => None,
        };
        let mut w = self.accounts.write();
        if let Some(email) = user.email.as_deref() {
            if w.values().any(|a| a.user.matches_email(email)) {
                return Err(anyhow!("email already registered: {}", email));
            }
        }
        info!(target: "agrilink", "account registered user={} role={}", user.id, user.role);
        w.insert(user.id.clone(), Account { user, password_hash: hash });
        Ok(())
    }

    fn guard(&self) -> Result<(), RemoteError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Unreachable("injected offline fault".into()));
        }
        Ok(())
    }

    fn wrap<T>(&self, data: T) -> ApiEnvelope<T> {
        if self.degraded.load(Ordering::SeqCst) {
            ApiEnvelope::degraded(data, "offline mode")
        } else {
            ApiEnvelope::ok(data)
        }
    }

    fn find_account<F: Fn(&UserIdentity) -> bool>(&self, pred: F) -> Option<Account> {
        self.accounts.read().values().find(|a| pred(&a.user)).cloned()
    }

    fn issue_session(&self, user_id: &str) -> ProviderSession {
        let now = Utc::now().timestamp_millis();
        let sess = ProviderSession {
            token: gen_token(),
            user_id: user_id.to_string(),
            issued_at_ms: now,
            expires_at_ms: now + self.session_ttl.as_millis() as i64,
        };
        *self.current.write() = Some(sess.clone());
        info!(target: "agrilink", "session issued user={} ttl_secs={}", user_id, self.session_ttl.as_secs());
        sess
    }

    fn emit(&self, ev: AuthEvent) {
        self.listeners.write().retain(|tx| tx.try_send(ev.clone()).is_ok());
    }

    fn signed_in(&self, user: UserIdentity) -> SignInPayload {
        let session = self.issue_session(&user.id);
        self.emit(AuthEvent {
            kind: AuthEventKind::SignedIn,
            user: Some(user.clone()),
            session: Some(session.clone()),
        });
        SignInPayload { user: Some(user), session: Some(session) }
    }

    /// Check and consume a dispatched OTP. Single use: a consumed or expired
    /// code never verifies twice.
    fn take_otp(&self, identifier: &str, code: &str) -> Result<(), &'static str> {
        let mut w = self.otps.write();
        let Some(entry) = w.get(identifier) else { return Err("otp not issued") };
        if Instant::now() >= entry.expires_at {
            w.remove(identifier);
            return Err("otp expired");
        }
        if entry.code != code.trim() {
            return Err("incorrect otp");
        }
        w.remove(identifier);
        Ok(())
    }

    fn dispatch_otp(&self, identifier: &str) {
        let code = gen_otp();
        debug!(target: "agrilink", "otp for {} is {}", identifier, code);
        self.otps.write().insert(
            identifier.to_string(),
            OtpEntry { code, expires_at: Instant::now() + self.otp_ttl },
        );
    }

    /// Last code dispatched for an identifier, still unexpired. The local
    /// provider has no SMS channel; flows read the code from here.
    pub fn peek_otp(&self, identifier: &str) -> Option<String> {
        let r = self.otps.read();
        r.get(identifier).filter(|e| Instant::now() < e.expires_at).map(|e| e.code.clone())
    }
}

#[async_trait]
impl AuthApi for LocalAuthApi {
    async fn get_session(&self) -> RemoteResult<ProviderSession> {
        self.guard()?;
        let current = self.current.read().clone();
        match current {
            Some(s) if !s.is_expired() => Ok(self.wrap(s)),
            Some(_) => {
                *self.current.write() = None;
                Ok(ApiEnvelope::empty())
            }
            None => Ok(ApiEnvelope::empty()),
        }
    }

    async fn get_user(&self) -> RemoteResult<UserIdentity> {
        self.guard()?;
        let current = self.current.read().clone();
        let Some(sess) = current.filter(|s| !s.is_expired()) else {
            return Ok(ApiEnvelope::empty());
        };
        match self.accounts.read().get(&sess.user_id) {
            Some(a) => Ok(self.wrap(a.user.clone())),
            None => Ok(ApiEnvelope::err("account vanished")),
        }
    }

    async fn sign_up(&self, email: &str, password: &str, attrs: NewUserAttrs) -> RemoteResult<SignInPayload> {
        self.guard()?;
        if self.find_account(|u| u.matches_email(email)).is_some() {
            return Ok(ApiEnvelope::err("email already registered"));
        }
        let mut user = UserIdentity::new(Uuid::new_v4().to_string(), attrs.role.unwrap_or(Role::Consumer));
        user.email = Some(email.trim().to_string());
        user.name = attrs.name;
        user.phone = attrs.phone;
        user.locale = attrs.locale;
        let hash = hash_password(password).map_err(|e| RemoteError::Unreachable(e.to_string()))?;
        self.accounts.write().insert(user.id.clone(), Account { user: user.clone(), password_hash: Some(hash) });
        Ok(self.wrap(self.signed_in(user)))
    }

    async fn sign_in(&self, email: &str, password: &str) -> RemoteResult<SignInPayload> {
        self.guard()?;
        let Some(account) = self.find_account(|u| u.matches_email(email)) else {
            return Ok(ApiEnvelope::err("invalid email or password"));
        };
        let ok = account.password_hash.as_deref().map(|h| verify_password(h, password)).unwrap_or(false);
        if !ok {
            return Ok(ApiEnvelope::err("invalid email or password"));
        }
        Ok(self.wrap(self.signed_in(account.user)))
    }

    async fn sign_in_with_phone(
        &self,
        phone: &str,
        action: PhoneAction,
        otp: Option<&str>,
        password: Option<&str>,
    ) -> RemoteResult<OtpStep> {
        self.guard()?;
        let phone = phone.trim();
        match action {
            PhoneAction::SendOtp => {
                self.dispatch_otp(phone);
                Ok(self.wrap(OtpStep::Dispatched))
            }
            PhoneAction::VerifyOtp => {
                let Some(code) = otp else { return Ok(ApiEnvelope::err("otp required")) };
                if let Err(reason) = self.take_otp(phone, code) {
                    return Ok(ApiEnvelope::err(reason));
                }
                match self.find_account(|u| u.matches_phone(phone)) {
                    Some(mut account) => {
                        account.user.verified = true;
                        self.accounts.write().insert(account.user.id.clone(), account.clone());
                        Ok(self.wrap(OtpStep::SignedIn(self.signed_in(account.user))))
                    }
                    None => {
                        self.pending.write().insert(phone.to_string(), Instant::now());
                        Ok(self.wrap(OtpStep::PendingRegistration))
                    }
                }
            }
            PhoneAction::SetPassword => {
                let Some(pw) = password else { return Ok(ApiEnvelope::err("password required")) };
                if self.pending.write().remove(phone).is_none() {
                    return Ok(ApiEnvelope::err("phone not verified"));
                }
                let mut user = UserIdentity::new(Uuid::new_v4().to_string(), Role::Consumer);
                user.phone = Some(phone.to_string());
                user.verified = true;
                let hash = hash_password(pw).map_err(|e| RemoteError::Unreachable(e.to_string()))?;
                self.accounts.write().insert(user.id.clone(), Account { user: user.clone(), password_hash: Some(hash) });
                Ok(self.wrap(OtpStep::SignedIn(self.signed_in(user))))
            }
        }
    }

    async fn sign_in_with_aadhaar(
        &self,
        aadhaar: &str,
        action: AadhaarAction,
        phone: Option<&str>,
        otp: Option<&str>,
    ) -> RemoteResult<OtpStep> {
        self.guard()?;
        let aadhaar = aadhaar.trim();
        let Some(account) = self.find_account(|u| u.matches_aadhaar(aadhaar)) else {
            return Ok(ApiEnvelope::err("no account linked to this aadhaar"));
        };
        match action {
            AadhaarAction::SendOtp => {
                if let Some(p) = phone {
                    if !account.user.matches_phone(p) {
                        return Ok(ApiEnvelope::err("phone does not match aadhaar record"));
                    }
                }
                self.dispatch_otp(aadhaar);
                Ok(self.wrap(OtpStep::Dispatched))
            }
            AadhaarAction::VerifyOtp => {
                let Some(code) = otp else { return Ok(ApiEnvelope::err("otp required")) };
                if let Err(reason) = self.take_otp(aadhaar, code) {
                    return Ok(ApiEnvelope::err(reason));
                }
                let mut account = account;
                account.user.verified = true;
                self.accounts.write().insert(account.user.id.clone(), account.clone());
                Ok(self.wrap(OtpStep::SignedIn(self.signed_in(account.user))))
            }
        }
    }

    async fn sign_in_with_google(&self, role: Option<Role>) -> RemoteResult<String> {
        self.guard()?;
        let mut url = String::from("https://auth.agrilink.example/oauth/google?redirect=app");
        if let Some(r) = role {
            url.push_str("&role=");
            url.push_str(r.as_str());
        }
        Ok(self.wrap(url))
    }

    async fn sign_out(&self) -> RemoteResult<()> {
        self.guard()?;
        *self.current.write() = None;
        self.emit(AuthEvent { kind: AuthEventKind::SignedOut, user: None, session: None });
        Ok(self.wrap(()))
    }

    async fn update_user(&self, update: &ProfileUpdate) -> RemoteResult<UserIdentity> {
        self.guard()?;
        let current = self.current.read().clone();
        let Some(sess) = current.filter(|s| !s.is_expired()) else {
            return Ok(ApiEnvelope::err("not authenticated"));
        };
        let mut w = self.accounts.write();
        let Some(account) = w.get_mut(&sess.user_id) else {
            return Ok(ApiEnvelope::err("account vanished"));
        };
        update.auth_metadata().merge_into(&mut account.user);
        let user = account.user.clone();
        drop(w);
        self.emit(AuthEvent {
            kind: AuthEventKind::UserUpdated,
            user: Some(user.clone()),
            session: Some(sess),
        });
        Ok(self.wrap(user))
    }

    fn events(&self) -> Option<mpsc::Receiver<AuthEvent>> {
        let (tx, rx) = mpsc::channel(16);
        self.listeners.write().push(tx);
        Some(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_round_trip() {
        let phc = hash_password("kh3t-2024").unwrap();
        assert!(phc.starts_with("$argon2"));
        assert!(verify_password(&phc, "kh3t-2024"));
        assert!(!verify_password(&phc, "kh3t-2025"));
        assert!(!verify_password("not-a-phc-string", "kh3t-2024"));
    }

    #[test]
    fn token_is_base64url_of_128_bits() {
        let t = gen_token();
        assert_eq!(t.len(), 43);
        assert!(t.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn otp_is_six_digits_and_single_use() {
        let api = LocalAuthApi::new(Duration::from_secs(60), Duration::from_secs(60));
        api.dispatch_otp("+911234567890");
        let code = api.peek_otp("+911234567890").unwrap();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
        assert!(api.take_otp("+911234567890", &code).is_ok());
        assert_eq!(api.take_otp("+911234567890", &code), Err("otp not issued"));
    }

    #[test]
    fn expired_otp_never_verifies() {
        let api = LocalAuthApi::new(Duration::from_millis(0), Duration::from_secs(60));
        api.dispatch_otp("1234-5678-9012");
        // Zero TTL expires immediately
        assert_eq!(api.take_otp("1234-5678-9012", "000000"), Err("otp expired"));
    }
}
