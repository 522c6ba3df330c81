use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{self, CachedSnapshot, SnapshotSlot};
use crate::config::Settings;
use crate::error::{AuthError, AuthResult};
use crate::identity::{AuthState, ProfileUpdate, ProviderSession, Role, UserIdentity};
use crate::remote::{
    AadhaarAction, ApiEnvelope, AuthApi, AuthEvent, NewUserAttrs, OtpStep, PhoneAction,
    ProfileStore, RemoteError, RemoteResult, SignInPayload,
};

use super::policy::{PrecedencePolicy, Source};
use super::state::StateCell;

/// Identifier carried by a sign-in attempt. Constrains which cached snapshot
/// may serve as a last resort when the remote dies mid-attempt: OTP flows only
/// accept a snapshot for the identifier being verified.
enum AttemptId<'a> {
    Any,
    Phone(&'a str),
    Aadhaar(&'a str),
}

impl AttemptId<'_> {
    fn accepts(&self, user: &UserIdentity) -> bool {
        match self {
            AttemptId::Any => true,
            AttemptId::Phone(p) => user.matches_phone(p),
            AttemptId::Aadhaar(a) => user.matches_aadhaar(a),
        }
    }
}

/// Outcome of a phone OTP verification.
#[derive(Debug, Clone, PartialEq)]
pub enum PhoneVerify {
    SignedIn(UserIdentity),
    /// OTP accepted for a phone with no account; registration completes with
    /// `set_phone_password`.
    NeedsPassword,
}

/// Produces one coherent (user, session, loading) triple from the remote auth
/// service, the cached snapshot and the live in-memory state, and keeps it
/// updated as sign-in/sign-out/profile operations occur.
///
/// State machine: Uninitialized -> Loading -> {Authenticated, Anonymous}, with
/// Authenticated <-> Anonymous on sign-in/sign-out and Loading re-entered only
/// during bootstrap. There is no error state: every failure resolves to
/// Anonymous or is masked by cache fallback, and loading always clears.
pub struct Reconciler<A, P, S> {
    api: A,
    profiles: P,
    slot: S,
    settings: Settings,
    policy: PrecedencePolicy,
    state: StateCell,
}

impl<A, P, S> Reconciler<A, P, S>
where
    A: AuthApi,
    P: ProfileStore,
    S: SnapshotSlot,
{
    pub fn new(api: A, profiles: P, slot: S, settings: Settings) -> Self {
        Self {
            api,
            profiles,
            slot,
            settings,
            policy: PrecedencePolicy::default(),
            state: StateCell::new(),
        }
    }

    pub fn api(&self) -> &A { &self.api }
    pub fn profiles(&self) -> &P { &self.profiles }
    pub fn slot(&self) -> &S { &self.slot }
    pub fn state(&self) -> &StateCell { &self.state }
    pub fn settings(&self) -> &Settings { &self.settings }

    pub fn current_user(&self) -> Option<UserIdentity> {
        self.state.snapshot().user
    }

    /// Bound every remote call. A call that outlives the budget is classified
    /// remote-unreachable; nothing may leave `loading` hanging.
    async fn bounded<T, F>(&self, fut: F) -> RemoteResult<T>
    where
        F: Future<Output = RemoteResult<T>>,
    {
        let budget = Duration::from_millis(self.settings.remote_timeout_ms);
        match tokio::time::timeout(budget, fut).await {
            Ok(res) => res,
            Err(_) => Err(RemoteError::Timeout(self.settings.remote_timeout_ms)),
        }
    }

    fn load_cached(&self) -> Option<CachedSnapshot> {
        cache::load(&self.slot, &self.settings.snapshot_key)
    }

    fn store_snapshot(&self, user: &UserIdentity) {
        if let Err(e) = cache::store(&self.slot, &self.settings.snapshot_key, user) {
            warn!(target: "agrilink", "snapshot write failed: {}", e);
        }
    }

    /// Commit a reconciled login: persist the snapshot, publish the triple.
    fn adopt(&self, user: UserIdentity, session: Option<ProviderSession>) {
        self.store_snapshot(&user);
        self.state.publish(Some(user), session, false);
    }

    /// Startup reconciliation. Publishes the cached snapshot optimistically so
    /// callers can render before the network round-trip, then lets the remote
    /// answer supersede it. Remote failure is never surfaced; it degrades to
    /// the cache or to anonymous.
    pub async fn bootstrap(&self) -> AuthState {
        let cached = self.load_cached();
        match &cached {
            Some(snap) => {
                debug!(target: "agrilink", "bootstrap: optimistic publish of cached user {}", snap.user.id);
                self.state.publish(Some(snap.user.clone()), None, true);
            }
            None => self.state.set_loading(true),
        }

        let (session_res, user_res) = tokio::join!(
            self.bounded(self.api.get_session()),
            self.bounded(self.api.get_user()),
        );

        // An envelope error with no payload counts as a failed remote read.
        let remote: Result<Option<UserIdentity>, RemoteError> = match user_res {
            Ok(env) => {
                let ApiEnvelope { data, error } = env;
                match (data, error) {
                    (Some(user), warning) => {
                        if let Some(w) = warning {
                            warn!(target: "agrilink", "remote user read degraded: {}", w);
                        }
                        Ok(Some(user))
                    }
                    (None, None) => Ok(None),
                    (None, Some(e)) => Err(RemoteError::Unreachable(e)),
                }
            }
            Err(e) => Err(e),
        };
        let session = match session_res {
            Ok(env) => env.data,
            Err(_) => None,
        };

        let resolution = self.policy.resolve(remote, cached);
        info!(target: "agrilink", "bootstrap resolved source={:?} user={:?}",
            resolution.source, resolution.user.as_ref().map(|u| u.id.as_str()));
        if resolution.source == Source::Remote {
            if let Some(user) = &resolution.user {
                self.store_snapshot(user);
            }
        }
        // A session only makes sense next to a remote-confirmed user.
        let session = if resolution.source == Source::Remote { session } else { None };
        self.state.publish(resolution.user, session, false);
        self.state.snapshot()
    }

    /// Shared handling for envelopes that may carry a signed-in payload. A user
    /// payload reconciles immediately and wins even when a soft error rides
    /// along; an envelope with no usable payload fails the attempt and leaves
    /// state untouched.
    fn accept_signin(&self, env: ApiEnvelope<SignInPayload>, op: &str) -> AuthResult<UserIdentity> {
        let ApiEnvelope { data, error } = env;
        match data {
            Some(SignInPayload { user: Some(user), session }) => {
                if let Some(warning) = error {
                    warn!(target: "agrilink", "{} succeeded in degraded mode: {}", op, warning);
                }
                self.adopt(user.clone(), session);
                info!(target: "agrilink", "{} reconciled user={}", op, user.id);
                Ok(user)
            }
            _ => Err(AuthError::credential(
                error.unwrap_or_else(|| format!("{} rejected with no user payload", op)),
            )),
        }
    }

    /// Last resort after a transport failure mid-sign-in: an acceptable cached
    /// snapshot counts as a successful login. OTP attempts restrict acceptance
    /// to the identifier under verification.
    fn cache_last_resort(&self, attempt: AttemptId<'_>, err: RemoteError, op: &str) -> AuthResult<UserIdentity> {
        let Some(snap) = self.load_cached() else {
            return Err(AuthError::unreachable(err.to_string()));
        };
        if !attempt.accepts(&snap.user) {
            debug!(target: "agrilink", "{}: cached snapshot does not match attempted identifier", op);
            return Err(AuthError::unreachable(err.to_string()));
        }
        warn!(target: "agrilink", "{} satisfied from cached snapshot after remote failure: {}", op, err);
        let user = snap.user;
        self.state.publish(Some(user.clone()), None, false);
        Ok(user)
    }

    pub async fn sign_up(&self, email: &str, password: &str, attrs: NewUserAttrs) -> AuthResult<UserIdentity> {
        match self.bounded(self.api.sign_up(email, password, attrs)).await {
            Ok(env) => self.accept_signin(env, "sign-up"),
            // No cache can vouch for an account that never existed
            Err(e) => Err(AuthError::unreachable(e.to_string())),
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<UserIdentity> {
        match self.bounded(self.api.sign_in(email, password)).await {
            Ok(env) => self.accept_signin(env, "password sign-in"),
            Err(e) => self.cache_last_resort(AttemptId::Any, e, "password sign-in"),
        }
    }

    /// Dispatch step only: reports whether the code went out, never touches
    /// published state.
    pub async fn send_phone_otp(&self, phone: &str) -> AuthResult<()> {
        match self.bounded(self.api.sign_in_with_phone(phone, PhoneAction::SendOtp, None, None)).await {
            Ok(env) => match env.data {
                Some(_) => Ok(()),
                None => Err(AuthError::credential(env.error.unwrap_or_else(|| "otp dispatch rejected".into()))),
            },
            Err(e) => Err(AuthError::unreachable(e.to_string())),
        }
    }

    pub async fn verify_phone_otp(&self, phone: &str, otp: &str) -> AuthResult<PhoneVerify> {
        match self.bounded(self.api.sign_in_with_phone(phone, PhoneAction::VerifyOtp, Some(otp), None)).await {
            Ok(env) => {
                let ApiEnvelope { data, error } = env;
                match data {
                    Some(OtpStep::SignedIn(payload)) => self
                        .accept_signin(ApiEnvelope { data: Some(payload), error }, "phone otp sign-in")
                        .map(PhoneVerify::SignedIn),
                    Some(OtpStep::PendingRegistration) => Ok(PhoneVerify::NeedsPassword),
                    Some(OtpStep::Dispatched) | None => Err(AuthError::credential(
                        error.unwrap_or_else(|| "otp verification rejected".into()),
                    )),
                }
            }
            Err(e) => self
                .cache_last_resort(AttemptId::Phone(phone), e, "phone otp sign-in")
                .map(PhoneVerify::SignedIn),
        }
    }

    /// Completes first-time phone registration after a verified OTP.
    pub async fn set_phone_password(&self, phone: &str, password: &str) -> AuthResult<UserIdentity> {
        match self.bounded(self.api.sign_in_with_phone(phone, PhoneAction::SetPassword, None, Some(password))).await {
            Ok(env) => {
                let ApiEnvelope { data, error } = env;
                match data {
                    Some(OtpStep::SignedIn(payload)) => {
                        self.accept_signin(ApiEnvelope { data: Some(payload), error }, "phone registration")
                    }
                    _ => Err(AuthError::credential(
                        error.unwrap_or_else(|| "phone registration rejected".into()),
                    )),
                }
            }
            Err(e) => Err(AuthError::unreachable(e.to_string())),
        }
    }

    pub async fn send_aadhaar_otp(&self, aadhaar: &str, phone: Option<&str>) -> AuthResult<()> {
        match self.bounded(self.api.sign_in_with_aadhaar(aadhaar, AadhaarAction::SendOtp, phone, None)).await {
            Ok(env) => match env.data {
                Some(_) => Ok(()),
                None => Err(AuthError::credential(env.error.unwrap_or_else(|| "otp dispatch rejected".into()))),
            },
            Err(e) => Err(AuthError::unreachable(e.to_string())),
        }
    }

    pub async fn verify_aadhaar_otp(&self, aadhaar: &str, otp: &str) -> AuthResult<UserIdentity> {
        match self.bounded(self.api.sign_in_with_aadhaar(aadhaar, AadhaarAction::VerifyOtp, None, Some(otp))).await {
            Ok(env) => {
                let ApiEnvelope { data, error } = env;
                match data {
                    Some(OtpStep::SignedIn(payload)) => {
                        self.accept_signin(ApiEnvelope { data: Some(payload), error }, "aadhaar otp sign-in")
                    }
                    _ => Err(AuthError::credential(
                        error.unwrap_or_else(|| "otp verification rejected".into()),
                    )),
                }
            }
            Err(e) => self.cache_last_resort(AttemptId::Aadhaar(aadhaar), e, "aadhaar otp sign-in"),
        }
    }

    /// Returns the provider redirect URL. No reconciled user yet; the identity
    /// arrives later through bootstrap or the event channel.
    pub async fn sign_in_with_google(&self, role: Option<Role>) -> AuthResult<String> {
        match self.bounded(self.api.sign_in_with_google(role)).await {
            Ok(env) => {
                let ApiEnvelope { data, error } = env;
                data.ok_or_else(|| {
                    AuthError::credential(error.unwrap_or_else(|| "oauth initiation rejected".into()))
                })
            }
            Err(e) => Err(AuthError::unreachable(e.to_string())),
        }
    }

    /// Clears session and snapshot and publishes anonymous. Always succeeds
    /// locally; a failing remote sign-out is logged, never propagated.
    pub async fn sign_out(&self) {
        match self.bounded(self.api.sign_out()).await {
            Ok(env) => {
                if let Some(e) = env.error {
                    warn!(target: "agrilink", "remote sign-out reported: {}", e);
                }
            }
            Err(e) => {
                warn!(target: "agrilink", "remote sign-out failed, clearing locally anyway: {}", e);
            }
        }
        cache::clear(&self.slot, &self.settings.snapshot_key);
        self.state.clear();
        info!(target: "agrilink", "signed out");
    }

    /// Profile update with graceful degradation. Requires a current user. In
    /// cache-only mode (snapshot present, no provider session) the update
    /// merges straight into the snapshot with no remote traffic. Otherwise the
    /// auth-metadata update is attempted (non-fatal) and the profile record is
    /// updated, falling back to the cache merge on failure. The in-memory user
    /// reflects the merged result before returning in every path.
    pub async fn update_profile(&self, update: ProfileUpdate) -> AuthResult<UserIdentity> {
        let current_state = self.state.snapshot();
        let Some(mut current) = current_state.user.clone() else {
            return Err(AuthError::no_user());
        };

        if current_state.is_cache_only() && self.load_cached().is_some() {
            update.merge_into(&mut current);
            self.store_snapshot(&current);
            self.state.publish_user(Some(current.clone()));
            info!(target: "agrilink", "profile updated in cache-only mode user={}", current.id);
            return Ok(current);
        }

        let meta = update.auth_metadata();
        if !meta.is_empty() {
            match self.bounded(self.api.update_user(&meta)).await {
                Ok(env) => {
                    if env.data.is_none() {
                        if let Some(e) = env.error {
                            warn!(target: "agrilink", "auth metadata update rejected: {}", e);
                        }
                    }
                }
                Err(e) => warn!(target: "agrilink", "auth metadata update failed: {}", e),
            }
        }

        match self.profiles.update_user(&current.id, &update).await {
            Ok(updated) => {
                self.store_snapshot(&updated);
                self.state.publish_user(Some(updated.clone()));
                Ok(updated)
            }
            Err(e) => {
                warn!(target: "agrilink", "profile record update failed, merging into cache: {}", e);
                update.merge_into(&mut current);
                self.store_snapshot(&current);
                self.state.publish_user(Some(current.clone()));
                Ok(current)
            }
        }
    }

    /// Republish from a push event. Once established this is the authoritative
    /// channel: the payload wins unconditionally and the cache is not consulted.
    pub fn apply_event(&self, ev: AuthEvent) {
        debug!(target: "agrilink", "auth event {:?}", ev.kind);
        self.state.publish(ev.user, ev.session, false);
    }
}

impl<A, P, S> Reconciler<A, P, S>
where
    A: AuthApi + 'static,
    P: ProfileStore + 'static,
    S: SnapshotSlot + 'static,
{
    /// Drain the provider's push channel, if it has one, republishing every
    /// event. Returns None when the service supports no subscription.
    pub fn spawn_event_listener(self: Arc<Self>) -> Option<JoinHandle<()>> {
        let mut rx = self.api.events()?;
        let this = self;
        Some(tokio::spawn(async move {
            while let Some(ev) = rx.recv().await {
                this.apply_event(ev);
            }
            debug!(target: "agrilink", "auth event channel closed");
        }))
    }
}
