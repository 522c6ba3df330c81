//! Update-profile contracts: fail-fast without a user, remote-free merge in
//! cache-only mode, profile-record update with cache-merge fallback, and the
//! auth-metadata field subset.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use agrilink::cache::{self, MemorySlot};
use agrilink::config::Settings;
use agrilink::error::AuthError;
use agrilink::identity::{ProfileUpdate, ProviderSession, Role, UserIdentity};
use agrilink::reconciler::Reconciler;
use agrilink::remote::{
    AadhaarAction, ApiEnvelope, AuthApi, AuthEvent, LocalAuthApi, MemoryProfileStore, NewUserAttrs,
    OtpStep, PhoneAction, RemoteError, RemoteResult, SignInPayload,
};

/// Counts every remote call; answers as an unreachable backend. Lets tests
/// assert that a path generated no remote traffic at all.
#[derive(Default)]
struct RecordingApi {
    calls: AtomicUsize,
}

impl RecordingApi {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn down<T>(&self) -> RemoteResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RemoteError::Unreachable("recording stub".into()))
    }
}

#[async_trait]
impl AuthApi for RecordingApi {
    async fn get_session(&self) -> RemoteResult<ProviderSession> { self.down() }
    async fn get_user(&self) -> RemoteResult<UserIdentity> { self.down() }
    async fn sign_up(&self, _: &str, _: &str, _: NewUserAttrs) -> RemoteResult<SignInPayload> { self.down() }
    async fn sign_in(&self, _: &str, _: &str) -> RemoteResult<SignInPayload> { self.down() }
    async fn sign_in_with_phone(&self, _: &str, _: PhoneAction, _: Option<&str>, _: Option<&str>) -> RemoteResult<OtpStep> { self.down() }
    async fn sign_in_with_aadhaar(&self, _: &str, _: AadhaarAction, _: Option<&str>, _: Option<&str>) -> RemoteResult<OtpStep> { self.down() }
    async fn sign_in_with_google(&self, _: Option<Role>) -> RemoteResult<String> { self.down() }
    async fn sign_out(&self) -> RemoteResult<()> { self.down() }
    async fn update_user(&self, _: &ProfileUpdate) -> RemoteResult<UserIdentity> { self.down() }
    fn events(&self) -> Option<mpsc::Receiver<AuthEvent>> { None }
}

fn farmer(id: &str) -> UserIdentity {
    let mut u = UserIdentity::new(id, Role::Farmer);
    u.email = Some(format!("{}@example.com", id));
    u
}

#[tokio::test]
async fn update_without_user_fails_fast_with_no_remote_call() {
    let rec = Reconciler::new(RecordingApi::default(), MemoryProfileStore::new(), MemorySlot::new(), Settings::default());

    let err = rec
        .update_profile(ProfileUpdate { name: Some("New Name".into()), ..Default::default() })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NoCurrentUser { .. }));
    assert_eq!(rec.api().calls(), 0);
    assert!(rec.current_user().is_none());
}

#[tokio::test]
async fn cache_only_mode_merges_without_remote_traffic() {
    let rec = Reconciler::new(RecordingApi::default(), MemoryProfileStore::new(), MemorySlot::new(), Settings::default());
    cache::store(rec.slot(), &rec.settings().snapshot_key, &farmer("u-1")).unwrap();

    // Bootstrap against the dead remote leaves a cache-only state
    let state = rec.bootstrap().await;
    assert!(state.is_cache_only());
    let after_bootstrap = rec.api().calls();

    let updated = rec
        .update_profile(ProfileUpdate { name: Some("New Name".into()), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(updated.name.as_deref(), Some("New Name"));

    // Snapshot and in-memory user both carry the change; not one remote call was made
    let snap = cache::load(rec.slot(), &rec.settings().snapshot_key).unwrap();
    assert_eq!(snap.user.name.as_deref(), Some("New Name"));
    assert_eq!(rec.current_user().unwrap().name.as_deref(), Some("New Name"));
    assert_eq!(rec.api().calls(), after_bootstrap);
}

fn seeded_reconciler() -> Reconciler<LocalAuthApi, MemoryProfileStore, MemorySlot> {
    let api = LocalAuthApi::from_settings(&Settings::default());
    api.register(farmer("u-1"), Some("kh3t-2024")).unwrap();
    Reconciler::new(api, MemoryProfileStore::new(), MemorySlot::new(), Settings::default())
}

#[tokio::test]
async fn profile_record_update_publishes_and_recaches() {
    let rec = seeded_reconciler();
    rec.sign_in("u-1@example.com", "kh3t-2024").await.unwrap();
    rec.profiles().insert(farmer("u-1"));

    let update = ProfileUpdate {
        name: Some("Asha K".into()),
        locale: Some("hi-IN".into()),
        ..Default::default()
    };
    let updated = rec.update_profile(update).await.unwrap();
    assert_eq!(updated.name.as_deref(), Some("Asha K"));
    assert_eq!(updated.locale.as_deref(), Some("hi-IN"));

    assert_eq!(rec.profiles().get("u-1").unwrap().name.as_deref(), Some("Asha K"));
    let snap = cache::load(rec.slot(), &rec.settings().snapshot_key).unwrap();
    assert_eq!(snap.user.locale.as_deref(), Some("hi-IN"));
    assert_eq!(rec.current_user().unwrap().name.as_deref(), Some("Asha K"));
}

#[tokio::test]
async fn missing_profile_record_falls_back_to_cache_merge() {
    // Profile store has no record for the user; the update still succeeds
    let rec = seeded_reconciler();
    rec.sign_in("u-1@example.com", "kh3t-2024").await.unwrap();

    let updated = rec
        .update_profile(ProfileUpdate { name: Some("Asha K".into()), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(updated.name.as_deref(), Some("Asha K"));

    let snap = cache::load(rec.slot(), &rec.settings().snapshot_key).unwrap();
    assert_eq!(snap.user.name.as_deref(), Some("Asha K"));
    assert_eq!(rec.current_user().unwrap().name.as_deref(), Some("Asha K"));
}

#[tokio::test]
async fn auth_metadata_update_carries_only_the_account_subset() {
    let rec = seeded_reconciler();
    rec.sign_in("u-1@example.com", "kh3t-2024").await.unwrap();
    rec.profiles().insert(farmer("u-1"));

    let update = ProfileUpdate {
        name: Some("Asha K".into()),
        locale: Some("hi-IN".into()),
        ..Default::default()
    };
    rec.update_profile(update).await.unwrap();

    // The provider account saw the name but never the locale
    let remote = rec.api().get_user().await.unwrap().data.unwrap();
    assert_eq!(remote.name.as_deref(), Some("Asha K"));
    assert!(remote.locale.is_none());
}
