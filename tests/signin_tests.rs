//! Password sign-in, sign-up and sign-out contracts: soft errors reconcile as
//! success, explicit rejections leave state untouched, transport failures fall
//! back to the cached snapshot, and sign-out always succeeds locally.

use agrilink::cache::{self, MemorySlot};
use agrilink::config::Settings;
use agrilink::error::AuthError;
use agrilink::identity::{Role, UserIdentity};
use agrilink::reconciler::Reconciler;
use agrilink::remote::{LocalAuthApi, MemoryProfileStore, NewUserAttrs};

fn seeded_api(email: &str, password: &str) -> LocalAuthApi {
    let api = LocalAuthApi::from_settings(&Settings::default());
    let mut user = UserIdentity::new("u-asha", Role::Farmer);
    user.email = Some(email.to_string());
    api.register(user, Some(password)).unwrap();
    api
}

fn reconciler(api: LocalAuthApi) -> Reconciler<LocalAuthApi, MemoryProfileStore, MemorySlot> {
    Reconciler::new(api, MemoryProfileStore::new(), MemorySlot::new(), Settings::default())
}

#[tokio::test]
async fn valid_password_reconciles_and_writes_snapshot() {
    let rec = reconciler(seeded_api("asha@example.com", "kh3t-2024"));

    let user = rec.sign_in("asha@example.com", "kh3t-2024").await.unwrap();
    assert_eq!(user.id, "u-asha");

    let state = rec.state().snapshot();
    assert!(state.is_authenticated());
    assert!(state.session.is_some());
    assert!(!state.loading);

    let snap = cache::load(rec.slot(), &rec.settings().snapshot_key).unwrap();
    assert_eq!(snap.user.id, "u-asha");
}

#[tokio::test]
async fn soft_error_alongside_user_payload_is_a_success() {
    let api = seeded_api("asha@example.com", "kh3t-2024");
    api.set_degraded(true);
    let rec = reconciler(api);

    // {data: {user}, error: "offline mode"} reconciles and returns Ok
    let user = rec.sign_in("asha@example.com", "kh3t-2024").await.unwrap();
    assert_eq!(user.id, "u-asha");
    assert_eq!(rec.current_user().map(|u| u.id), Some("u-asha".to_string()));
}

#[tokio::test]
async fn rejected_credentials_propagate_and_leave_state_unchanged() {
    let rec = reconciler(seeded_api("asha@example.com", "kh3t-2024"));

    let err = rec.sign_in("asha@example.com", "wrong").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredential { .. }));
    assert!(!err.is_retryable());

    assert!(rec.current_user().is_none());
    assert!(cache::load(rec.slot(), &rec.settings().snapshot_key).is_none());
}

#[tokio::test]
async fn transport_failure_falls_back_to_any_cached_snapshot() {
    let api = seeded_api("asha@example.com", "kh3t-2024");
    api.set_offline(true);
    let rec = reconciler(api);
    let mut cached = UserIdentity::new("u-cached", Role::Consumer);
    cached.email = Some("someone-else@example.com".to_string());
    cache::store(rec.slot(), &rec.settings().snapshot_key, &cached).unwrap();

    // The password path accepts whatever snapshot exists as a last resort
    let user = rec.sign_in("asha@example.com", "kh3t-2024").await.unwrap();
    assert_eq!(user.id, "u-cached");
    assert_eq!(rec.current_user().map(|u| u.id), Some("u-cached".to_string()));
}

#[tokio::test]
async fn transport_failure_without_cache_propagates() {
    let api = seeded_api("asha@example.com", "kh3t-2024");
    api.set_offline(true);
    let rec = reconciler(api);

    let err = rec.sign_in("asha@example.com", "kh3t-2024").await.unwrap_err();
    assert!(matches!(err, AuthError::RemoteUnreachable { .. }));
    assert!(err.is_retryable());
    assert!(rec.current_user().is_none());
}

#[tokio::test]
async fn sign_up_reconciles_with_requested_role() {
    let rec = reconciler(LocalAuthApi::from_settings(&Settings::default()));
    let attrs = NewUserAttrs { role: Some(Role::Warehouse), name: Some("Depot A".into()), ..Default::default() };

    let user = rec.sign_up("depot@example.com", "crate-stack-7", attrs).await.unwrap();
    assert_eq!(user.role, Role::Warehouse);
    assert!(rec.state().snapshot().is_authenticated());
}

#[tokio::test]
async fn duplicate_sign_up_is_rejected_without_state_change() {
    let rec = reconciler(seeded_api("asha@example.com", "kh3t-2024"));

    let err = rec.sign_up("asha@example.com", "other", NewUserAttrs::default()).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredential { .. }));
    assert!(rec.current_user().is_none());
}

#[tokio::test]
async fn google_sign_in_returns_redirect_and_touches_nothing() {
    let rec = reconciler(LocalAuthApi::from_settings(&Settings::default()));

    let url = rec.sign_in_with_google(Some(Role::Farmer)).await.unwrap();
    assert!(url.contains("role=farmer"));
    assert!(rec.current_user().is_none());
    assert!(!rec.state().snapshot().loading);
}

#[tokio::test]
async fn sign_out_is_idempotent() {
    let rec = reconciler(seeded_api("asha@example.com", "kh3t-2024"));
    rec.sign_in("asha@example.com", "kh3t-2024").await.unwrap();

    rec.sign_out().await;
    let once = rec.state().snapshot();
    rec.sign_out().await;
    let twice = rec.state().snapshot();

    assert_eq!(once, twice);
    assert!(once.user.is_none() && once.session.is_none() && !once.loading);
    assert!(cache::load(rec.slot(), &rec.settings().snapshot_key).is_none());
}

#[tokio::test]
async fn sign_out_succeeds_locally_when_remote_is_down() {
    let rec = reconciler(seeded_api("asha@example.com", "kh3t-2024"));
    rec.sign_in("asha@example.com", "kh3t-2024").await.unwrap();
    rec.api().set_offline(true);

    rec.sign_out().await;
    let state = rec.state().snapshot();
    assert!(state.user.is_none());
    assert!(cache::load(rec.slot(), &rec.settings().snapshot_key).is_none());
}
