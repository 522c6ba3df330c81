use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use agrilink::cache::FileSlot;
use agrilink::config::Settings;
use agrilink::identity::{ProfileUpdate, Role};
use agrilink::reconciler::{PhoneVerify, Reconciler};
use agrilink::remote::{LocalAuthApi, MemoryProfileStore, NewUserAttrs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    let settings = Settings::from_env();
    info!(
        target: "agrilink",
        "AgriLink session core starting: RUST_LOG='{}', snapshot_dir='{}', remote_timeout_ms={}, otp_ttl_secs={}",
        rust_log, settings.snapshot_dir, settings.remote_timeout_ms, settings.otp_ttl_secs
    );

    let api = LocalAuthApi::from_settings(&settings);
    let profiles = MemoryProfileStore::new();
    let slot = FileSlot::new(&settings.snapshot_dir)?;
    let rec = Arc::new(Reconciler::new(api, profiles, slot, settings));
    let _listener = Arc::clone(&rec).spawn_event_listener();

    // Cold start: nothing cached, provider reports no user
    let state = rec.bootstrap().await;
    info!(target: "agrilink", "cold bootstrap: authenticated={}", state.is_authenticated());

    // First-time phone registration: send, verify, set password
    let phone = "+911234567890";
    rec.send_phone_otp(phone).await?;
    let code = rec
        .api()
        .peek_otp(phone)
        .ok_or_else(|| anyhow::anyhow!("local provider lost the dispatched otp"))?;
    match rec.verify_phone_otp(phone, &code).await? {
        PhoneVerify::NeedsPassword => {
            let phone_user = rec.set_phone_password(phone, "mandi-2024").await?;
            info!(target: "agrilink", "phone registration completed user={}", phone_user.id);
        }
        PhoneVerify::SignedIn(u) => info!(target: "agrilink", "phone sign-in user={}", u.id),
    }

    // Register a farmer and seed the matching profile record
    let attrs = NewUserAttrs { role: Some(Role::Farmer), name: Some("Asha Kulkarni".into()), ..Default::default() };
    let user = rec.sign_up("asha@example.com", "kh3t-2024", attrs).await?;
    rec.profiles().insert(user.clone());
    info!(target: "agrilink", "signed up user={} role={}", user.id, user.role);

    let updated = rec
        .update_profile(ProfileUpdate { locale: Some("hi-IN".into()), ..Default::default() })
        .await?;
    info!(target: "agrilink", "profile updated locale={:?}", updated.locale);

    // Backend goes away: bootstrap falls back to the cached snapshot
    rec.api().set_offline(true);
    let state = rec.bootstrap().await;
    info!(
        target: "agrilink",
        "offline bootstrap: user={:?} loading={}",
        state.user.as_ref().map(|u| u.id.as_str()),
        state.loading
    );

    // And a password sign-in is still satisfied from the snapshot
    let user = rec.sign_in("asha@example.com", "kh3t-2024").await?;
    info!(target: "agrilink", "offline sign-in served from cache user={}", user.id);

    rec.api().set_offline(false);
    rec.sign_out().await;
    let state = rec.state().snapshot();
    info!(
        target: "agrilink",
        "final state: authenticated={} loading={}",
        state.is_authenticated(),
        state.loading
    );
    Ok(())
}
