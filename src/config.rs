//! Runtime settings for the session core.
//! Defaults are compiled in; `Settings::from_env` applies `AGRILINK_*` environment
//! overrides so binaries and tests can retune without a config file.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Slot key under which the cached user snapshot is stored.
    #[serde(default = "Settings::default_snapshot_key")]
    pub snapshot_key: String,
    /// Root directory for the file-backed snapshot slot.
    #[serde(default = "Settings::default_snapshot_dir")]
    pub snapshot_dir: String,
    /// Upper bound for any single remote auth call. A call exceeding this is
    /// classified remote-unreachable and takes the cache-fallback path.
    #[serde(default = "Settings::default_remote_timeout_ms")]
    pub remote_timeout_ms: u64,
    /// Lifetime of a dispatched OTP code.
    #[serde(default = "Settings::default_otp_ttl_secs")]
    pub otp_ttl_secs: u64,
    /// Lifetime of a provider session token issued by the local auth api.
    #[serde(default = "Settings::default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

impl Settings {
    fn default_snapshot_key() -> String { "agrilink_user".to_string() }
    fn default_snapshot_dir() -> String { ".agrilink".to_string() }
    fn default_remote_timeout_ms() -> u64 { 10_000 }
    fn default_otp_ttl_secs() -> u64 { 300 }
    fn default_session_ttl_secs() -> u64 { 60 * 60 }

    /// Build settings from the environment, falling back to defaults per field.
    pub fn from_env() -> Self {
        let mut s = Settings::default();
        if let Ok(v) = std::env::var("AGRILINK_SNAPSHOT_KEY") {
            if !v.is_empty() { s.snapshot_key = v; }
        }
        if let Ok(v) = std::env::var("AGRILINK_SNAPSHOT_DIR") {
            if !v.is_empty() { s.snapshot_dir = v; }
        }
        if let Ok(v) = std::env::var("AGRILINK_REMOTE_TIMEOUT_MS") {
            if let Ok(n) = v.parse::<u64>() { s.remote_timeout_ms = n; }
        }
        if let Ok(v) = std::env::var("AGRILINK_OTP_TTL_SECS") {
            if let Ok(n) = v.parse::<u64>() { s.otp_ttl_secs = n; }
        }
        if let Ok(v) = std::env::var("AGRILINK_SESSION_TTL_SECS") {
            if let Ok(n) = v.parse::<u64>() { s.session_ttl_secs = n; }
        }
        s
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            snapshot_key: Self::default_snapshot_key(),
            snapshot_dir: Self::default_snapshot_dir(),
            remote_timeout_ms: Self::default_remote_timeout_ms(),
            otp_ttl_secs: Self::default_otp_ttl_secs(),
            session_ttl_secs: Self::default_session_ttl_secs(),
        }
    }
}
