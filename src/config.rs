use time::Duration;
use tracing::warn;

use crate::access_keys::{AccessKeys, StringKey};
use crate::claim::{ClaimPolicy, DEFAULT_CLAIM_TIMEOUT, DEFAULT_DUPLICATE_WINDOW};

const DEFAULT_DATABASE_URL: &str = "sqlite://leaderboard.db?mode=rwc";

/// Settings read from the environment (and `.env`) at launch.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub policy: ClaimPolicy,
    pub keys: AccessKeys,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let database_url =
            dotenv::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_owned());

        let policy = ClaimPolicy {
            claim_timeout: parse_seconds(
                "CLAIM_TIMEOUT_SECS",
                dotenv::var("CLAIM_TIMEOUT_SECS").ok().as_deref(),
                DEFAULT_CLAIM_TIMEOUT,
            ),
            duplicate_window: parse_seconds(
                "DUPLICATE_WINDOW_SECS",
                dotenv::var("DUPLICATE_WINDOW_SECS").ok().as_deref(),
                DEFAULT_DUPLICATE_WINDOW,
            ),
        };

        let generated = AccessKeys::generate();
        let keys = AccessKeys {
            device_key: configured_key(
                "DEVICE_KEY",
                dotenv::var("DEVICE_KEY").ok().as_deref(),
                generated.device_key,
            ),
            admin_key: configured_key(
                "ADMIN_KEY",
                dotenv::var("ADMIN_KEY").ok().as_deref(),
                generated.admin_key,
            ),
        };

        Self {
            database_url,
            policy,
            keys,
        }
    }
}

fn parse_seconds(name: &str, raw: Option<&str>, default: Duration) -> Duration {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse::<u32>() {
        Ok(seconds) => Duration::seconds(i64::from(seconds)),
        Err(err) => {
            warn!(var = name, value = raw, error = %err, "invalid number of seconds, using default");
            default
        }
    }
}

fn configured_key(name: &str, raw: Option<&str>, generated: StringKey) -> StringKey {
    match raw.map(str::trim) {
        Some(key) if !key.is_empty() => StringKey::new(key),
        _ => {
            warn!(var = name, key = %generated, "no key configured, generated one for this run");
            generated
        }
    }
}
