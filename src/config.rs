//! Runtime configuration read from the environment.

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::{info, warn};

use crate::api::{normalize_api_url, RetryPolicy};
use crate::diagnostics;

pub const DEFAULT_API_URL: &str = "http://localhost:5000";

/// Fixed refresh cadence of the order/menu views.
pub const POLL_INTERVAL: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Normalised backend base URL, without the `/api` prefix.
    pub api_url: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub log_dir: PathBuf,
    /// Write the rolling log file as JSON lines.
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(250),
            },
            log_dir: diagnostics::default_log_dir(),
            log_json: false,
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let defaults = Self::default();
        let api_url = var("KIOSK_API_URL")
            .map(|raw| normalize_api_url(&raw))
            .unwrap_or(defaults.api_url);
        let timeout_secs: u64 = try_load(
            "KIOSK_REQUEST_TIMEOUT_SECS",
            defaults.request_timeout.as_secs(),
        );
        let max_attempts: u32 = try_load("KIOSK_RETRY_ATTEMPTS", defaults.retry.max_attempts);
        let base_ms: u64 = try_load(
            "KIOSK_RETRY_BASE_MS",
            defaults.retry.base_delay.as_millis() as u64,
        );
        let log_dir = var("KIOSK_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.log_dir);
        let log_json: bool = try_load("KIOSK_LOG_JSON", defaults.log_json);

        Self {
            api_url,
            request_timeout: Duration::from_secs(timeout_secs.max(1)),
            retry: RetryPolicy {
                max_attempts: max_attempts.max(1),
                base_delay: Duration::from_millis(base_ms),
            },
            log_dir,
            log_json,
        }
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    let Some(raw) = var(key) else {
        info!("{key} not set, using default: {default}");
        return default;
    };
    raw.parse().unwrap_or_else(|e| {
        warn!("Invalid {key} value {raw:?}: {e}, using default: {default}");
        default
    })
}
