use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where the hosted identity/data service lives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Project URL, e.g. `https://xyzcompany.supabase.co`
    pub url: String,
    /// Public (anon) API key sent as `apikey` on every request
    pub anon_key: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl ServiceConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
            request_timeout_secs: default_request_timeout(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Tuning for the session lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Upper bound on the initial session check
    #[serde(default = "default_bootstrap_timeout")]
    pub bootstrap_timeout_ms: u64,
    /// Quiet period before a search term is sent
    #[serde(default = "default_search_debounce")]
    pub search_debounce_ms: u64,
    /// Redirect target for unauthenticated or expired sessions
    #[serde(default = "default_login_path")]
    pub login_path: String,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_bootstrap_timeout() -> u64 {
    5_000
}

fn default_search_debounce() -> u64 {
    300
}

fn default_login_path() -> String {
    "/login".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bootstrap_timeout_ms: default_bootstrap_timeout(),
            search_debounce_ms: default_search_debounce(),
            login_path: default_login_path(),
        }
    }
}

impl SessionConfig {
    pub fn bootstrap_timeout(&self) -> Duration {
        Duration::from_millis(self.bootstrap_timeout_ms)
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }
}
