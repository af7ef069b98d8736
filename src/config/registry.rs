//! Registry server location.

use std::time::Duration;

use serde::Deserialize;

/// Default registry service URL.
pub const DEFAULT_SERVICE_URL: &str = "http://localhost:8761/eureka/";

/// Where the registry server lives and how long to wait for it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceUrlConfig {
    /// Comma-separated list of registry base URLs, tried in turn.
    pub default_zone: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ServiceUrlConfig {
    fn default() -> Self {
        Self {
            default_zone: DEFAULT_SERVICE_URL.to_string(),
            timeout_secs: 10,
        }
    }
}

impl ServiceUrlConfig {
    /// Individual service URLs, trimmed, without empties or trailing slashes.
    pub fn urls(&self) -> Vec<String> {
        self.default_zone
            .split(',')
            .map(|url| url.trim().trim_end_matches('/'))
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
