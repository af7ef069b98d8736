//! Client behavior configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::registration::{ExponentialBackoff, FixedInterval, RetryPolicy};

/// Default seconds between full registry fetches.
pub const DEFAULT_REGISTRY_FETCH_INTERVAL_SECS: u64 = 30;
/// Default seconds between registration/promotion retries.
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 3;

/// Controls what the client does in the background and on shutdown.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Periodically pull the full registry into the local cache.
    pub fetch_registry: bool,
    /// Seconds between full registry fetches. 0 falls back to the default.
    pub registry_fetch_interval_secs: u64,
    /// Register this instance with the registry.
    pub register_with_eureka: bool,
    /// De-register this instance when the client shuts down.
    pub should_unregister_on_shutdown: bool,
    /// Only route to instances reporting UP.
    pub filter_only_up_instances: bool,
    /// Install termination signal handlers on `run`.
    pub handle_signals: bool,
    /// Timeout for the local port liveness check, in milliseconds.
    pub port_check_timeout_ms: u64,
    /// Delay policy for registration and UP-promotion retries.
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            fetch_registry: true,
            registry_fetch_interval_secs: DEFAULT_REGISTRY_FETCH_INTERVAL_SECS,
            register_with_eureka: true,
            should_unregister_on_shutdown: true,
            filter_only_up_instances: true,
            handle_signals: true,
            port_check_timeout_ms: 1000,
            retry: RetryConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn registry_fetch_interval(&self) -> Duration {
        match self.registry_fetch_interval_secs {
            0 => Duration::from_secs(DEFAULT_REGISTRY_FETCH_INTERVAL_SECS),
            secs => Duration::from_secs(secs),
        }
    }

    pub fn port_check_timeout(&self) -> Duration {
        Duration::from_millis(self.port_check_timeout_ms)
    }
}

/// Shape of the retry delay curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

/// Retry delay configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub kind: BackoffKind,
    /// Fixed delay, or the initial delay for exponential backoff.
    pub interval_secs: u64,
    /// Cap for exponential backoff.
    pub max_interval_secs: u64,
    /// Growth factor for exponential backoff.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            kind: BackoffKind::Fixed,
            interval_secs: DEFAULT_RETRY_INTERVAL_SECS,
            max_interval_secs: 60,
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Build the policy described by this configuration.
    pub fn policy(&self) -> Box<dyn RetryPolicy> {
        let interval_secs = match self.interval_secs {
            0 => DEFAULT_RETRY_INTERVAL_SECS,
            secs => secs,
        };
        let interval = Duration::from_secs(interval_secs);
        match self.kind {
            BackoffKind::Fixed => Box::new(FixedInterval::new(interval)),
            BackoffKind::Exponential => Box::new(
                ExponentialBackoff::new()
                    .with_initial(interval)
                    .with_max(Duration::from_secs(self.max_interval_secs))
                    .with_multiplier(self.multiplier)
                    .with_jitter(false),
            ),
        }
    }
}
