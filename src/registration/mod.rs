//! Self-registration with the registry.
//!
//! - [`Registrar`]: drives this instance from unregistered to UP
//! - [`Heartbeat`]: renews the lease once registered
//! - [`RetryPolicy`]: delay between registration/promotion attempts

mod heartbeat;
mod lifecycle;

use std::fmt;
use std::time::Duration;

pub use heartbeat::Heartbeat;
pub use lifecycle::Registrar;

/// Where this instance is in its registration lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegistrationState {
    /// Not registered (initial, or self-registration disabled).
    #[default]
    Unregistered,
    /// Register calls in flight or being retried.
    Registering,
    /// Registered with status STARTING.
    Starting,
    /// Waiting for the service to come up, or retrying the status update.
    PromotingToUp,
    /// Registered with status UP.
    Up,
    /// De-registration in flight.
    Deregistering,
    /// Removed from the registry.
    Deregistered,
}

impl RegistrationState {
    /// Whether the registry currently holds a lease for this instance.
    pub fn is_registered(&self) -> bool {
        matches!(
            self,
            RegistrationState::Starting
                | RegistrationState::PromotingToUp
                | RegistrationState::Up
                | RegistrationState::Deregistering
        )
    }
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegistrationState::Unregistered => "unregistered",
            RegistrationState::Registering => "registering",
            RegistrationState::Starting => "starting",
            RegistrationState::PromotingToUp => "promoting-to-up",
            RegistrationState::Up => "up",
            RegistrationState::Deregistering => "deregistering",
            RegistrationState::Deregistered => "deregistered",
        };
        f.write_str(name)
    }
}

/// Strategy for how long to wait before the next attempt.
///
/// Registration and promotion retry until they succeed or the client shuts
/// down, so a policy always yields a delay.
pub trait RetryPolicy: Send + Sync {
    /// Delay after the given failed attempt (0-indexed).
    fn next_delay(&self, attempt: u32) -> Duration;
}

/// Constant delay between attempts.
#[derive(Debug, Clone)]
pub struct FixedInterval {
    interval: Duration,
}

impl FixedInterval {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl RetryPolicy for FixedInterval {
    fn next_delay(&self, _attempt: u32) -> Duration {
        self.interval
    }
}

/// Exponential backoff between attempts.
///
/// Starts with frequent attempts, then backs off to `max`. Useful when many
/// instances restart at once against a registry that is itself recovering.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    jitter: bool,
}

impl ExponentialBackoff {
    /// Backoff starting at one second and doubling up to a minute.
    ///
    /// Defaults: initial=1s, max=60s, multiplier=2.0, jitter=true
    pub fn new() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: true,
        }
    }

    /// Delay after the first failed attempt.
    pub fn with_initial(mut self, initial: Duration) -> Self {
        self.initial = initial;
        self
    }

    /// Upper bound for any delay, before jitter.
    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = max;
        self
    }

    /// Growth factor per attempt. Values below 1.0 are treated as 1.0.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Add up to 25% extra delay so restarting replicas spread out.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(32) as i32;
        let base_delay = self.initial.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        let capped_delay = base_delay.min(self.max.as_secs_f64());

        let final_delay = if self.jitter {
            // Up to 25% extra, nanosecond clock as entropy
            let nanos = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.subsec_nanos())
                .unwrap_or(0);
            capped_delay * (1.0 + (nanos % 250) as f64 / 1000.0)
        } else {
            capped_delay
        };

        Duration::from_secs_f64(final_delay)
    }
}
