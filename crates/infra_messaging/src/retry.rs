//! Redelivery policy
//!
//! `delay = initial_delay * multiplier ^ (attempt - 1)`, capped at `max_delay`.
//! A message is delivered at most `max_attempts` times before it is
//! dead-lettered.
//!
//! # Defaults
//!
//! - `max_attempts`: 5
//! - `initial_delay`: 200ms
//! - `max_delay`: 10 seconds
//! - `multiplier`: 2.0

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RedeliveryPolicy {
    /// Total deliveries allowed, first one included
    pub max_attempts: u32,
    /// Delay after the first failed delivery
    pub initial_delay: Duration,
    /// Cap for exponential backoff
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RedeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RedeliveryPolicy {
    #[must_use]
    pub fn builder() -> RedeliveryPolicyBuilder {
        RedeliveryPolicyBuilder::default()
    }

    /// Delay before redelivering after `attempt` failed deliveries
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);

        if !delay_ms.is_finite() || delay_ms >= self.max_delay.as_millis() as f64 {
            self.max_delay
        } else {
            Duration::from_millis(delay_ms as u64)
        }
    }

    /// True if a message that failed its `attempt`-th delivery gets another one
    #[must_use]
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Builder for [`RedeliveryPolicy`]
#[derive(Debug, Clone, Default)]
pub struct RedeliveryPolicyBuilder {
    max_attempts: Option<u32>,
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
}

impl RedeliveryPolicyBuilder {
    #[must_use]
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    #[must_use]
    pub fn build(self) -> RedeliveryPolicy {
        let defaults = RedeliveryPolicy::default();
        RedeliveryPolicy {
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts).max(1),
            initial_delay: self.initial_delay.unwrap_or(defaults.initial_delay),
            max_delay: self.max_delay.unwrap_or(defaults.max_delay),
            multiplier: self.multiplier.unwrap_or(defaults.multiplier),
        }
    }
}
