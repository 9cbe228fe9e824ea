//! Core types for gateway wrappers.

use declarative::{GatewayCall, GatewayError};
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings.
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_factor,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

/// A failure injected into the in-memory gateway.
///
/// Matches calls of one kind, optionally only those mentioning `target`
/// (an entity kind, an id, a parent id or a member id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub call: GatewayCall,
    pub target: Option<String>,
    pub error: GatewayError,
    /// Number of matching calls that fail before the fault is spent
    pub remaining: usize,
}

impl Fault {
    pub fn new(call: GatewayCall, error: GatewayError) -> Self {
        Self {
            call,
            target: None,
            error,
            remaining: 1,
        }
    }

    pub fn on(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn times(mut self, remaining: usize) -> Self {
        self.remaining = remaining;
        self
    }

    pub(crate) fn matches(&self, call: GatewayCall, subjects: &[&str]) -> bool {
        self.remaining > 0
            && self.call == call
            && self
                .target
                .as_deref()
                .is_none_or(|t| subjects.contains(&t))
    }
}
