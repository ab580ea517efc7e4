use std::time::Duration;

use super::error::Classification;
use crate::config::RetryConfig;

/// Exponential backoff schedule for the request orchestrator.
///
/// With the defaults the delays between attempts are 2s, 4s and 8s.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Multiplier applied for every further retry
    pub factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(2000),
            factor: 2,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            factor: config.factor.max(1),
        }
    }

    /// Total attempts including the first one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay to wait after the given 0-indexed failed attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.factor.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(multiplier)
            .unwrap_or(Duration::MAX)
    }

    /// The full delay schedule, one entry per retry
    pub fn schedule(&self) -> Vec<Duration> {
        (0..self.max_retries).map(|a| self.delay_for_attempt(a)).collect()
    }
}

/// Record of one failed attempt inside an orchestrated call
#[derive(Debug, Clone, PartialEq)]
pub struct RequestAttempt {
    /// 1-based attempt number
    pub attempt_index: u32,
    pub classification: Classification,

    /// Backoff scheduled after this attempt, zero when no retry followed
    pub delay_ms: u64,
}

/// Notification published before each backoff delay
#[derive(Debug, Clone, PartialEq)]
pub struct RetryEvent {
    /// 1-based retry number
    pub attempt_index: u32,

    /// Retries allowed for this call
    pub max_attempts: u32,
    pub delay_ms: u64,
    pub last_error_message: String,
}
