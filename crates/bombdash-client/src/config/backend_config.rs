use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::constants::{DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT_MS};

/// Where the backend lives and how patiently to talk to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Scheme, host and port; routes are appended (`/api/...`)
    pub base_url: String,

    pub request_timeout_ms: u64,

    /// Backoff for transient failures during silent session restore
    pub retry: RetryConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            retry: RetryConfig::default(),
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Exponential backoff for retryable backend failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first (0 = unlimited)
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds (default: 500)
    pub initial_delay_ms: u64,

    /// Cap on any single delay in milliseconds (default: 8000)
    pub max_delay_ms: u64,

    /// Each failure multiplies the delay by this amount (default: 2)
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 8_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_ms = (self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent))
            .min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(delay_ms)
    }

    /// Whether attempt number `attempt` (0-indexed) may run
    pub fn should_attempt(&self, attempt: u32) -> bool {
        self.max_attempts == 0 || attempt < self.max_attempts
    }
}
