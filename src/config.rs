use serde::{
    Deserialize,
    Serialize,
};
use std::{
    path::Path,
    time::Duration,
};
use thiserror::Error;

pub const DEFAULT_DEBOUNCE_MS: u64 = 5_000;
pub const DEFAULT_PROGRESS_STEP: u32 = 10;
pub const DEFAULT_FALLBACK_DISPLAY_NAME: &str = "Guest";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tunables for one tapping session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Quiet period after the last tap before the balance is flushed.
    pub debounce_ms: u64,
    pub progress_step: u32,
    /// Used when the host supplies neither a username nor a numeric user id.
    pub fallback_display_name: String,
    pub resolve_retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            progress_step: DEFAULT_PROGRESS_STEP,
            fallback_display_name: DEFAULT_FALLBACK_DISPLAY_NAME.to_string(),
            resolve_retry: RetryPolicy::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce_ms == 0 {
            return Err(ConfigError::Invalid(
                "debounce_ms must be greater than zero".to_string(),
            ));
        }
        if !(1..=100).contains(&self.progress_step) {
            return Err(ConfigError::Invalid(format!(
                "progress_step must be within 1..=100, got {}",
                self.progress_step
            )));
        }
        self.resolve_retry.validate()
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Bounded exponential backoff applied around account resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 4_000,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "resolve_retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Delay before the attempt following `failed_attempt` (1-based).
    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(16);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}
