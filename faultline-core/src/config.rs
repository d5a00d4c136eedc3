//! Static, validated tunables consumed by the registry and router

use crate::error::{FaultlineError, FaultlineResult};
use crate::types::RuntimeMode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration constants
mod defaults {
    use std::time::Duration;

    /// Maximum retained error reports (FIFO eviction beyond this)
    pub const HISTORY_LIMIT: usize = 1000;

    /// Maximum retained breadcrumbs
    pub const BREADCRUMB_LIMIT: usize = 50;

    /// Sliding window for correlation pattern detection
    pub const CORRELATION_WINDOW: Duration = Duration::from_secs(300);

    /// Recent-report count that triggers pattern derivation
    pub const BURST_THRESHOLD: usize = 5;

    /// Queue size that triggers an immediate flush to sinks
    pub const BATCH_SIZE: usize = 10;

    /// Periodic flush interval for non-empty queues
    pub const FLUSH_INTERVAL: Duration = Duration::from_secs(30);

    /// Base delay suggested to callers that retry
    pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

    /// Upper bound on any suggested retry delay
    pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

    /// Delay multiplier for escalated backoff (rate-limited or offline)
    pub const RATE_LIMIT_MULTIPLIER: u32 = 5;

    /// Budget for a single handler invocation
    pub const HANDLER_TIMEOUT: Duration = Duration::from_secs(10);
}

/// Tunables for the error triage pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub history_limit: usize,
    pub breadcrumb_limit: usize,
    #[serde(with = "humantime_serde")]
    pub correlation_window: Duration,
    pub burst_threshold: usize,
    pub batch_size: usize,
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub retry_base_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub retry_max_delay: Duration,
    pub rate_limit_multiplier: u32,
    #[serde(with = "humantime_serde")]
    pub handler_timeout: Duration,
    pub runtime_mode: RuntimeMode,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            history_limit: defaults::HISTORY_LIMIT,
            breadcrumb_limit: defaults::BREADCRUMB_LIMIT,
            correlation_window: defaults::CORRELATION_WINDOW,
            burst_threshold: defaults::BURST_THRESHOLD,
            batch_size: defaults::BATCH_SIZE,
            flush_interval: defaults::FLUSH_INTERVAL,
            retry_base_delay: defaults::RETRY_BASE_DELAY,
            retry_max_delay: defaults::RETRY_MAX_DELAY,
            rate_limit_multiplier: defaults::RATE_LIMIT_MULTIPLIER,
            handler_timeout: defaults::HANDLER_TIMEOUT,
            runtime_mode: RuntimeMode::Production,
        }
    }
}

impl PipelineConfig {
    /// Load and validate configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> FaultlineResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> FaultlineResult<()> {
        if self.history_limit == 0 {
            return Err(invalid("history_limit", "must be greater than zero"));
        }
        if self.breadcrumb_limit == 0 {
            return Err(invalid("breadcrumb_limit", "must be greater than zero"));
        }
        if self.correlation_window.is_zero() {
            return Err(invalid("correlation_window", "must be non-zero"));
        }
        if self.burst_threshold < 2 {
            return Err(invalid(
                "burst_threshold",
                "must be at least 2; a single report is never a burst",
            ));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "must be greater than zero"));
        }
        if self.flush_interval.is_zero() {
            return Err(invalid("flush_interval", "must be non-zero"));
        }
        if self.retry_max_delay < self.retry_base_delay {
            return Err(invalid(
                "retry_max_delay",
                "must be greater than or equal to retry_base_delay",
            ));
        }
        if self.rate_limit_multiplier == 0 {
            return Err(invalid("rate_limit_multiplier", "must be greater than zero"));
        }
        if self.handler_timeout.is_zero() {
            return Err(invalid("handler_timeout", "must be non-zero"));
        }
        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> FaultlineError {
    FaultlineError::Configuration {
        field: field.to_string(),
        message: message.to_string(),
    }
}
