//! Synchronization configuration
//!
//! Defines the timing parameters of the synchronization layer: polling
//! cadence, stream silence detection and stream reconnection.

use std::time::Duration;
use thiserror::Error;

/// Invalid configuration value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid sync configuration: {0}")]
pub struct ConfigError(pub &'static str);

/// Synchronization configuration
///
/// All intervals are configurable to allow tuning for different backends
/// (local development vs. a hosted API behind a proxy that buffers streams).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// How often to query job status once streaming has degraded
    pub poll_interval: Duration,

    /// Longest time a stream may go without delivering an update before it
    /// counts as failed, across reconnects
    ///
    /// SSE keep-alive comments are swallowed by the event parser and do not
    /// count, so a job that legitimately reports nothing for this long is
    /// moved to polling even over a healthy connection.
    pub silence_window: Duration,

    /// Reconnect attempts after a stream error before falling back to polling
    pub reconnect_attempts: u32,

    /// Delay before each reconnect attempt
    pub reconnect_delay: Duration,
}

impl SyncConfig {
    /// Creates a configuration with the given polling cadence and defaults
    /// for everything else
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            silence_window: Duration::from_secs(30),
            reconnect_attempts: 1,
            reconnect_delay: Duration::from_secs(1),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Optional environment variables:
    /// - CRAWLWATCH_POLL_INTERVAL_MS (default: 2000)
    /// - CRAWLWATCH_SILENCE_WINDOW_SECS (default: 30)
    /// - CRAWLWATCH_RECONNECT_ATTEMPTS (default: 1)
    /// - CRAWLWATCH_RECONNECT_DELAY_MS (default: 1000)
    ///
    /// Unparsable values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let poll_interval = env_parse::<u64>("CRAWLWATCH_POLL_INTERVAL_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval);

        let silence_window = env_parse::<u64>("CRAWLWATCH_SILENCE_WINDOW_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.silence_window);

        let reconnect_attempts =
            env_parse::<u32>("CRAWLWATCH_RECONNECT_ATTEMPTS").unwrap_or(defaults.reconnect_attempts);

        let reconnect_delay = env_parse::<u64>("CRAWLWATCH_RECONNECT_DELAY_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.reconnect_delay);

        Self {
            poll_interval,
            silence_window,
            reconnect_attempts,
            reconnect_delay,
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError("poll_interval must be greater than 0"));
        }

        if self.silence_window.is_zero() {
            return Err(ConfigError("silence_window must be greater than 0"));
        }

        if self.silence_window <= self.reconnect_delay {
            return Err(ConfigError("silence_window must be longer than reconnect_delay"));
        }

        if self.reconnect_attempts == 0 {
            return Err(ConfigError("reconnect_attempts must be at least 1"));
        }

        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse::<T>().ok())
}
