//! Tunables for the connection manager and the presentation layer.

use std::time::Duration;
use thiserror::Error;

use crate::scheduler::Millis;

/// Configuration error types
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Reconnect, heartbeat, and queueing behaviour of one connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// First reconnect delay; doubles on every further attempt.
    pub base_delay: Duration,
    /// Upper bound on any single reconnect delay.
    pub max_delay: Duration,
    /// Consecutive failed reconnect attempts before giving up.
    pub max_retries: u32,
    /// Interval between outbound heartbeat pings while connected.
    pub heartbeat_interval: Duration,
    /// How long one connection attempt may take.
    pub connect_timeout: Duration,
    /// Heartbeat intervals without a pong before an open connection is
    /// abandoned. `None` never abandons an open connection.
    pub max_missed_pongs: Option<u32>,
    /// Messages held while disconnected before `send` starts failing.
    pub outbound_queue_limit: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_retries: 10,
            heartbeat_interval: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(10),
            max_missed_pongs: None,
            outbound_queue_limit: 1024,
        }
    }
}

impl ConnectionConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_delay.is_zero() {
            return Err(ConfigError::Invalid {
                field: "base_delay",
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.max_delay < self.base_delay {
            return Err(ConfigError::Invalid {
                field: "max_delay",
                reason: format!("Must be at least base_delay ({:?})", self.base_delay),
            });
        }

        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::Invalid {
                field: "heartbeat_interval",
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.max_missed_pongs == Some(0) {
            return Err(ConfigError::Invalid {
                field: "max_missed_pongs",
                reason: "Must be at least 1 when set".to_string(),
            });
        }

        if self.outbound_queue_limit == 0 {
            return Err(ConfigError::Invalid {
                field: "outbound_queue_limit",
                reason: "Must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Reconnect delay before attempt number `attempt` (0-based):
    /// `min(base_delay * 2^attempt, max_delay)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Pacing of the local-only presentation sequences.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PresentationConfig {
    /// Delay between two dealt cards.
    pub deal_interval: Duration,
    /// Pause after the last dealt card before the deal reports completion.
    pub deal_settle_delay: Duration,
    pub showdown_intro: Duration,
    /// Time spent revealing each showing seat.
    pub showdown_reveal_step: Duration,
    pub showdown_winner_announce: Duration,
    pub showdown_settle: Duration,
    /// How long one chip movement is shown before it counts as complete.
    pub chip_animation: Duration,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            deal_interval: Duration::from_millis(150),
            deal_settle_delay: Duration::from_millis(400),
            showdown_intro: Duration::from_millis(800),
            showdown_reveal_step: Duration::from_millis(600),
            showdown_winner_announce: Duration::from_millis(1500),
            showdown_settle: Duration::from_millis(1000),
            chip_animation: Duration::from_millis(500),
        }
    }
}

impl PresentationConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.deal_interval.is_zero() {
            return Err(ConfigError::Invalid {
                field: "deal_interval",
                reason: "Must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Convert a duration to scheduler milliseconds, saturating.
pub fn millis(duration: Duration) -> Millis {
    u64::try_from(duration.as_millis()).unwrap_or(Millis::MAX)
}
