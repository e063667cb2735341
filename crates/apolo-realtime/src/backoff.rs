//! Reconnect backoff policy

use apolo_core::config::ChannelConfig;
use std::time::Duration;

/// Exponential backoff with a ceiling and an attempt cap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts,
        }
    }

    pub fn from_config(config: &ChannelConfig) -> Self {
        Self::new(
            config.reconnect_base_delay(),
            config.max_reconnect_delay(),
            config.max_reconnect_attempts,
        )
    }

    /// Delay before reconnect attempt `attempt` (1-based)
    ///
    /// `base * 2^(attempt-1)`, capped at `max_delay`. `None` once the attempt
    /// cap is passed.
    ///
    /// # Examples
    ///
    /// ```
    /// use apolo_realtime::ReconnectPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = ReconnectPolicy::new(Duration::from_secs(1), Duration::from_secs(60), 5);
    /// assert_eq!(policy.delay_for(3), Some(Duration::from_secs(4)));
    /// assert_eq!(policy.delay_for(6), None);
    /// ```
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        Some(self.base_delay.saturating_mul(factor).min(self.max_delay))
    }
}
