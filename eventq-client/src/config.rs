//! Configuration for the event queue client.
//!
//! Controls the per-request timeout and the retry backoff curve applied
//! after consecutive failed round trips.

use std::time::Duration;

use crate::error::EventQueueError;

/// Configuration for an [`EventQueueClient`](crate::EventQueueClient).
#[derive(Debug, Clone)]
pub struct EventQueueConfig {
    /// How long the transport may hold one long-poll request open.
    /// Default: 60 seconds (viewers use 30 on the main grid, 60 elsewhere).
    pub request_timeout: Duration,

    /// Backoff applied after the first failed round trip.
    /// Default: 15 seconds
    pub backoff_base: Duration,

    /// Additional backoff per consecutive failure.
    /// Default: 5 seconds
    pub backoff_step: Duration,

    /// Upper bound on the backoff delay.
    /// Default: 5 minutes
    pub backoff_cap: Duration,
}

impl Default for EventQueueConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            backoff_base: Duration::from_secs(15),
            backoff_step: Duration::from_secs(5),
            backoff_cap: Duration::from_secs(5 * 60),
        }
    }
}

impl EventQueueConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), EventQueueError> {
        if self.request_timeout.is_zero() {
            return Err(EventQueueError::Configuration(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if self.backoff_base > self.backoff_cap {
            return Err(EventQueueError::Configuration(
                "Invalid backoff: base must not exceed cap".to_string(),
            ));
        }

        Ok(())
    }

    /// The delay to apply before the next request, given the count of
    /// consecutive failed round trips. Zero when the streak is zero;
    /// otherwise `min(base + streak * step, cap)`.
    pub fn backoff_delay(&self, streak: u32) -> Duration {
        if streak == 0 {
            return Duration::ZERO;
        }
        (self.backoff_base + self.backoff_step * streak).min(self.backoff_cap)
    }

    /// Builder-style setter for the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Builder-style setter for the backoff curve.
    pub fn with_backoff(mut self, base: Duration, step: Duration, cap: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_step = step;
        self.backoff_cap = cap;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EventQueueConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.backoff_base, Duration::from_secs(15));
        assert_eq!(config.backoff_step, Duration::from_secs(5));
        assert_eq!(config.backoff_cap, Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let invalid_timeout = EventQueueConfig {
            request_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(invalid_timeout.validate().is_err());

        let invalid_backoff = EventQueueConfig {
            backoff_base: Duration::from_secs(600),
            backoff_cap: Duration::from_secs(300),
            ..Default::default()
        };
        assert!(invalid_backoff.validate().is_err());
    }

    #[test]
    fn test_backoff_delay_curve() {
        let config = EventQueueConfig::default();

        assert_eq!(config.backoff_delay(0), Duration::ZERO);
        assert_eq!(config.backoff_delay(1), Duration::from_secs(20));
        assert_eq!(config.backoff_delay(2), Duration::from_secs(25));

        // 15 + 57 * 5 = 300, exactly at the cap; anything past it clamps.
        assert_eq!(config.backoff_delay(57), Duration::from_secs(300));
        assert_eq!(config.backoff_delay(58), Duration::from_secs(300));
        assert_eq!(config.backoff_delay(1000), Duration::from_secs(300));
    }

    #[test]
    fn test_builder_pattern() {
        let config = EventQueueConfig::new()
            .with_request_timeout(Duration::from_secs(30))
            .with_backoff(
                Duration::from_secs(1),
                Duration::from_secs(1),
                Duration::from_secs(10),
            );

        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(config.backoff_delay(100), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }
}
