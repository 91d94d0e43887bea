//! Broker configuration.
//!
//! Values are provided by the hosting daemon; loading them from files or
//! the environment is not this crate's concern.

use std::time::Duration;

/// Default number of consecutive failures allowed on a single mode.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Configuration of the example broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Consecutive `Retry` outcomes tolerated per mode before `Denied`.
    ///
    /// Default: 5
    pub max_attempts: u32,

    /// Simulated round-trip for phone, FIDO and QR code acknowledgements.
    ///
    /// Default: 2 seconds
    pub ack_wait: Duration,

    /// Simulated delay before the user clicks an emailed link.
    ///
    /// Default: 10 seconds
    pub link_wait: Duration,
}

impl BrokerConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            ack_wait: Duration::from_secs(2),
            link_wait: Duration::from_secs(10),
        }
    }

    /// Set the maximum number of attempts per mode.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the acknowledgement wait.
    #[must_use]
    pub const fn with_ack_wait(mut self, wait: Duration) -> Self {
        self.ack_wait = wait;
        self
    }

    /// Set the emailed link wait.
    #[must_use]
    pub const fn with_link_wait(mut self, wait: Duration) -> Self {
        self.link_wait = wait;
        self
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BrokerConfig::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.ack_wait, Duration::from_secs(2));
        assert_eq!(config.link_wait, Duration::from_secs(10));
    }

    #[test]
    fn test_config_builder() {
        let config = BrokerConfig::new()
            .with_max_attempts(3)
            .with_ack_wait(Duration::from_millis(50))
            .with_link_wait(Duration::from_millis(100));

        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.ack_wait, Duration::from_millis(50));
        assert_eq!(config.link_wait, Duration::from_millis(100));
    }
}
