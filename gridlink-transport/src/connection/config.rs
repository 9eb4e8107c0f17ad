//! Configuration for connections and reconnection.

use std::time::Duration;

/// Connection and reconnection parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Timeout for a connection attempt, handshake included. Also bounds the
    /// wait for the first member list during bootstrap.
    pub connection_timeout: Duration,

    /// Initial delay before attempting reconnection
    pub initial_reconnect_delay: Duration,

    /// Maximum delay between reconnection attempts
    pub max_reconnect_delay: Duration,

    /// Consecutive connection failures after which a member is treated as
    /// unreachable.
    pub max_connection_failures: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(5),
            initial_reconnect_delay: Duration::from_millis(100),
            max_reconnect_delay: Duration::from_secs(30),
            max_connection_failures: 10,
        }
    }
}

impl ConnectionConfig {
    /// Create a configuration for low-latency local networking.
    pub fn local_network() -> Self {
        Self {
            connection_timeout: Duration::from_millis(500),
            initial_reconnect_delay: Duration::from_millis(10),
            max_reconnect_delay: Duration::from_secs(1),
            max_connection_failures: 5,
        }
    }

    /// Create a configuration for high-latency WAN networking.
    pub fn wan_network() -> Self {
        Self {
            connection_timeout: Duration::from_secs(30),
            initial_reconnect_delay: Duration::from_millis(500),
            max_reconnect_delay: Duration::from_secs(60),
            max_connection_failures: 30,
        }
    }

    /// Delay after `delay`, doubled and capped at `max_reconnect_delay`.
    pub(crate) fn next_delay(&self, delay: Duration) -> Duration {
        std::cmp::min(delay * 2, self.max_reconnect_delay)
    }
}
