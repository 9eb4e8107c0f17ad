//! Client configuration.

use std::time::Duration;

use gridlink_transport::{ConnectionConfig, InvocationConfig, NetworkAddress, RuntimeConfig};

/// Errors from [`ClientConfigBuilder::build`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No bootstrap address was given.
    #[error("at least one cluster address is required")]
    NoAddresses,

    /// A duration that must be positive is zero.
    #[error("{field} must be greater than zero")]
    ZeroDuration {
        /// Offending setting.
        field: &'static str,
    },

    /// `max_invocation_attempts` is zero.
    #[error("max_invocation_attempts must be at least 1")]
    NoAttempts,
}

/// Settings of a [`GridClient`](crate::GridClient).
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use gridlink::{ClientConfig, NetworkAddress};
///
/// let config = ClientConfig::builder()
///     .cluster_name("prod")
///     .address(NetworkAddress::parse("10.0.0.1:5701").expect("address"))
///     .invocation_timeout(Duration::from_secs(30))
///     .build()
///     .expect("valid config");
/// assert_eq!(config.cluster_name(), "prod");
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    cluster_name: String,
    client_name: String,
    addresses: Vec<NetworkAddress>,
    invocation_timeout: Duration,
    invocation_retry_pause: Duration,
    max_invocation_attempts: u32,
    redo_operation: bool,
    connection: ConnectionConfig,
}

impl ClientConfig {
    /// Start building a client configuration.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Cluster to join.
    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// Name reported to members.
    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    /// Bootstrap addresses, tried in order.
    pub fn addresses(&self) -> &[NetworkAddress] {
        &self.addresses
    }

    /// Default deadline of every invocation.
    pub fn invocation_timeout(&self) -> Duration {
        self.invocation_timeout
    }

    /// Pause between two attempts of an invocation.
    pub fn invocation_retry_pause(&self) -> Duration {
        self.invocation_retry_pause
    }

    /// Maximum attempts per invocation.
    pub fn max_invocation_attempts(&self) -> u32 {
        self.max_invocation_attempts
    }

    /// Whether non-idempotent operations are retried after a connection loss.
    pub fn redo_operation(&self) -> bool {
        self.redo_operation
    }

    /// Connection settings.
    pub fn connection(&self) -> &ConnectionConfig {
        &self.connection
    }

    pub(crate) fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            cluster_name: self.cluster_name.clone(),
            client_name: self.client_name.clone(),
            addresses: self.addresses.clone(),
            connection: self.connection.clone(),
            invocation: InvocationConfig {
                invocation_timeout: self.invocation_timeout,
                retry_pause: self.invocation_retry_pause,
                max_attempts: self.max_invocation_attempts,
                redo_operation: self.redo_operation,
            },
        }
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    cluster_name: String,
    client_name: String,
    addresses: Vec<NetworkAddress>,
    invocation_timeout: Duration,
    invocation_retry_pause: Duration,
    max_invocation_attempts: u32,
    redo_operation: bool,
    connection: ConnectionConfig,
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        let invocation = InvocationConfig::default();
        Self {
            cluster_name: "dev".to_string(),
            client_name: "gridlink-client".to_string(),
            addresses: Vec::new(),
            invocation_timeout: invocation.invocation_timeout,
            invocation_retry_pause: invocation.retry_pause,
            max_invocation_attempts: invocation.max_attempts,
            redo_operation: invocation.redo_operation,
            connection: ConnectionConfig::default(),
        }
    }
}

impl ClientConfigBuilder {
    /// Set the cluster name.
    pub fn cluster_name(mut self, name: impl Into<String>) -> Self {
        self.cluster_name = name.into();
        self
    }

    /// Set the client name.
    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    /// Add a bootstrap address.
    pub fn address(mut self, address: NetworkAddress) -> Self {
        self.addresses.push(address);
        self
    }

    /// Replace the bootstrap addresses.
    pub fn addresses(mut self, addresses: impl IntoIterator<Item = NetworkAddress>) -> Self {
        self.addresses = addresses.into_iter().collect();
        self
    }

    /// Set the default invocation deadline.
    pub fn invocation_timeout(mut self, timeout: Duration) -> Self {
        self.invocation_timeout = timeout;
        self
    }

    /// Set the pause between invocation attempts.
    pub fn invocation_retry_pause(mut self, pause: Duration) -> Self {
        self.invocation_retry_pause = pause;
        self
    }

    /// Set the maximum attempts per invocation.
    pub fn max_invocation_attempts(mut self, attempts: u32) -> Self {
        self.max_invocation_attempts = attempts;
        self
    }

    /// Retry non-idempotent operations after a connection loss.
    pub fn redo_operation(mut self, redo: bool) -> Self {
        self.redo_operation = redo;
        self
    }

    /// Set the connection settings.
    pub fn connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// - `NoAddresses` if no address was added
    /// - `ZeroDuration` for a zero invocation or connection timeout
    /// - `NoAttempts` if `max_invocation_attempts` is zero
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        if self.addresses.is_empty() {
            return Err(ConfigError::NoAddresses);
        }
        if self.invocation_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration {
                field: "invocation_timeout",
            });
        }
        if self.connection.connection_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration {
                field: "connection_timeout",
            });
        }
        if self.max_invocation_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }

        Ok(ClientConfig {
            cluster_name: self.cluster_name,
            client_name: self.client_name,
            addresses: self.addresses,
            invocation_timeout: self.invocation_timeout,
            invocation_retry_pause: self.invocation_retry_pause,
            max_invocation_attempts: self.max_invocation_attempts,
            redo_operation: self.redo_operation,
            connection: self.connection,
        })
    }
}
