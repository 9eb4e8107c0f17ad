//! Error types for the client session.

use gridlink_transport::ConnectionError;

use crate::config::ConfigError;

/// Errors from creating a [`GridClient`](crate::GridClient).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// The configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// No configured address authenticated, or no member list arrived.
    #[error("cannot connect to the cluster: {0}")]
    Bootstrap(#[from] ConnectionError),
}
