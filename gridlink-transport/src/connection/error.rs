//! Error types for connection operations.

use std::io;

use gridlink_core::{MemberId, NetworkAddress};
use thiserror::Error;

use crate::wire::WireError;

/// Errors that can occur while opening or using a connection.
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    /// The network provider could not open a stream.
    #[error("connection to {address} failed: {reason}")]
    ConnectFailed {
        /// Address dialed.
        address: NetworkAddress,
        /// Underlying I/O error.
        reason: String,
    },

    /// Connect or handshake did not finish in time.
    #[error("connection to {address} timed out")]
    Timeout {
        /// Address dialed.
        address: NetworkAddress,
    },

    /// The member rejected the authentication request.
    #[error("authentication with {address} failed: {reason}")]
    AuthenticationFailed {
        /// Address dialed.
        address: NetworkAddress,
        /// Reason reported by the member.
        reason: String,
    },

    /// The member answered the handshake with something unexpected.
    #[error("handshake with {address} failed: {reason}")]
    Handshake {
        /// Address dialed.
        address: NetworkAddress,
        /// What went wrong.
        reason: String,
    },

    /// Connection is closed.
    #[error("connection to member {member} is closed")]
    Closed {
        /// Member the connection belonged to.
        member: MemberId,
    },

    /// Too many consecutive connection failures.
    #[error("member {member} is unreachable")]
    MemberUnreachable {
        /// Unreachable member.
        member: MemberId,
    },

    /// Member is not in the current member list.
    #[error("member {member} is not in the member list")]
    UnknownMember {
        /// Requested member.
        member: MemberId,
    },

    /// No configured address accepted a connection.
    #[error("no cluster address could be reached")]
    NoAddressReachable,

    /// The first member list did not arrive in time.
    #[error("timed out waiting for the member list")]
    MemberListTimeout,

    /// Wire format error on an established connection.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// The connection manager is shut down.
    #[error("connection manager is shut down")]
    Shutdown,
}

impl ConnectionError {
    pub(crate) fn io(address: &NetworkAddress, error: io::Error) -> Self {
        ConnectionError::ConnectFailed {
            address: address.clone(),
            reason: error.to_string(),
        }
    }
}

/// Result type for connection operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;
