//! Error types for routing and invocations.

use std::time::Duration;

use gridlink_core::{CodecError, MemberId};

use crate::connection::ConnectionError;
use crate::protocol::RemoteError;

/// Errors from the partition router.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    /// The partition has no owner yet, or the partition count is unknown.
    #[error("no owner yet for partition {partition:?}")]
    NoOwnerYet {
        /// Partition, if the partition count is known.
        partition: Option<u32>,
    },
}

/// Errors surfaced by [`crate::InvocationService::invoke`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum InvocationError {
    /// Connection to the target dropped before the response arrived.
    #[error("connection to member {member} dropped before the response")]
    TargetDisconnected {
        /// Target member.
        member: MemberId,
    },

    /// The deadline elapsed without a response.
    #[error("invocation of op {op_code:#06x} timed out after {timeout:?}")]
    InvocationTimeout {
        /// Operation invoked.
        op_code: u16,
        /// Configured timeout.
        timeout: Duration,
    },

    /// The target left the cluster.
    #[error("member {member} left the cluster")]
    MemberLeft {
        /// Departed member.
        member: MemberId,
    },

    /// Partition table gap.
    #[error("no owner yet for partition {partition:?}")]
    NoOwnerYet {
        /// Partition, if the partition count is known.
        partition: Option<u32>,
    },

    /// Too many consecutive connection failures to the target.
    #[error("member {member} is unreachable")]
    MemberUnreachable {
        /// Target member.
        member: MemberId,
    },

    /// Could not connect to the target or the request was never written.
    #[error("could not send to member {member}: {reason}")]
    ConnectFailed {
        /// Target member.
        member: MemberId,
        /// What failed.
        reason: String,
    },

    /// No member is known to serve the request.
    #[error("no member available")]
    NoMemberAvailable,

    /// The member answered with an error.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Request or response body could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// The client session is shut down.
    #[error("client is shut down")]
    ClientShutdown,
}

impl InvocationError {
    /// Whether the error is transient and eligible for an internal retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            InvocationError::TargetDisconnected { .. }
                | InvocationError::NoOwnerYet { .. }
                | InvocationError::ConnectFailed { .. }
                | InvocationError::NoMemberAvailable
        )
    }

    pub(crate) fn from_connection(member: MemberId, error: ConnectionError) -> Self {
        match error {
            ConnectionError::MemberUnreachable { member } => {
                InvocationError::MemberUnreachable { member }
            }
            ConnectionError::UnknownMember { member } => InvocationError::MemberLeft { member },
            ConnectionError::Shutdown => InvocationError::ClientShutdown,
            other => InvocationError::ConnectFailed {
                member,
                reason: other.to_string(),
            },
        }
    }
}

impl From<CodecError> for InvocationError {
    fn from(error: CodecError) -> Self {
        InvocationError::Codec(error.to_string())
    }
}

impl From<RoutingError> for InvocationError {
    fn from(error: RoutingError) -> Self {
        match error {
            RoutingError::NoOwnerYet { partition } => InvocationError::NoOwnerYet { partition },
        }
    }
}
