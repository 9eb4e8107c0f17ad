//! # gridlink-transport
//!
//! Client runtime beneath every distributed-object proxy.
//!
//! This crate provides:
//! - **Wire format**: length-prefixed frames with CRC32C checksums
//! - **Connections**: one authenticated connection per member, with lazy
//!   connect and background reconnection
//! - **Member directory and partition router**: the cluster view used to
//!   pick a target member
//! - **Invocation service**: correlation ids, deadlines and retries
//! - **Listener service**: server-pushed event delivery

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

// Re-export core types for convenience
pub use gridlink_core::{
    CodecError, CorrelationId, Data, JsonCodec, MemberId, MessageCodec, NetworkAddress,
    NetworkProvider, Serializer, TokioNetworkProvider,
};

// =============================================================================
// Modules
// =============================================================================

/// Connection management.
pub mod connection;

/// Frame routing from connection readers to session tables.
pub mod dispatch;

/// Routing and invocation errors.
pub mod error;

/// Request/response correlation.
pub mod invocation;

/// Listener registrations and event delivery.
pub mod listener;

/// Member directory.
pub mod membership;

/// Partition table and routing.
pub mod partition;

/// Runtime protocol bodies and op codes.
pub mod protocol;

/// Session wiring.
pub mod runtime;

/// Frame wire format with CRC32C checksums.
pub mod wire;

// =============================================================================
// Public API Re-exports
// =============================================================================

// Connection exports
pub use connection::{
    Connection, ConnectionConfig, ConnectionError, ConnectionId, ConnectionManager, FrameHandler,
};

// Error exports
pub use error::{InvocationError, RoutingError};

// Invocation exports
pub use invocation::{
    InvocationConfig, InvocationRequest, InvocationResponse, InvocationService, Target,
};

// Listener exports
pub use listener::{EventHandlers, ItemEvent, ListenerService};

// Membership exports
pub use membership::{Member, MemberDirectory, MembershipEvent};

// Partition exports
pub use partition::PartitionRouter;

// Protocol exports
pub use protocol::{EventKind, RemoteError};

// Runtime exports
pub use runtime::{ClientRuntime, RuntimeConfig};

// Wire format exports
pub use wire::{Frame, FrameTag, WireError};
