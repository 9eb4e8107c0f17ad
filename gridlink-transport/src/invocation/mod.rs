//! Request/response correlation.
//!
//! [`InvocationService::invoke`] picks a member for the request target,
//! assigns a fresh correlation id, stores a pending record in the
//! [`InvocationTable`] and writes the request. The connection reader
//! resolves the record when the matching response arrives.

/// Invocation service with retry and deadline handling.
pub mod service;

/// Concurrent table of pending invocations.
pub mod table;

pub use service::{
    InvocationConfig, InvocationRequest, InvocationResponse, InvocationService, Target,
};
pub use table::{InvocationOutcome, InvocationTable, PendingInvocation, ResponseHook};
