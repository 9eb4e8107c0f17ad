//! # gridlink-core
//!
//! Core abstractions shared by the gridlink client runtime.
//!
//! - **Core types**: [`MemberId`], [`NetworkAddress`], [`CorrelationId`]
//! - **Network seam**: [`NetworkProvider`] so connections can run over real
//!   TCP ([`TokioNetworkProvider`]) or in-memory streams in tests
//! - **Codecs**: [`MessageCodec`] for frame bodies and [`Serializer`] for
//!   user values carried as type-tagged [`Data`]

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod codec;
mod network;
mod types;

// Codec exports
pub use codec::{CodecError, Data, JsonCodec, MessageCodec, Serializer, JSON_TYPE_ID};

// Network exports
pub use network::{AsyncStream, BoxedStream, NetworkProvider, TokioNetworkProvider};

// Core type exports
pub use types::{CorrelationId, MemberId, NetworkAddress, NetworkAddressParseError};
