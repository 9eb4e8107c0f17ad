//! Network provider abstraction.
//!
//! Connections only need a bidirectional byte stream to a member address.
//! The trait lets the runtime dial real TCP sockets in production and
//! in-memory streams in tests.

use std::fmt;
use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::NetworkAddress;

/// A bidirectional byte stream usable by a connection.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

/// Type-erased stream returned by [`NetworkProvider::connect`].
pub type BoxedStream = Box<dyn AsyncStream>;

/// Provider trait for opening connections to cluster members.
///
/// Shared by every connection of a client session, so implementations must
/// be `Send + Sync`.
#[async_trait]
pub trait NetworkProvider: fmt::Debug + Send + Sync + 'static {
    /// Connect to a remote address.
    async fn connect(&self, address: &NetworkAddress) -> io::Result<BoxedStream>;
}

/// Real Tokio TCP networking implementation.
#[derive(Debug, Clone, Default)]
pub struct TokioNetworkProvider;

impl TokioNetworkProvider {
    /// Create a new Tokio network provider.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NetworkProvider for TokioNetworkProvider {
    async fn connect(&self, address: &NetworkAddress) -> io::Result<BoxedStream> {
        let stream = tokio::net::TcpStream::connect((address.ip, address.port)).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}
