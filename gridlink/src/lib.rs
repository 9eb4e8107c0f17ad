//! # gridlink
//!
//! Client runtime for the distributed objects of an in-memory data grid.
//!
//! A [`GridClient`] connects to cluster members, hands out typed proxies for
//! distributed collections and receives server-pushed item events. Each
//! proxy is a thin encode/decode layer over one shared runtime.
//!
//! ## Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              gridlink (this crate)                          │
//! │   GridClient session, ClientConfig, ISet / IQueue / IMap    │
//! ├─────────────────────────────────────────────────────────────┤
//! │              gridlink-transport                             │
//! │  • Wire format          • Member directory                  │
//! │  • Connections          • Partition router                  │
//! │  • Invocation service   • Listener registry                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │              gridlink-core                                  │
//! │  NetworkProvider seam, Serializer / Data, core types        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gridlink::{ClientConfig, GridClient, ItemListener, NetworkAddress};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = GridClient::connect(
//!     ClientConfig::builder()
//!         .cluster_name("dev")
//!         .address(NetworkAddress::parse("127.0.0.1:5701")?)
//!         .build()?,
//! )
//! .await?;
//!
//! let set = client.get_set::<i64>("numbers");
//! let registration = set
//!     .add_item_listener(ItemListener::<i64>::new().on_item_added(|e| println!("{:?}", e.item)))
//!     .await?;
//! set.add_all(&[1, 2, 3]).await?;
//! set.remove_item_listener(&registration).await?;
//! set.destroy().await?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

// Re-export the runtime for direct invocations
pub use gridlink_core::{Data, MemberId, NetworkAddress, NetworkProvider, Serializer};
pub use gridlink_transport::{
    ConnectionConfig, ConnectionError, InvocationError, InvocationRequest, InvocationResponse,
    Member, RemoteError, Target,
};

// =============================================================================
// Modules
// =============================================================================

/// Client session.
pub mod client;

/// Client configuration and its builder.
pub mod config;

/// Session errors.
pub mod error;

/// Distributed object proxies.
pub mod proxy;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use client::GridClient;
pub use config::{ClientConfig, ClientConfigBuilder, ConfigError};
pub use error::ClientError;
pub use proxy::{IMap, IQueue, ISet, ItemListener, ItemNotification, ProxyCore};
