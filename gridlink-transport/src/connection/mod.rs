//! Connections to cluster members.
//!
//! A [`Connection`] owns one stream to one member. It runs two background
//! tasks: a writer draining the outbound queue and a reader that decodes
//! frames and hands each one to a [`FrameHandler`]. The reader never runs
//! user code; the handler only touches concurrent tables and channels.
//!
//! The [`ConnectionManager`] keeps at most one live connection per member,
//! opens connections lazily on first need and reconnects dropped ones in the
//! background.
//!
//! # Connection Lifecycle
//!
//! ```text
//!                 connect + AUTHENTICATE
//!  ┌──────────┐ ─────────────────────────► ┌───────────┐
//!  │  Absent  │                            │ Connected │
//!  └──────────┘ ◄──────────────────────────┤           │
//!       ▲  ▲        member left            └─────┬─────┘
//!       │  │                                     │ EOF / wire error
//!       │  │  success                            ▼
//!       │  │                             ┌──────────────┐
//!       │  └─────────────────────────────┤ Reconnecting │──┐ failure
//!       │          member left           │ (backoff)    │◄─┘ (delay x2)
//!       └────────────────────────────────┴──────┬───────┘
//!                                               │ max failures
//!                                               ▼
//!                                        ┌─────────────┐
//!                                        │ Unreachable │
//!                                        └─────────────┘
//! ```
//!
//! # Backoff Strategy
//!
//! - Initial delay: configurable (default 100ms)
//! - Maximum delay: configurable (default 30s)
//! - Exponential growth with jitter of up to half the current delay

/// Configuration for connection behavior.
pub mod config;

/// Single connection with reader and writer tasks.
pub mod core;

/// Error types for connection operations.
pub mod error;

/// One-connection-per-member bookkeeping and reconnection.
pub mod manager;

pub use self::config::ConnectionConfig;
pub use self::core::{Connection, ConnectionId, FrameHandler};
pub use self::error::{ConnectionError, ConnectionResult};
pub use self::manager::ConnectionManager;
