//! Core identity and addressing types.
//!
//! - [`MemberId`]: 128-bit identifier the cluster assigns to each member
//! - [`NetworkAddress`]: IP address + port of a member
//! - [`CorrelationId`]: client-generated id linking a request to its response

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// 128-bit cluster member identifier.
///
/// Assigned by the member itself and reported during authentication and in
/// every member list.
///
/// # Examples
///
/// ```
/// use gridlink_core::MemberId;
///
/// let id = MemberId::new(0x1, 0x2);
/// assert!(id.is_valid());
/// assert_eq!(id.to_string(), "00000000000000010000000000000002");
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct MemberId {
    /// Most significant 64 bits.
    pub first: u64,
    /// Least significant 64 bits.
    pub second: u64,
}

impl MemberId {
    /// Create a member id with explicit values.
    pub const fn new(first: u64, second: u64) -> Self {
        Self { first, second }
    }

    /// Check if the id is valid (non-zero).
    pub const fn is_valid(&self) -> bool {
        self.first != 0 || self.second != 0
    }
}

impl std::fmt::Display for MemberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}{:016x}", self.first, self.second)
    }
}

/// Correlation id of an outbound request.
///
/// Monotonically assigned per client session and never reused while the
/// request is pending. Id 0 is reserved for the authentication handshake.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct CorrelationId(u64);

impl CorrelationId {
    /// Correlation id used by the authentication handshake.
    pub const HANDSHAKE: CorrelationId = CorrelationId(0);

    /// Wrap a raw correlation id.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw value as carried on the wire.
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Network address of a cluster member (IPv4/IPv6 + port).
///
/// # Examples
///
/// ```
/// use gridlink_core::NetworkAddress;
///
/// let addr = NetworkAddress::parse("127.0.0.1:5701").expect("valid address");
/// assert_eq!(addr.port, 5701);
/// assert_eq!(addr.to_string(), "127.0.0.1:5701");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkAddress {
    /// IP address (IPv4 or IPv6).
    pub ip: IpAddr,
    /// Port number.
    pub port: u16,
}

impl NetworkAddress {
    /// Create a new network address.
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Parse from string "ip:port" format.
    ///
    /// Supports both IPv4 (`127.0.0.1:5701`) and IPv6 (`[::1]:5701`) notation.
    ///
    /// # Errors
    ///
    /// Returns error if IP or port cannot be parsed.
    pub fn parse(s: &str) -> Result<Self, NetworkAddressParseError> {
        let (ip_str, port_str) = if let Some(bracket_end) = s.rfind(']') {
            if !s.starts_with('[') {
                return Err(NetworkAddressParseError::InvalidIp);
            }
            let port_str = s
                .get(bracket_end + 2..)
                .ok_or(NetworkAddressParseError::MissingPort)?;
            (&s[1..bracket_end], port_str)
        } else {
            s.rsplit_once(':')
                .ok_or(NetworkAddressParseError::MissingPort)?
        };

        let ip: IpAddr = ip_str
            .parse()
            .map_err(|_| NetworkAddressParseError::InvalidIp)?;
        let port: u16 = port_str
            .parse()
            .map_err(|_| NetworkAddressParseError::InvalidPort)?;
        Ok(Self::new(ip, port))
    }
}

impl std::fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.ip {
            IpAddr::V4(ip) => write!(f, "{}:{}", ip, self.port),
            IpAddr::V6(ip) => write!(f, "[{}]:{}", ip, self.port),
        }
    }
}

impl std::str::FromStr for NetworkAddress {
    type Err = NetworkAddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Error parsing a network address from string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkAddressParseError {
    /// The IP address could not be parsed.
    #[error("invalid IP address")]
    InvalidIp,
    /// The port number could not be parsed.
    #[error("invalid port number")]
    InvalidPort,
    /// The port separator is missing.
    #[error("missing port")]
    MissingPort,
}
