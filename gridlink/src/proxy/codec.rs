//! Op codes and request bodies of the distributed object services.
//!
//! Values travel as serialized [`Data`]; the member compares them by their
//! bytes. Response bodies are plain JSON values (`bool`, `usize`,
//! `Option<Data>`, `Vec<Data>`, a registration id `String`, or `null`).

use gridlink_core::Data;
use serde::{Deserialize, Serialize};

/// Service name of sets.
pub const SET_SERVICE: &str = "gridlink:set";
/// Service name of queues.
pub const QUEUE_SERVICE: &str = "gridlink:queue";
/// Service name of maps.
pub const MAP_SERVICE: &str = "gridlink:map";

/// Map op codes.
pub mod map_op {
    /// [`KeyValueRequest`](super::KeyValueRequest) → previous `Option<Data>`.
    pub const PUT: u16 = 0x0101;
    /// [`KeyRequest`](super::KeyRequest) → `Option<Data>`.
    pub const GET: u16 = 0x0102;
    /// [`KeyRequest`](super::KeyRequest) → removed `Option<Data>`.
    pub const REMOVE: u16 = 0x0103;
    /// [`KeyRequest`](super::KeyRequest) → `bool`.
    pub const CONTAINS_KEY: u16 = 0x0104;
    /// [`NameRequest`](super::NameRequest) → `usize`.
    pub const SIZE: u16 = 0x0105;
    /// [`NameRequest`](super::NameRequest) → `null`.
    pub const CLEAR: u16 = 0x0106;
}

/// Queue op codes.
pub mod queue_op {
    /// [`ItemRequest`](super::ItemRequest) → `bool`.
    pub const OFFER: u16 = 0x0301;
    /// [`NameRequest`](super::NameRequest) → `Option<Data>`.
    pub const POLL: u16 = 0x0302;
    /// [`NameRequest`](super::NameRequest) → `Option<Data>`.
    pub const PEEK: u16 = 0x0303;
    /// [`NameRequest`](super::NameRequest) → `usize`.
    pub const SIZE: u16 = 0x0304;
    /// [`NameRequest`](super::NameRequest) → `null`.
    pub const CLEAR: u16 = 0x0305;
    /// [`ListenerRequest`](super::ListenerRequest) → registration id.
    pub const ADD_LISTENER: u16 = 0x0306;
}

/// Set op codes.
pub mod set_op {
    /// [`NameRequest`](super::NameRequest) → `usize`.
    pub const SIZE: u16 = 0x0601;
    /// [`ItemRequest`](super::ItemRequest) → `bool`.
    pub const CONTAINS: u16 = 0x0602;
    /// [`ItemsRequest`](super::ItemsRequest) → `bool`.
    pub const CONTAINS_ALL: u16 = 0x0603;
    /// [`ItemRequest`](super::ItemRequest) → `bool`, whether the set changed.
    pub const ADD: u16 = 0x0604;
    /// [`ItemRequest`](super::ItemRequest) → `bool`, whether the set changed.
    pub const REMOVE: u16 = 0x0605;
    /// [`ItemsRequest`](super::ItemsRequest) → `bool`, whether the set changed.
    pub const ADD_ALL: u16 = 0x0606;
    /// [`ItemsRequest`](super::ItemsRequest) → `bool`, whether the set changed.
    pub const REMOVE_ALL: u16 = 0x0607;
    /// [`ItemsRequest`](super::ItemsRequest) → `bool`, whether the set changed.
    pub const RETAIN_ALL: u16 = 0x0608;
    /// [`NameRequest`](super::NameRequest) → `null`.
    pub const CLEAR: u16 = 0x0609;
    /// [`NameRequest`](super::NameRequest) → `Vec<Data>`.
    pub const GET_ALL: u16 = 0x060A;
    /// [`ListenerRequest`](super::ListenerRequest) → registration id.
    pub const ADD_LISTENER: u16 = 0x060B;
    /// [`NameRequest`](super::NameRequest) → `bool`.
    pub const IS_EMPTY: u16 = 0x060D;
}

/// Request naming only the object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRequest {
    /// Object name.
    pub name: String,
}

/// Request carrying one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRequest {
    /// Object name.
    pub name: String,
    /// Serialized item.
    pub item: Data,
}

/// Request carrying several items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemsRequest {
    /// Object name.
    pub name: String,
    /// Serialized items.
    pub items: Vec<Data>,
}

/// Request carrying a map key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRequest {
    /// Object name.
    pub name: String,
    /// Serialized key.
    pub key: Data,
}

/// Request carrying a map entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValueRequest {
    /// Object name.
    pub name: String,
    /// Serialized key.
    pub key: Data,
    /// Serialized value.
    pub value: Data,
}

/// Item listener registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerRequest {
    /// Object name.
    pub name: String,
    /// Whether events carry the item.
    pub include_value: bool,
}
