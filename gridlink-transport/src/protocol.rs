//! Runtime protocol bodies.
//!
//! Bodies exchanged by the runtime itself, independent of any distributed
//! object type. All bodies are JSON encoded with [`JsonCodec`]; values stored
//! in distributed objects travel inside them as [`Data`].

use gridlink_core::{CodecError, Data, JsonCodec, MemberId, MessageCodec, NetworkAddress};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Runtime op codes. Object-specific codes start at `0x0100`.
pub mod op {
    /// Handshake sent on every new connection.
    pub const AUTHENTICATE: u16 = 0x0001;
    /// Cancel a listener registration on its owning member.
    pub const REMOVE_LISTENER: u16 = 0x0002;
    /// Destroy a distributed object cluster-side.
    pub const DESTROY_PROXY: u16 = 0x0003;
}

/// Encode a protocol body.
pub fn encode_body<T: Serialize + ?Sized>(body: &T) -> Result<Vec<u8>, CodecError> {
    JsonCodec.encode(body)
}

/// Decode a protocol body.
pub fn decode_body<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    JsonCodec.decode(bytes)
}

/// `AUTHENTICATE` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequest {
    /// Cluster the client expects to join.
    pub cluster_name: String,
    /// Free-form client name, logged by members.
    pub client_name: String,
}

/// `AUTHENTICATE` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    /// Id of the member that accepted the connection.
    pub member_id: MemberId,
    /// Address the member advertises.
    pub address: NetworkAddress,
    /// Fixed number of partitions of the cluster.
    pub partition_count: u32,
}

/// Error reported by a member in a response flagged as error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{class_name}: {message}")]
pub struct RemoteError {
    /// Server-side error class.
    pub class_name: String,
    /// Human-readable message.
    pub message: String,
}

/// A member as listed in a member-list event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    /// Member id.
    pub id: MemberId,
    /// Address to connect to.
    pub address: NetworkAddress,
    /// Partition-table version the member last acknowledged.
    #[serde(default)]
    pub partition_version: u64,
}

/// Body of a membership-update frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterEvent {
    /// Full member list, oldest member first.
    MemberList {
        /// Monotonic member-list version.
        version: u64,
        /// Members in join order.
        members: Vec<MemberInfo>,
    },
    /// Full partition table.
    PartitionTable {
        /// Monotonic partition-table version.
        version: u64,
        /// Owner per partition index.
        owners: Vec<Option<MemberId>>,
    },
}

/// Kind of an item event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// An item was added to the collection.
    ItemAdded,
    /// An item was removed from the collection.
    ItemRemoved,
}

/// Body of an event frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMessage {
    /// Registration the event belongs to.
    pub registration_id: String,
    /// Event kind.
    pub kind: EventKind,
    /// Item, absent when the listener was registered without values.
    pub item: Option<Data>,
    /// Member where the change happened.
    pub member: MemberId,
}

/// `REMOVE_LISTENER` request. The response body is a `bool`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveListenerRequest {
    /// Object the registration listens to.
    pub object_name: String,
    /// Registration to cancel.
    pub registration_id: String,
}

/// `DESTROY_PROXY` request. The response body is `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestroyProxyRequest {
    /// Service that owns the object.
    pub service_name: String,
    /// Object name.
    pub object_name: String,
}
