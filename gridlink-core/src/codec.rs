//! Pluggable serialization.
//!
//! Two layers share the [`MessageCodec`] trait:
//!
//! - frame bodies of the runtime protocol (authentication, cluster events,
//!   listener messages) are encoded with a codec directly;
//! - user values stored in distributed objects go through a [`Serializer`],
//!   which wraps the encoded bytes in a [`Data`] tagged with the codec's type
//!   id so members can compare items without knowing their Rust type.
//!
//! # Example
//!
//! ```rust
//! use gridlink_core::{JsonCodec, Serializer};
//!
//! let serializer = Serializer::new(JsonCodec);
//! let data = serializer.to_data(&"item-1").expect("encode");
//! assert_eq!(data.type_id(), gridlink_core::JSON_TYPE_ID);
//!
//! let back: String = serializer.to_object(&data).expect("decode");
//! assert_eq!(back, "item-1");
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Type id stamped on [`Data`] produced by [`JsonCodec`].
pub const JSON_TYPE_ID: i32 = -130;

/// Error type for codec operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Failed to encode a value to bytes.
    #[error("encode error: {0}")]
    Encode(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// Failed to decode bytes to a value.
    #[error("decode error: {0}")]
    Decode(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// The payload was written by a codec with another type id.
    #[error("type id mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Type id of the local codec.
        expected: i32,
        /// Type id carried by the payload.
        found: i32,
    },
}

/// Pluggable serialization format.
///
/// Codec instances are shared by every connection and proxy of a session,
/// hence `Send + Sync`.
pub trait MessageCodec: Clone + Send + Sync + 'static {
    /// Type id stamped on [`Data`] produced with this codec.
    fn type_id(&self) -> i32;

    /// Encode a serializable value to bytes.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Encode` if serialization fails.
    fn encode<T: Serialize + ?Sized>(&self, msg: &T) -> Result<Vec<u8>, CodecError>;

    /// Decode bytes to a deserializable value.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Decode` if deserialization fails.
    fn decode<T: DeserializeOwned>(&self, buf: &[u8]) -> Result<T, CodecError>;
}

/// JSON codec using serde_json.
///
/// ```rust
/// use gridlink_core::{MessageCodec, JsonCodec};
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Serialize, Deserialize, PartialEq, Debug)]
/// struct Ping { seq: u32 }
///
/// let bytes = JsonCodec.encode(&Ping { seq: 1 }).expect("encode");
/// assert_eq!(&bytes, br#"{"seq":1}"#);
/// ```
#[derive(Clone, Default, Debug, Copy)]
pub struct JsonCodec;

impl MessageCodec for JsonCodec {
    fn type_id(&self) -> i32 {
        JSON_TYPE_ID
    }

    fn encode<T: Serialize + ?Sized>(&self, msg: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(msg).map_err(|e| CodecError::Encode(Box::new(e)))
    }

    fn decode<T: DeserializeOwned>(&self, buf: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(buf).map_err(|e| CodecError::Decode(Box::new(e)))
    }
}

/// Serialized user value: the bytes plus the type id of the codec that
/// produced them.
///
/// Members store and compare items as `Data`, so two values are the same
/// item exactly when their `Data` are equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Data {
    type_id: i32,
    bytes: Vec<u8>,
}

impl Data {
    /// Wrap already-encoded bytes.
    pub fn new(type_id: i32, bytes: Vec<u8>) -> Self {
        Self { type_id, bytes }
    }

    /// Type id of the codec that produced the bytes.
    pub fn type_id(&self) -> i32 {
        self.type_id
    }

    /// Encoded bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Converts user values to and from [`Data`].
#[derive(Debug, Clone, Default)]
pub struct Serializer<C: MessageCodec = JsonCodec> {
    codec: C,
}

impl<C: MessageCodec> Serializer<C> {
    /// Create a serializer over the given codec.
    pub fn new(codec: C) -> Self {
        Self { codec }
    }

    /// Serialize a value.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Encode` if the codec rejects the value.
    pub fn to_data<T: Serialize + ?Sized>(&self, value: &T) -> Result<Data, CodecError> {
        let bytes = self.codec.encode(value)?;
        Ok(Data::new(self.codec.type_id(), bytes))
    }

    /// Deserialize a value.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::TypeMismatch` if `data` was not produced by this
    /// codec, `CodecError::Decode` if the bytes do not decode to `T`.
    pub fn to_object<T: DeserializeOwned>(&self, data: &Data) -> Result<T, CodecError> {
        if data.type_id != self.codec.type_id() {
            return Err(CodecError::TypeMismatch {
                expected: self.codec.type_id(),
                found: data.type_id,
            });
        }
        self.codec.decode(&data.bytes)
    }
}
