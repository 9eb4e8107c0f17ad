//! Distributed map proxy.

use std::marker::PhantomData;
use std::sync::Arc;

use gridlink_core::Data;
use gridlink_transport::{InvocationError, Target};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::codec::{map_op, KeyRequest, KeyValueRequest, NameRequest};
use super::ProxyCore;

/// A distributed map from `K` to `V`.
///
/// Entry operations go to the owner of the key's partition; `size` and
/// `clear` go to the oldest member, which answers for the whole map.
pub struct IMap<K, V> {
    core: Arc<ProxyCore>,
    _entry: PhantomData<fn() -> (K, V)>,
}

impl<K, V> Clone for IMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            _entry: PhantomData,
        }
    }
}

impl<K, V> std::fmt::Debug for IMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("IMap").field(&self.core.name()).finish()
    }
}

impl<K, V> IMap<K, V>
where
    K: Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    pub(crate) fn new(core: Arc<ProxyCore>) -> Self {
        Self {
            core,
            _entry: PhantomData,
        }
    }

    /// Map name.
    pub fn name(&self) -> &str {
        self.core.name()
    }

    /// The shared proxy core.
    pub fn core(&self) -> &Arc<ProxyCore> {
        &self.core
    }

    fn key_request(&self, key: &K) -> Result<(Target, KeyRequest), InvocationError> {
        let key = self.core.to_data(key)?;
        let target = Target::Key(key.bytes().to_vec());
        Ok((
            target,
            KeyRequest {
                name: self.core.name().to_string(),
                key,
            },
        ))
    }

    fn name_request(&self) -> NameRequest {
        NameRequest {
            name: self.core.name().to_string(),
        }
    }

    /// Associate `value` with `key`; returns the previous value.
    pub async fn put(&self, key: &K, value: &V) -> Result<Option<V>, InvocationError> {
        let key = self.core.to_data(key)?;
        let target = Target::Key(key.bytes().to_vec());
        let request = KeyValueRequest {
            name: self.core.name().to_string(),
            key,
            value: self.core.to_data(value)?,
        };
        let previous: Option<Data> = self.core.invoke(target, map_op::PUT, &request, false).await?;
        self.core.to_object_opt(previous)
    }

    /// Value associated with `key`.
    pub async fn get(&self, key: &K) -> Result<Option<V>, InvocationError> {
        let (target, request) = self.key_request(key)?;
        let value: Option<Data> = self.core.invoke(target, map_op::GET, &request, true).await?;
        self.core.to_object_opt(value)
    }

    /// Remove `key`; returns the value it had.
    pub async fn remove(&self, key: &K) -> Result<Option<V>, InvocationError> {
        let (target, request) = self.key_request(key)?;
        let value: Option<Data> = self
            .core
            .invoke(target, map_op::REMOVE, &request, false)
            .await?;
        self.core.to_object_opt(value)
    }

    /// Whether `key` has a value.
    pub async fn contains_key(&self, key: &K) -> Result<bool, InvocationError> {
        let (target, request) = self.key_request(key)?;
        self.core
            .invoke(target, map_op::CONTAINS_KEY, &request, true)
            .await
    }

    /// Number of entries.
    pub async fn size(&self) -> Result<usize, InvocationError> {
        self.core
            .invoke(Target::Coordinator, map_op::SIZE, &self.name_request(), true)
            .await
    }

    /// Whether the map has no entries.
    pub async fn is_empty(&self) -> Result<bool, InvocationError> {
        Ok(self.size().await? == 0)
    }

    /// Remove every entry.
    pub async fn clear(&self) -> Result<(), InvocationError> {
        self.core
            .invoke(Target::Coordinator, map_op::CLEAR, &self.name_request(), false)
            .await
    }

    /// Destroy the map cluster-side.
    pub async fn destroy(&self) -> Result<(), InvocationError> {
        self.core.destroy().await
    }
}
