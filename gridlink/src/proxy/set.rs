//! Distributed set proxy.

use std::marker::PhantomData;
use std::sync::Arc;

use gridlink_core::Data;
use gridlink_transport::InvocationError;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::codec::{set_op, ItemRequest, ItemsRequest, NameRequest};
use super::{ItemListener, ProxyCore};

/// A distributed set of `T`.
///
/// Items are compared by their serialized form. Every operation is routed
/// to the member owning the partition of the set name.
pub struct ISet<T> {
    core: Arc<ProxyCore>,
    _item: PhantomData<fn() -> T>,
}

impl<T> Clone for ISet<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            _item: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for ISet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ISet").field(&self.core.name()).finish()
    }
}

impl<T> ISet<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    pub(crate) fn new(core: Arc<ProxyCore>) -> Self {
        Self {
            core,
            _item: PhantomData,
        }
    }

    /// Set name.
    pub fn name(&self) -> &str {
        self.core.name()
    }

    /// The shared proxy core.
    pub fn core(&self) -> &Arc<ProxyCore> {
        &self.core
    }

    fn name_request(&self) -> NameRequest {
        NameRequest {
            name: self.core.name().to_string(),
        }
    }

    fn item_request(&self, item: &T) -> Result<ItemRequest, InvocationError> {
        Ok(ItemRequest {
            name: self.core.name().to_string(),
            item: self.core.to_data(item)?,
        })
    }

    fn items_request(&self, items: &[T]) -> Result<ItemsRequest, InvocationError> {
        Ok(ItemsRequest {
            name: self.core.name().to_string(),
            items: self.core.to_data_all(items)?,
        })
    }

    async fn call<B: Serialize, R: DeserializeOwned>(
        &self,
        op_code: u16,
        body: &B,
        retryable: bool,
    ) -> Result<R, InvocationError> {
        self.core
            .invoke(self.core.object_target(), op_code, body, retryable)
            .await
    }

    /// Add `item`. Returns whether the set changed.
    pub async fn add(&self, item: &T) -> Result<bool, InvocationError> {
        self.call(set_op::ADD, &self.item_request(item)?, false).await
    }

    /// Add every item. Returns whether the set changed.
    pub async fn add_all(&self, items: &[T]) -> Result<bool, InvocationError> {
        self.call(set_op::ADD_ALL, &self.items_request(items)?, false)
            .await
    }

    /// Remove `item`. Returns whether it was present.
    pub async fn remove(&self, item: &T) -> Result<bool, InvocationError> {
        self.call(set_op::REMOVE, &self.item_request(item)?, false)
            .await
    }

    /// Remove every listed item. Returns whether the set changed.
    pub async fn remove_all(&self, items: &[T]) -> Result<bool, InvocationError> {
        self.call(set_op::REMOVE_ALL, &self.items_request(items)?, false)
            .await
    }

    /// Keep only the listed items. Returns whether the set changed.
    pub async fn retain_all(&self, items: &[T]) -> Result<bool, InvocationError> {
        self.call(set_op::RETAIN_ALL, &self.items_request(items)?, false)
            .await
    }

    /// Whether `item` is in the set.
    pub async fn contains(&self, item: &T) -> Result<bool, InvocationError> {
        self.call(set_op::CONTAINS, &self.item_request(item)?, true)
            .await
    }

    /// Whether every listed item is in the set.
    pub async fn contains_all(&self, items: &[T]) -> Result<bool, InvocationError> {
        self.call(set_op::CONTAINS_ALL, &self.items_request(items)?, true)
            .await
    }

    /// Every item, in no particular order.
    pub async fn get_all(&self) -> Result<Vec<T>, InvocationError> {
        let items: Vec<Data> = self
            .call(set_op::GET_ALL, &self.name_request(), true)
            .await?;
        items.iter().map(|data| self.core.to_object(data)).collect()
    }

    /// Number of items.
    pub async fn size(&self) -> Result<usize, InvocationError> {
        self.call(set_op::SIZE, &self.name_request(), true).await
    }

    /// Whether the set has no items.
    pub async fn is_empty(&self) -> Result<bool, InvocationError> {
        self.call(set_op::IS_EMPTY, &self.name_request(), true)
            .await
    }

    /// Remove every item.
    pub async fn clear(&self) -> Result<(), InvocationError> {
        self.call(set_op::CLEAR, &self.name_request(), false).await
    }

    /// Register `listener`; returns the registration id.
    pub async fn add_item_listener(
        &self,
        listener: ItemListener<T>,
    ) -> Result<String, InvocationError> {
        self.core.add_listener(set_op::ADD_LISTENER, listener).await
    }

    /// Cancel a registration. Returns `false` if it was already removed.
    pub async fn remove_item_listener(&self, registration_id: &str) -> Result<bool, InvocationError> {
        self.core.remove_listener(registration_id).await
    }

    /// Release this set's listeners and destroy it cluster-side.
    pub async fn destroy(&self) -> Result<(), InvocationError> {
        self.core.destroy().await
    }
}
