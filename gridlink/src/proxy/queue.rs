//! Distributed queue proxy.

use std::marker::PhantomData;
use std::sync::Arc;

use gridlink_core::Data;
use gridlink_transport::InvocationError;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::codec::{queue_op, ItemRequest, NameRequest};
use super::{ItemListener, ProxyCore};

/// A distributed FIFO queue of `T`.
pub struct IQueue<T> {
    core: Arc<ProxyCore>,
    _item: PhantomData<fn() -> T>,
}

impl<T> Clone for IQueue<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            _item: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for IQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("IQueue").field(&self.core.name()).finish()
    }
}

impl<T> IQueue<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    pub(crate) fn new(core: Arc<ProxyCore>) -> Self {
        Self {
            core,
            _item: PhantomData,
        }
    }

    /// Queue name.
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

    /// Append `item`. Returns false if the queue is full.
    pub async fn offer(&self, item: &T) -> Result<bool, InvocationError> {
        let request = ItemRequest {
            name: self.core.name().to_string(),
            item: self.core.to_data(item)?,
        };
        self.call(queue_op::OFFER, &request, false).await
    }

    /// Take the head item, if any.
    pub async fn poll(&self) -> Result<Option<T>, InvocationError> {
        let head: Option<Data> = self.call(queue_op::POLL, &self.name_request(), false).await?;
        self.core.to_object_opt(head)
    }

    /// Read the head item without taking it.
    pub async fn peek(&self) -> Result<Option<T>, InvocationError> {
        let head: Option<Data> = self.call(queue_op::PEEK, &self.name_request(), true).await?;
        self.core.to_object_opt(head)
    }

    /// Number of items.
    pub async fn size(&self) -> Result<usize, InvocationError> {
        self.call(queue_op::SIZE, &self.name_request(), true).await
    }

    /// Whether the queue has no items.
    pub async fn is_empty(&self) -> Result<bool, InvocationError> {
        Ok(self.size().await? == 0)
    }

    /// Remove every item.
    pub async fn clear(&self) -> Result<(), InvocationError> {
        self.call(queue_op::CLEAR, &self.name_request(), false).await
    }

    /// Register `listener`; returns the registration id.
    pub async fn add_item_listener(
        &self,
        listener: ItemListener<T>,
    ) -> Result<String, InvocationError> {
        self.core.add_listener(queue_op::ADD_LISTENER, listener).await
    }

    /// Cancel a registration. Returns `false` if it was already removed.
    pub async fn remove_item_listener(&self, registration_id: &str) -> Result<bool, InvocationError> {
        self.core.remove_listener(registration_id).await
    }

    /// Release this queue's listeners and destroy it cluster-side.
    pub async fn destroy(&self) -> Result<(), InvocationError> {
        self.core.destroy().await
    }
}
