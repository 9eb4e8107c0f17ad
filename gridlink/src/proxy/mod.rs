//! Distributed object proxies.
//!
//! Every typed proxy is a thin encode/decode layer over one [`ProxyCore`],
//! which owns the object's identity and talks to the session runtime.
//!
//! ```text
//!  ISet<T> ─┐
//!  IQueue<T>├──► ProxyCore ──► InvocationService ──► member
//!  IMap<K,V>┘        │
//!                    └──────► ListenerService (owned registrations)
//! ```
//!
//! Cores are cached per (service, name) by the [`ProxyManager`]: two
//! `get_set("a")` calls share one core and its listener bookkeeping.
//! `destroy()` evicts the core, so a later `get_*` starts afresh.

pub mod codec;
mod listener;
mod map;
mod queue;
mod set;

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use gridlink_core::{Data, Serializer};
use gridlink_transport::protocol::{self, op, DestroyProxyRequest};
use gridlink_transport::{ClientRuntime, InvocationError, InvocationRequest, Target};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use self::codec::ListenerRequest;

pub use listener::{ItemListener, ItemNotification};
pub use map::IMap;
pub use queue::IQueue;
pub use set::ISet;

type ProxyKey = (&'static str, String);
type ProxyCache = DashMap<ProxyKey, Arc<ProxyCore>>;

/// Shared state of every proxy to one distributed object.
pub struct ProxyCore {
    service: &'static str,
    name: String,
    runtime: Arc<ClientRuntime>,
    serializer: Serializer,
    registrations: Mutex<Vec<String>>,
    cache: Weak<ProxyCache>,
}

impl std::fmt::Debug for ProxyCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyCore")
            .field("service", &self.service)
            .field("name", &self.name)
            .field("registrations", &self.registrations.lock().len())
            .finish()
    }
}

impl ProxyCore {
    /// Object name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Service that owns the object.
    pub fn service_name(&self) -> &'static str {
        self.service
    }

    /// Listener registrations made through this object's proxies and not
    /// yet removed.
    pub fn registrations(&self) -> Vec<String> {
        self.registrations.lock().clone()
    }

    /// Routing target of operations addressed to the whole object.
    pub(crate) fn object_target(&self) -> Target {
        Target::Key(self.name.as_bytes().to_vec())
    }

    pub(crate) fn to_data<T: Serialize + ?Sized>(&self, value: &T) -> Result<Data, InvocationError> {
        Ok(self.serializer.to_data(value)?)
    }

    pub(crate) fn to_data_all<T: Serialize>(&self, values: &[T]) -> Result<Vec<Data>, InvocationError> {
        values.iter().map(|value| self.to_data(value)).collect()
    }

    pub(crate) fn to_object<T: DeserializeOwned>(&self, data: &Data) -> Result<T, InvocationError> {
        Ok(self.serializer.to_object(data)?)
    }

    pub(crate) fn to_object_opt<T: DeserializeOwned>(
        &self,
        data: Option<Data>,
    ) -> Result<Option<T>, InvocationError> {
        data.map(|data| self.to_object(&data)).transpose()
    }

    /// Encode `body`, invoke it and decode the response.
    pub(crate) async fn invoke<B, R>(
        &self,
        target: Target,
        op_code: u16,
        body: &B,
        retryable: bool,
    ) -> Result<R, InvocationError>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let payload = protocol::encode_body(body)?;
        let request = InvocationRequest::new(target, op_code, payload).retryable(retryable);
        let response = self.runtime.invocations().invoke(request).await?;
        response.decode()
    }

    pub(crate) async fn add_listener<T>(
        &self,
        op_code: u16,
        listener: ItemListener<T>,
    ) -> Result<String, InvocationError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let body = protocol::encode_body(&ListenerRequest {
            name: self.name.clone(),
            include_value: listener.wants_values(),
        })?;
        let request = InvocationRequest::new(self.object_target(), op_code, body);
        let handlers = listener.into_handlers(self.serializer.clone());

        let id = self
            .runtime
            .listeners()
            .register(&self.name, request, handlers)
            .await?;
        self.registrations.lock().push(id.clone());
        Ok(id)
    }

    pub(crate) async fn remove_listener(&self, registration_id: &str) -> Result<bool, InvocationError> {
        let removed = self.runtime.listeners().unregister(registration_id).await?;
        self.registrations.lock().retain(|id| id != registration_id);
        Ok(removed)
    }

    /// Release owned listeners, destroy the object cluster-side and evict
    /// this core from the cache.
    ///
    /// In-flight invocations on the object are not cancelled.
    pub(crate) async fn destroy(&self) -> Result<(), InvocationError> {
        let owned = std::mem::take(&mut *self.registrations.lock());
        for id in owned {
            if let Err(e) = self.runtime.listeners().unregister(&id).await {
                // Nothing tracks the id after this point; stop its callbacks.
                tracing::warn!("destroy {}: could not remove listener {}: {}", self.name, id, e);
                self.runtime.listeners().registry().remove(&id);
            }
        }

        let request = DestroyProxyRequest {
            service_name: self.service.to_string(),
            object_name: self.name.clone(),
        };
        let result: Result<(), InvocationError> = self
            .invoke(Target::Coordinator, op::DESTROY_PROXY, &request, true)
            .await;

        if let Some(cache) = self.cache.upgrade() {
            cache.remove_if(&(self.service, self.name.clone()), |_, core| {
                std::ptr::eq(Arc::as_ptr(core), self)
            });
        }
        tracing::debug!("proxy {}/{} destroyed", self.service, self.name);
        result
    }
}

/// Cache of proxy cores of one client session.
#[derive(Debug)]
pub(crate) struct ProxyManager {
    runtime: Arc<ClientRuntime>,
    proxies: Arc<ProxyCache>,
}

impl ProxyManager {
    pub(crate) fn new(runtime: Arc<ClientRuntime>) -> Self {
        Self {
            runtime,
            proxies: Arc::new(DashMap::new()),
        }
    }

    /// The cached core for (service, name), created on first use.
    pub(crate) fn core(&self, service: &'static str, name: &str) -> Arc<ProxyCore> {
        self.proxies
            .entry((service, name.to_string()))
            .or_insert_with(|| {
                tracing::debug!("creating proxy {}/{}", service, name);
                Arc::new(ProxyCore {
                    service,
                    name: name.to_string(),
                    runtime: self.runtime.clone(),
                    serializer: Serializer::default(),
                    registrations: Mutex::new(Vec::new()),
                    cache: Arc::downgrade(&self.proxies),
                })
            })
            .value()
            .clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.proxies.len()
    }
}
