//! The client session.

use std::sync::Arc;

use gridlink_core::{NetworkProvider, TokioNetworkProvider};
use gridlink_transport::{ClientRuntime, Member};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::proxy::codec::{MAP_SERVICE, QUEUE_SERVICE, SET_SERVICE};
use crate::proxy::{IMap, IQueue, ISet, ProxyManager};

/// One client session to a cluster.
///
/// A session owns its member directory, partition table, invocation table
/// and listener registry. Sessions in the same process share nothing.
/// Dropping the session shuts it down.
///
/// ```rust,no_run
/// use gridlink::{ClientConfig, GridClient, NetworkAddress};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ClientConfig::builder()
///     .address(NetworkAddress::parse("127.0.0.1:5701")?)
///     .build()?;
/// let client = GridClient::connect(config).await?;
///
/// let set = client.get_set::<String>("names");
/// set.add(&"ada".to_string()).await?;
/// assert!(set.contains(&"ada".to_string()).await?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct GridClient {
    config: ClientConfig,
    runtime: Arc<ClientRuntime>,
    proxies: ProxyManager,
}

impl GridClient {
    /// Connect over TCP.
    ///
    /// # Errors
    ///
    /// `Bootstrap` if no configured address authenticates or no member
    /// list arrives in time.
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        Self::connect_with(config, Arc::new(TokioNetworkProvider::new())).await
    }

    /// Connect through `network`.
    ///
    /// # Errors
    ///
    /// Same as [`GridClient::connect`].
    pub async fn connect_with(
        config: ClientConfig,
        network: Arc<dyn NetworkProvider>,
    ) -> Result<Self, ClientError> {
        let runtime = Arc::new(ClientRuntime::start(network, config.runtime_config()).await?);
        tracing::info!(
            cluster = %config.cluster_name(),
            client = %config.client_name(),
            "client connected"
        );
        Ok(Self {
            config,
            proxies: ProxyManager::new(runtime.clone()),
            runtime,
        })
    }

    /// Session configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The session runtime, for direct invocations and routing.
    pub fn runtime(&self) -> &Arc<ClientRuntime> {
        &self.runtime
    }

    /// Proxy to the set `name`. No round trip is made.
    pub fn get_set<T>(&self, name: &str) -> ISet<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        ISet::new(self.proxies.core(SET_SERVICE, name))
    }

    /// Proxy to the queue `name`. No round trip is made.
    pub fn get_queue<T>(&self, name: &str) -> IQueue<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        IQueue::new(self.proxies.core(QUEUE_SERVICE, name))
    }

    /// Proxy to the map `name`. No round trip is made.
    pub fn get_map<K, V>(&self, name: &str) -> IMap<K, V>
    where
        K: Serialize + DeserializeOwned,
        V: Serialize + DeserializeOwned,
    {
        IMap::new(self.proxies.core(MAP_SERVICE, name))
    }

    /// Number of cached proxies.
    pub fn proxy_count(&self) -> usize {
        self.proxies.len()
    }

    /// Current members, oldest first.
    pub fn members(&self) -> Vec<Member> {
        self.runtime.directory().snapshot().members.clone()
    }

    /// Fail pending invocations and close every connection.
    pub fn shutdown(&self) {
        self.runtime.shutdown();
    }
}

impl Drop for GridClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}
