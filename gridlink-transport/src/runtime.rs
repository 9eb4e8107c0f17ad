//! Wiring of one client session.
//!
//! ```text
//!            ┌──────────────────────── ClientRuntime ───────────────────────┐
//!            │                                                              │
//!  invoke ──►│ InvocationService ──► PartitionRouter / MemberDirectory      │
//!            │        │                                                     │
//!            │        ▼                                                     │
//!            │ ConnectionManager ──► Connection ──► writer task ──► member  │
//!            │                           │                                  │
//!            │                      reader task ──► Dispatcher ──┬─► InvocationTable
//!            │                                                   ├─► ListenerRegistry
//!            │                                                   └─► MemberDirectory / PartitionRouter
//!            └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every component is owned by the runtime; nothing is process-global, so
//! several sessions can coexist in one process.

use std::sync::Arc;

use gridlink_core::{NetworkAddress, NetworkProvider};

use crate::connection::{ConnectionConfig, ConnectionError, ConnectionManager, ConnectionResult};
use crate::dispatch::Dispatcher;
use crate::invocation::{InvocationConfig, InvocationService, InvocationTable};
use crate::listener::{ListenerRegistry, ListenerService};
use crate::membership::MemberDirectory;
use crate::partition::PartitionRouter;
use crate::protocol::AuthRequest;

/// Settings for [`ClientRuntime::start`].
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Cluster to join.
    pub cluster_name: String,
    /// Name reported to members.
    pub client_name: String,
    /// Bootstrap addresses, tried in order.
    pub addresses: Vec<NetworkAddress>,
    /// Connection settings.
    pub connection: ConnectionConfig,
    /// Invocation settings.
    pub invocation: InvocationConfig,
}

/// The runtime of one client session.
#[derive(Debug)]
pub struct ClientRuntime {
    directory: Arc<MemberDirectory>,
    router: Arc<PartitionRouter>,
    connections: ConnectionManager,
    invocations: InvocationService,
    listeners: ListenerService,
}

impl ClientRuntime {
    /// Connect to the cluster and wait for the first member list.
    ///
    /// # Errors
    ///
    /// - the last bootstrap error if no address authenticates
    /// - `MemberListTimeout` if no member list arrives within the
    ///   connection timeout
    pub async fn start(
        network: Arc<dyn NetworkProvider>,
        config: RuntimeConfig,
    ) -> ConnectionResult<Self> {
        let table = Arc::new(InvocationTable::new());
        let registry = Arc::new(ListenerRegistry::new());
        let directory = Arc::new(MemberDirectory::new());
        let router = Arc::new(PartitionRouter::new());

        let dispatcher = Arc::new(Dispatcher::new(
            table.clone(),
            registry.clone(),
            directory.clone(),
            router.clone(),
        ));
        let connections = ConnectionManager::new(
            network,
            config.connection.clone(),
            AuthRequest {
                cluster_name: config.cluster_name.clone(),
                client_name: config.client_name.clone(),
            },
            dispatcher,
            directory.clone(),
        );

        if let Err(e) = connections.bootstrap(&config.addresses).await {
            connections.shutdown();
            return Err(e);
        }
        if !directory
            .wait_initialized(config.connection.connection_timeout)
            .await
        {
            connections.shutdown();
            return Err(ConnectionError::MemberListTimeout);
        }

        let invocations = InvocationService::new(
            config.invocation,
            table,
            connections.clone(),
            router.clone(),
            directory.clone(),
        );
        let listeners = ListenerService::new(registry, invocations.clone());

        tracing::info!(
            cluster = %config.cluster_name,
            members = directory.snapshot().members.len(),
            "client runtime started"
        );

        Ok(Self {
            directory,
            router,
            connections,
            invocations,
            listeners,
        })
    }

    /// Invocation service.
    pub fn invocations(&self) -> &InvocationService {
        &self.invocations
    }

    /// Listener service.
    pub fn listeners(&self) -> &ListenerService {
        &self.listeners
    }

    /// Partition router.
    pub fn router(&self) -> &Arc<PartitionRouter> {
        &self.router
    }

    /// Member directory.
    pub fn directory(&self) -> &Arc<MemberDirectory> {
        &self.directory
    }

    /// Connection manager.
    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    /// Fail pending invocations and close every connection.
    pub fn shutdown(&self) {
        self.invocations.shutdown();
        self.connections.shutdown();
    }
}
