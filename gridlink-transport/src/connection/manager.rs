//! At most one live connection per member.
//!
//! Connections are opened lazily by [`ConnectionManager::connection_for`].
//! A supervisor task watches connection closures and membership events:
//!
//! - a dropped connection to a still-listed member is reconnected in the
//!   background with exponential backoff and jitter;
//! - after `max_connection_failures` consecutive failures the member is
//!   marked unreachable and lookups fail fast;
//! - a departed member's connection is closed and its reconnect state
//!   discarded;
//! - a (re)added member starts with a clean reconnect state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use gridlink_core::{MemberId, NetworkAddress, NetworkProvider};
use rand::Rng;
use tokio::sync::{broadcast, mpsc, watch, Mutex};

use super::config::ConnectionConfig;
use super::core::{Connection, ConnectionId, FrameHandler, PendingConnection};
use super::error::{ConnectionError, ConnectionResult};
use crate::membership::{MemberDirectory, MembershipEvent};
use crate::protocol::AuthRequest;

/// Reconnection bookkeeping for one member.
#[derive(Debug, Clone)]
struct ReconnectState {
    /// Current backoff delay
    current_delay: Duration,

    /// Number of consecutive failures
    failure_count: u32,

    /// Whether the failure limit was reached
    unreachable: bool,

    /// Whether a background reconnect loop is running
    reconnecting: bool,
}

impl ReconnectState {
    fn new(initial_delay: Duration) -> Self {
        Self {
            current_delay: initial_delay,
            failure_count: 0,
            unreachable: false,
            reconnecting: false,
        }
    }
}

/// Owns every connection of a client session.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connections", &self.inner.connections.len())
            .field("shut_down", &self.inner.is_shut_down())
            .finish()
    }
}

struct Inner {
    network: Arc<dyn NetworkProvider>,
    config: ConnectionConfig,
    auth: AuthRequest,
    handler: Arc<dyn FrameHandler>,
    directory: Arc<MemberDirectory>,
    connections: DashMap<MemberId, Arc<Connection>>,
    connect_locks: DashMap<MemberId, Arc<Mutex<()>>>,
    reconnect: DashMap<MemberId, ReconnectState>,
    next_connection_id: AtomicU64,
    closed_tx: mpsc::UnboundedSender<(MemberId, ConnectionId)>,
    shutdown: watch::Sender<bool>,
}

impl ConnectionManager {
    /// Create a manager and spawn its supervisor task.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(
        network: Arc<dyn NetworkProvider>,
        config: ConnectionConfig,
        auth: AuthRequest,
        handler: Arc<dyn FrameHandler>,
        directory: Arc<MemberDirectory>,
    ) -> Self {
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let membership = directory.subscribe();

        let inner = Arc::new(Inner {
            network,
            config,
            auth,
            handler,
            directory,
            connections: DashMap::new(),
            connect_locks: DashMap::new(),
            reconnect: DashMap::new(),
            next_connection_id: AtomicU64::new(1),
            closed_tx,
            shutdown,
        });

        tokio::spawn(supervise(
            Arc::downgrade(&inner),
            closed_rx,
            membership,
            shutdown_rx,
        ));

        Self { inner }
    }

    /// Connect to the first address that accepts and authenticates.
    ///
    /// Addresses are tried in order. Returns the id of the member reached.
    ///
    /// # Errors
    ///
    /// Returns the error of the last address tried, or `NoAddressReachable`
    /// if `addresses` is empty.
    pub async fn bootstrap(&self, addresses: &[NetworkAddress]) -> ConnectionResult<MemberId> {
        let mut last_error = ConnectionError::NoAddressReachable;
        for address in addresses {
            match Connection::open(
                self.inner.network.as_ref(),
                address,
                &self.inner.auth,
                self.inner.config.connection_timeout,
            )
            .await
            {
                Ok(pending) => {
                    let member = pending.response().member_id;
                    self.inner.install(pending);
                    tracing::info!(member = %member, address = %address, "bootstrap connection ready");
                    return Ok(member);
                }
                Err(e) => {
                    tracing::warn!("bootstrap: cannot use {}: {}", address, e);
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    /// Live connection to `member`, opened on first need.
    ///
    /// # Errors
    ///
    /// - `MemberUnreachable` once the failure limit was reached
    /// - `UnknownMember` if `member` is not in the member list
    /// - `Shutdown` after [`ConnectionManager::shutdown`]
    /// - the connect error otherwise
    pub async fn connection_for(&self, member: MemberId) -> ConnectionResult<Arc<Connection>> {
        self.inner.connection_for(member).await
    }

    /// Whether a live connection to `member` exists.
    pub fn is_connected(&self, member: MemberId) -> bool {
        self.inner.live(member).is_some()
    }

    /// Whether `member` reached the connection failure limit.
    pub fn is_unreachable(&self, member: MemberId) -> bool {
        self.inner.is_unreachable(member)
    }

    /// Members with a live connection.
    pub fn connected_members(&self) -> Vec<MemberId> {
        self.inner
            .connections
            .iter()
            .filter(|entry| entry.value().is_alive())
            .map(|entry| *entry.key())
            .collect()
    }

    /// Close every connection and refuse new ones.
    pub fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
        let members: Vec<MemberId> = self.inner.connections.iter().map(|e| *e.key()).collect();
        for member in members {
            if let Some((_, connection)) = self.inner.connections.remove(&member) {
                connection.close();
            }
        }
        tracing::info!("connection manager shut down");
    }
}

impl Inner {
    fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn live(&self, member: MemberId) -> Option<Arc<Connection>> {
        self.connections
            .get(&member)
            .map(|entry| entry.value().clone())
            .filter(|connection| connection.is_alive())
    }

    fn is_unreachable(&self, member: MemberId) -> bool {
        self.reconnect
            .get(&member)
            .map(|state| state.unreachable)
            .unwrap_or(false)
    }

    fn install(&self, pending: PendingConnection) -> Arc<Connection> {
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let connection = Arc::new(pending.start(id, self.handler.clone(), self.closed_tx.clone()));
        let member = connection.member();
        if let Some(previous) = self.connections.insert(member, connection.clone()) {
            previous.close();
        }
        self.reconnect.remove(&member);
        connection
    }

    async fn connection_for(self: &Arc<Self>, member: MemberId) -> ConnectionResult<Arc<Connection>> {
        if self.is_shut_down() {
            return Err(ConnectionError::Shutdown);
        }
        if let Some(connection) = self.live(member) {
            return Ok(connection);
        }
        if self.is_unreachable(member) {
            return Err(ConnectionError::MemberUnreachable { member });
        }

        let lock = self.connect_locks.entry(member).or_default().clone();
        let _guard = lock.lock().await;

        // Another caller may have connected while we waited.
        if let Some(connection) = self.live(member) {
            return Ok(connection);
        }
        let address = self
            .directory
            .member(member)
            .ok_or(ConnectionError::UnknownMember { member })?
            .address;

        tracing::debug!("connecting to member {} at {}", member, address);
        let result = Connection::open(
            self.network.as_ref(),
            &address,
            &self.auth,
            self.config.connection_timeout,
        )
        .await;

        match result {
            Ok(pending) if pending.response().member_id == member => {
                if self.is_shut_down() {
                    return Err(ConnectionError::Shutdown);
                }
                Ok(self.install(pending))
            }
            Ok(pending) => {
                let reason = format!(
                    "expected member {}, reached {}",
                    member,
                    pending.response().member_id
                );
                self.record_failure(member);
                Err(ConnectionError::Handshake { address, reason })
            }
            Err(e) => {
                if self.record_failure(member) {
                    Err(ConnectionError::MemberUnreachable { member })
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Count a failed attempt. Returns true if the member is now unreachable.
    fn record_failure(&self, member: MemberId) -> bool {
        let mut state = self
            .reconnect
            .entry(member)
            .or_insert_with(|| ReconnectState::new(self.config.initial_reconnect_delay));
        state.failure_count += 1;
        state.current_delay = self.config.next_delay(state.current_delay);
        if state.failure_count >= self.config.max_connection_failures && !state.unreachable {
            state.unreachable = true;
            tracing::warn!(
                member = %member,
                failures = state.failure_count,
                "member marked unreachable"
            );
        }
        state.unreachable
    }

    fn on_connection_closed(self: &Arc<Self>, member: MemberId, id: ConnectionId) {
        // Only react to the connection currently registered for the member.
        if self
            .connections
            .remove_if(&member, |_, connection| connection.id() == id)
            .is_none()
        {
            return;
        }
        if self.is_shut_down() || !self.directory.snapshot().contains(member) {
            return;
        }
        self.spawn_reconnect(member);
    }

    fn on_membership_event(&self, event: MembershipEvent) {
        match event {
            MembershipEvent::MemberRemoved(member) => {
                if let Some((_, connection)) = self.connections.remove(&member.id) {
                    connection.close();
                }
                self.reconnect.remove(&member.id);
                self.connect_locks.remove(&member.id);
                tracing::info!(member = %member.id, "member left, connection released");
            }
            MembershipEvent::MemberAdded(member) => {
                if self.reconnect.remove(&member.id).is_some() {
                    tracing::debug!("member {} re-added, reconnect state cleared", member.id);
                }
            }
        }
    }

    /// Drop state of every member absent from the current member list.
    fn reconcile(&self) {
        let snapshot = self.directory.snapshot();
        let departed: Vec<MemberId> = self
            .connections
            .iter()
            .map(|entry| *entry.key())
            .chain(self.reconnect.iter().map(|entry| *entry.key()))
            .filter(|member| !snapshot.contains(*member))
            .collect();
        for member in departed {
            if let Some((_, connection)) = self.connections.remove(&member) {
                connection.close();
            }
            self.reconnect.remove(&member);
            self.connect_locks.remove(&member);
            tracing::info!(member = %member, "member no longer listed, connection released");
        }
    }

    fn spawn_reconnect(self: &Arc<Self>, member: MemberId) {
        {
            let mut state = self
                .reconnect
                .entry(member)
                .or_insert_with(|| ReconnectState::new(self.config.initial_reconnect_delay));
            if state.reconnecting || state.unreachable {
                return;
            }
            state.reconnecting = true;
        }

        let inner = self.clone();
        tokio::spawn(async move {
            inner.reconnect_loop(member).await;
            if let Some(mut state) = inner.reconnect.get_mut(&member) {
                state.reconnecting = false;
            }
        });
    }

    async fn reconnect_loop(self: &Arc<Self>, member: MemberId) {
        loop {
            let delay = self
                .reconnect
                .get(&member)
                .map(|state| state.current_delay)
                .unwrap_or(self.config.initial_reconnect_delay);
            let delay = with_jitter(delay);
            tracing::debug!("reconnecting to {} in {:?}", member, delay);
            tokio::time::sleep(delay).await;

            if self.is_shut_down() || !self.directory.snapshot().contains(member) {
                return;
            }
            if self.live(member).is_some() {
                return;
            }

            match self.connection_for(member).await {
                Ok(_) => {
                    tracing::info!(member = %member, "reconnected");
                    return;
                }
                Err(
                    ConnectionError::MemberUnreachable { .. }
                    | ConnectionError::UnknownMember { .. }
                    | ConnectionError::Shutdown,
                ) => return,
                Err(e) => tracing::warn!("reconnect to {} failed: {}", member, e),
            }
        }
    }
}

/// Add up to 50% random jitter.
fn with_jitter(delay: Duration) -> Duration {
    let max_jitter = delay.as_millis() as u64 / 2;
    if max_jitter == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..=max_jitter))
}

async fn supervise(
    inner: Weak<Inner>,
    mut closed: mpsc::UnboundedReceiver<(MemberId, ConnectionId)>,
    mut membership: broadcast::Receiver<MembershipEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            Some((member, id)) = closed.recv() => {
                let Some(inner) = inner.upgrade() else { break };
                inner.on_connection_closed(member, id);
            }
            event = membership.recv() => match event {
                Ok(event) => {
                    let Some(inner) = inner.upgrade() else { break };
                    inner.on_membership_event(event);
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!("connection supervisor missed {} membership events", missed);
                    let Some(inner) = inner.upgrade() else { break };
                    inner.reconcile();
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown.changed() => break,
        }
    }
    tracing::debug!("connection supervisor stopped");
}
