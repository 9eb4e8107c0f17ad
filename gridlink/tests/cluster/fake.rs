//! In-memory cluster speaking the wire protocol over `tokio::io::duplex`.
//!
//! Every member shares one store, so a request gives the same answer
//! whichever member serves it. The cluster records which member served
//! each request, which is what routing tests assert on.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gridlink::proxy::codec::{
    map_op, queue_op, set_op, ItemRequest, ItemsRequest, KeyRequest, KeyValueRequest,
    ListenerRequest, NameRequest, MAP_SERVICE, QUEUE_SERVICE, SET_SERVICE,
};
use gridlink::{ClientConfig, ClientConfigBuilder, ConnectionConfig, GridClient};
use gridlink_core::{BoxedStream, CorrelationId, Data, MemberId, NetworkAddress, NetworkProvider};
use gridlink_transport::protocol::{
    self, op, AuthRequest, AuthResponse, ClusterEvent, DestroyProxyRequest, EventKind,
    EventMessage, MemberInfo, RemoteError, RemoveListenerRequest,
};
use gridlink_transport::wire::{encode_frame, try_decode_frame, Frame, FrameTag};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

/// Partitions of every fake cluster.
pub const PARTITION_COUNT: u32 = 8;

pub fn member_id(n: u64) -> MemberId {
    MemberId::new(0, n)
}

pub fn address(n: u64) -> NetworkAddress {
    NetworkAddress::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5700 + n as u16)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Poll `condition` until it holds; panics after two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

#[derive(Debug)]
struct FakeMember {
    id: MemberId,
    address: NetworkAddress,
    listed: bool,
    silent: bool,
    refusing: bool,
}

#[derive(Debug)]
struct Registration {
    object_name: String,
    include_value: bool,
    outbound: mpsc::UnboundedSender<Frame>,
}

#[derive(Debug)]
struct Link {
    member: MemberId,
    outbound: mpsc::UnboundedSender<Frame>,
    close: Arc<watch::Sender<bool>>,
}

#[derive(Debug)]
struct Served {
    op_code: u16,
    member: MemberId,
    correlation_id: CorrelationId,
}

#[derive(Debug, Default)]
struct State {
    members: Vec<FakeMember>,
    member_version: u64,
    partition_version: u64,
    owners: Vec<Option<MemberId>>,
    links: Vec<Link>,
    sets: HashMap<String, BTreeSet<Data>>,
    queues: HashMap<String, VecDeque<Data>>,
    maps: HashMap<String, BTreeMap<Data, Data>>,
    registrations: HashMap<String, Registration>,
    next_registration: u64,
    served: Vec<Served>,
    dials: Vec<(MemberId, Instant)>,
    authentications: Vec<MemberId>,
}

/// A cluster of `n` members listening on `address(1..=n)`.
#[derive(Debug, Clone)]
pub struct FakeCluster {
    cluster_name: String,
    state: Arc<Mutex<State>>,
}

impl FakeCluster {
    pub fn new(members: u64) -> Self {
        Self::named("dev", members)
    }

    pub fn named(cluster_name: &str, members: u64) -> Self {
        let mut state = State {
            member_version: 1,
            partition_version: 1,
            ..State::default()
        };
        for n in 1..=members {
            state.members.push(FakeMember {
                id: member_id(n),
                address: address(n),
                listed: true,
                silent: false,
                refusing: false,
            });
        }
        state.owners = (0..PARTITION_COUNT)
            .map(|p| Some(member_id(u64::from(p) % members + 1)))
            .collect();
        Self {
            cluster_name: cluster_name.to_string(),
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn addresses(&self) -> Vec<NetworkAddress> {
        self.state
            .lock()
            .members
            .iter()
            .filter(|m| m.listed)
            .map(|m| m.address.clone())
            .collect()
    }

    /// Client settings suited to tests: short deadlines, local backoff.
    pub fn config(&self) -> ClientConfigBuilder {
        ClientConfig::builder()
            .cluster_name("dev")
            .client_name("fake-cluster-test")
            .addresses(self.addresses())
            .invocation_timeout(Duration::from_secs(5))
            .invocation_retry_pause(Duration::from_millis(10))
            .connection(ConnectionConfig::local_network())
    }

    pub async fn client(&self) -> GridClient {
        let config = self.config().build().expect("valid config");
        GridClient::connect_with(config, Arc::new(self.clone()))
            .await
            .expect("client connects")
    }

    /// Requests reaching `member` are recorded but never answered.
    pub fn silence(&self, member: MemberId) {
        if let Some(m) = self.state.lock().member_mut(member) {
            m.silent = true;
        }
    }

    /// Answer requests reaching `member` again.
    pub fn resume(&self, member: MemberId) {
        if let Some(m) = self.state.lock().member_mut(member) {
            m.silent = false;
        }
    }

    /// Refuse (or accept again) new connections to `member`.
    pub fn refuse_connections(&self, member: MemberId, refusing: bool) {
        if let Some(m) = self.state.lock().member_mut(member) {
            m.refusing = refusing;
        }
    }

    /// Close every open connection to `member`. The member stays listed.
    pub fn disconnect(&self, member: MemberId) {
        for link in self.state.lock().links.iter().filter(|l| l.member == member) {
            link.close.send_replace(true);
        }
    }

    /// Drop `member` from the member list, hand its partitions to the
    /// oldest remaining member and push both tables to the survivors.
    pub fn remove_member(&self, member: MemberId) {
        let mut state = self.state.lock();
        if let Some(m) = state.member_mut(member) {
            m.listed = false;
        }
        state.member_version += 1;
        let heir = state.members.iter().find(|m| m.listed).map(|m| m.id);
        for owner in state.owners.iter_mut() {
            if *owner == Some(member) {
                *owner = heir;
            }
        }
        state.partition_version += 1;

        let members = state.member_list_frame();
        let partitions = state.partition_table_frame();
        state.broadcast(&members);
        state.broadcast(&partitions);
    }

    /// Replace the partition table and push it to every client.
    pub fn set_owners(&self, owners: Vec<Option<MemberId>>) {
        let mut state = self.state.lock();
        state.owners = owners;
        state.partition_version += 1;
        let frame = state.partition_table_frame();
        state.broadcast(&frame);
    }

    /// Members that served `op_code`, in arrival order.
    pub fn served_by(&self, op_code: u16) -> Vec<MemberId> {
        self.state
            .lock()
            .served
            .iter()
            .filter(|served| served.op_code == op_code)
            .map(|served| served.member)
            .collect()
    }

    /// Correlation ids of the `op_code` requests received, in arrival order.
    pub fn correlations(&self, op_code: u16) -> Vec<CorrelationId> {
        self.state
            .lock()
            .served
            .iter()
            .filter(|served| served.op_code == op_code)
            .map(|served| served.correlation_id)
            .collect()
    }

    /// Completed handshakes with `member`.
    pub fn authentications(&self, member: MemberId) -> usize {
        let state = self.state.lock();
        state.authentications.iter().filter(|m| **m == member).count()
    }

    /// When `member` was dialed, refused attempts included.
    pub fn dial_times(&self, member: MemberId) -> Vec<Instant> {
        let state = self.state.lock();
        state
            .dials
            .iter()
            .filter(|(m, _)| *m == member)
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn registration_count(&self) -> usize {
        self.state.lock().registrations.len()
    }

    /// Size of the set `name`, or `None` if it does not exist.
    pub fn set_len(&self, name: &str) -> Option<usize> {
        self.state.lock().sets.get(name).map(BTreeSet::len)
    }

    fn authenticate(
        &self,
        member: MemberId,
        frame: &Frame,
        outbound: &mpsc::UnboundedSender<Frame>,
        close: &Arc<watch::Sender<bool>>,
    ) -> bool {
        let request: Option<AuthRequest> = protocol::decode_body(&frame.payload).ok();
        let accepted = frame.op_code == op::AUTHENTICATE
            && request.is_some_and(|r| r.cluster_name == self.cluster_name);

        if !accepted {
            let error = remote("AuthenticationException", "cluster name mismatch");
            let _ = outbound.send(Frame::error_response(
                op::AUTHENTICATE,
                frame.correlation_id,
                encode(&error),
            ));
            return false;
        }

        let mut state = self.state.lock();
        let Some(address) = state.member_mut(member).map(|m| m.address.clone()) else {
            return false;
        };
        let response = AuthResponse {
            member_id: member,
            address,
            partition_count: PARTITION_COUNT,
        };
        let _ = outbound.send(Frame::response(
            op::AUTHENTICATE,
            frame.correlation_id,
            encode(&response),
        ));
        let _ = outbound.send(state.member_list_frame());
        let _ = outbound.send(state.partition_table_frame());
        state.links.push(Link {
            member,
            outbound: outbound.clone(),
            close: close.clone(),
        });
        state.authentications.push(member);
        true
    }

    fn handle(&self, member: MemberId, frame: Frame, outbound: &mpsc::UnboundedSender<Frame>) {
        if frame.tag != FrameTag::Request {
            return;
        }
        let mut state = self.state.lock();
        state.served.push(Served {
            op_code: frame.op_code,
            member,
            correlation_id: frame.correlation_id,
        });
        if state.member_mut(member).map_or(true, |m| m.silent) {
            return;
        }
        let reply = match state.execute(member, frame.op_code, &frame.payload, outbound) {
            Ok(body) => Frame::response(frame.op_code, frame.correlation_id, body),
            Err(error) => {
                Frame::error_response(frame.op_code, frame.correlation_id, encode(&error))
            }
        };
        let _ = outbound.send(reply);
    }
}

#[async_trait]
impl NetworkProvider for FakeCluster {
    async fn connect(&self, address: &NetworkAddress) -> io::Result<BoxedStream> {
        let member = {
            let mut state = self.state.lock();
            let Some((member, refusing)) = state
                .members
                .iter()
                .find(|m| m.listed && &m.address == address)
                .map(|m| (m.id, m.refusing))
            else {
                return Err(io::Error::from(io::ErrorKind::ConnectionRefused));
            };
            state.dials.push((member, Instant::now()));
            if refusing {
                return Err(io::Error::from(io::ErrorKind::ConnectionRefused));
            }
            member
        };

        let (client, server) = tokio::io::duplex(64 * 1024);
        tokio::spawn(serve(self.clone(), member, server));
        Ok(Box::new(client))
    }
}

async fn serve(cluster: FakeCluster, member: MemberId, stream: DuplexStream) {
    let (mut reader, mut writer) = tokio::io::split(stream);
    let (outbound, mut frames) = mpsc::unbounded_channel::<Frame>();
    let (close, mut closed) = watch::channel(false);
    let close = Arc::new(close);
    let mut writer_closed = closed.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = frames.recv() => {
                    let Some(frame) = frame else { break };
                    let Ok(bytes) = encode_frame(&frame) else {
                        break;
                    };
                    if writer.write_all(&bytes).await.is_err() {
                        break;
                    }
                }
                _ = async { writer_closed.wait_for(|closed| *closed).await.map(|_| ()) } => break,
            }
        }
    });

    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    let mut authenticated = false;
    'connection: loop {
        loop {
            match try_decode_frame(&buffer) {
                Ok(Some((frame, used))) => {
                    buffer.drain(..used);
                    if authenticated {
                        cluster.handle(member, frame, &outbound);
                    } else if cluster.authenticate(member, &frame, &outbound, &close) {
                        authenticated = true;
                    } else {
                        break 'connection;
                    }
                }
                Ok(None) => break,
                Err(_) => break 'connection,
            }
        }
        tokio::select! {
            read = reader.read(&mut chunk) => match read {
                Ok(0) | Err(_) => break,
                Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            },
            _ = closed.wait_for(|closed| *closed) => break,
        }
    }

    cluster
        .state
        .lock()
        .links
        .retain(|link| !link.outbound.same_channel(&outbound));
}

fn remote(class_name: &str, message: impl Into<String>) -> RemoteError {
    RemoteError {
        class_name: class_name.to_string(),
        message: message.into(),
    }
}

fn encode<T: Serialize>(body: &T) -> Vec<u8> {
    protocol::encode_body(body).expect("encode body")
}

fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, RemoteError> {
    protocol::decode_body(payload).map_err(|e| remote("SerializationException", e.to_string()))
}

fn reply<T: Serialize>(body: &T) -> Result<Vec<u8>, RemoteError> {
    Ok(encode(body))
}

impl State {
    fn member_mut(&mut self, id: MemberId) -> Option<&mut FakeMember> {
        self.members.iter_mut().find(|m| m.id == id)
    }

    fn is_listed(&self, id: MemberId) -> bool {
        self.members.iter().any(|m| m.id == id && m.listed)
    }

    fn member_list_frame(&self) -> Frame {
        let members = self
            .members
            .iter()
            .filter(|m| m.listed)
            .map(|m| MemberInfo {
                id: m.id,
                address: m.address.clone(),
                partition_version: self.partition_version,
            })
            .collect();
        let event = ClusterEvent::MemberList {
            version: self.member_version,
            members,
        };
        Frame::pushed(FrameTag::MembershipUpdate, encode(&event))
    }

    fn partition_table_frame(&self) -> Frame {
        let event = ClusterEvent::PartitionTable {
            version: self.partition_version,
            owners: self.owners.clone(),
        };
        Frame::pushed(FrameTag::MembershipUpdate, encode(&event))
    }

    fn broadcast(&self, frame: &Frame) {
        for link in &self.links {
            if self.is_listed(link.member) {
                let _ = link.outbound.send(frame.clone());
            }
        }
    }

    fn emit(&self, object_name: &str, kind: EventKind, item: &Data, member: MemberId) {
        for (id, registration) in &self.registrations {
            if registration.object_name != object_name {
                continue;
            }
            let message = EventMessage {
                registration_id: id.clone(),
                kind,
                item: registration.include_value.then(|| item.clone()),
                member,
            };
            let _ = registration
                .outbound
                .send(Frame::pushed(FrameTag::Event, encode(&message)));
        }
    }

    fn register(
        &mut self,
        payload: &[u8],
        outbound: &mpsc::UnboundedSender<Frame>,
    ) -> Result<Vec<u8>, RemoteError> {
        let request: ListenerRequest = decode(payload)?;
        self.next_registration += 1;
        let id = format!("registration-{}", self.next_registration);
        self.registrations.insert(
            id.clone(),
            Registration {
                object_name: request.name,
                include_value: request.include_value,
                outbound: outbound.clone(),
            },
        );
        reply(&id)
    }

    fn execute(
        &mut self,
        member: MemberId,
        op_code: u16,
        payload: &[u8],
        outbound: &mpsc::UnboundedSender<Frame>,
    ) -> Result<Vec<u8>, RemoteError> {
        match op_code {
            op::REMOVE_LISTENER => {
                let request: RemoveListenerRequest = decode(payload)?;
                reply(&self.registrations.remove(&request.registration_id).is_some())
            }
            op::DESTROY_PROXY => {
                let request: DestroyProxyRequest = decode(payload)?;
                match request.service_name.as_str() {
                    SET_SERVICE => {
                        self.sets.remove(&request.object_name);
                    }
                    QUEUE_SERVICE => {
                        self.queues.remove(&request.object_name);
                    }
                    MAP_SERVICE => {
                        self.maps.remove(&request.object_name);
                    }
                    other => return Err(remote("ServiceNotFoundException", other)),
                }
                self.registrations
                    .retain(|_, r| r.object_name != request.object_name);
                reply(&())
            }
            set_op::ADD_LISTENER | queue_op::ADD_LISTENER => self.register(payload, outbound),
            code if code & 0xFF00 == 0x0600 => self.execute_set(member, code, payload),
            code if code & 0xFF00 == 0x0300 => self.execute_queue(member, code, payload),
            code if code & 0xFF00 == 0x0100 => self.execute_map(code, payload),
            other => Err(remote(
                "UnsupportedOperationException",
                format!("op {:#06x}", other),
            )),
        }
    }

    fn execute_set(
        &mut self,
        member: MemberId,
        op_code: u16,
        payload: &[u8],
    ) -> Result<Vec<u8>, RemoteError> {
        match op_code {
            set_op::SIZE => {
                let request: NameRequest = decode(payload)?;
                reply(&self.sets.get(&request.name).map_or(0, BTreeSet::len))
            }
            set_op::IS_EMPTY => {
                let request: NameRequest = decode(payload)?;
                reply(&self.sets.get(&request.name).map_or(true, BTreeSet::is_empty))
            }
            set_op::CONTAINS => {
                let request: ItemRequest = decode(payload)?;
                let set = self.sets.get(&request.name);
                reply(&set.is_some_and(|s| s.contains(&request.item)))
            }
            set_op::CONTAINS_ALL => {
                let request: ItemsRequest = decode(payload)?;
                let set = self.sets.get(&request.name);
                reply(&request.items.iter().all(|item| set.is_some_and(|s| s.contains(item))))
            }
            set_op::GET_ALL => {
                let request: NameRequest = decode(payload)?;
                let items: Vec<Data> = self
                    .sets
                    .get(&request.name)
                    .map(|s| s.iter().cloned().collect())
                    .unwrap_or_default();
                reply(&items)
            }
            set_op::ADD | set_op::REMOVE => {
                let request: ItemRequest = decode(payload)?;
                let set = self.sets.entry(request.name.clone()).or_default();
                let (changed, kind) = if op_code == set_op::ADD {
                    (set.insert(request.item.clone()), EventKind::ItemAdded)
                } else {
                    (set.remove(&request.item), EventKind::ItemRemoved)
                };
                if changed {
                    self.emit(&request.name, kind, &request.item, member);
                }
                reply(&changed)
            }
            set_op::ADD_ALL | set_op::REMOVE_ALL | set_op::RETAIN_ALL => {
                let request: ItemsRequest = decode(payload)?;
                let set = self.sets.entry(request.name.clone()).or_default();
                let mut events = Vec::new();
                match op_code {
                    set_op::ADD_ALL => {
                        for item in request.items {
                            if set.insert(item.clone()) {
                                events.push((EventKind::ItemAdded, item));
                            }
                        }
                    }
                    set_op::REMOVE_ALL => {
                        for item in request.items {
                            if set.remove(&item) {
                                events.push((EventKind::ItemRemoved, item));
                            }
                        }
                    }
                    _ => {
                        let keep: BTreeSet<Data> = request.items.into_iter().collect();
                        let dropped: Vec<Data> =
                            set.iter().filter(|i| !keep.contains(*i)).cloned().collect();
                        for item in dropped {
                            set.remove(&item);
                            events.push((EventKind::ItemRemoved, item));
                        }
                    }
                }
                for (kind, item) in &events {
                    self.emit(&request.name, *kind, item, member);
                }
                reply(&!events.is_empty())
            }
            set_op::CLEAR => {
                let request: NameRequest = decode(payload)?;
                let items = self.sets.get_mut(&request.name).map(std::mem::take);
                for item in items.unwrap_or_default() {
                    self.emit(&request.name, EventKind::ItemRemoved, &item, member);
                }
                reply(&())
            }
            other => Err(remote(
                "UnsupportedOperationException",
                format!("op {:#06x}", other),
            )),
        }
    }

    fn execute_queue(
        &mut self,
        member: MemberId,
        op_code: u16,
        payload: &[u8],
    ) -> Result<Vec<u8>, RemoteError> {
        match op_code {
            queue_op::OFFER => {
                let request: ItemRequest = decode(payload)?;
                self.queues
                    .entry(request.name.clone())
                    .or_default()
                    .push_back(request.item.clone());
                self.emit(&request.name, EventKind::ItemAdded, &request.item, member);
                reply(&true)
            }
            queue_op::POLL => {
                let request: NameRequest = decode(payload)?;
                let head = self
                    .queues
                    .get_mut(&request.name)
                    .and_then(VecDeque::pop_front);
                if let Some(item) = &head {
                    self.emit(&request.name, EventKind::ItemRemoved, item, member);
                }
                reply(&head)
            }
            queue_op::PEEK => {
                let request: NameRequest = decode(payload)?;
                reply(&self.queues.get(&request.name).and_then(|q| q.front()))
            }
            queue_op::SIZE => {
                let request: NameRequest = decode(payload)?;
                reply(&self.queues.get(&request.name).map_or(0, VecDeque::len))
            }
            queue_op::CLEAR => {
                let request: NameRequest = decode(payload)?;
                self.queues.remove(&request.name);
                reply(&())
            }
            other => Err(remote(
                "UnsupportedOperationException",
                format!("op {:#06x}", other),
            )),
        }
    }

    fn execute_map(&mut self, op_code: u16, payload: &[u8]) -> Result<Vec<u8>, RemoteError> {
        match op_code {
            map_op::PUT => {
                let request: KeyValueRequest = decode(payload)?;
                let map = self.maps.entry(request.name).or_default();
                reply(&map.insert(request.key, request.value))
            }
            map_op::GET | map_op::REMOVE | map_op::CONTAINS_KEY => {
                let request: KeyRequest = decode(payload)?;
                let map = self.maps.entry(request.name).or_default();
                match op_code {
                    map_op::GET => reply(&map.get(&request.key)),
                    map_op::REMOVE => reply(&map.remove(&request.key)),
                    _ => reply(&map.contains_key(&request.key)),
                }
            }
            map_op::SIZE => {
                let request: NameRequest = decode(payload)?;
                reply(&self.maps.get(&request.name).map_or(0, BTreeMap::len))
            }
            map_op::CLEAR => {
                let request: NameRequest = decode(payload)?;
                self.maps.remove(&request.name);
                reply(&())
            }
            other => Err(remote(
                "UnsupportedOperationException",
                format!("op {:#06x}", other),
            )),
        }
    }
}
