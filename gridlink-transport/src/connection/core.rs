//! Single connection to a cluster member.
//!
//! Wire format: see [`crate::wire`]. Every connection starts with an
//! `AUTHENTICATE` exchange on correlation id 0; afterwards the reader task
//! decodes frames and passes them to the [`FrameHandler`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use gridlink_core::{BoxedStream, CorrelationId, MemberId, NetworkAddress, NetworkProvider};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, watch};

use super::error::{ConnectionError, ConnectionResult};
use crate::protocol::{self, op, AuthRequest, AuthResponse, RemoteError};
use crate::wire::{encode_frame, try_decode_frame, Frame, FrameTag};

/// Initial capacity of the read buffer.
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Session-unique connection id.
pub type ConnectionId = u64;

/// Sink for everything a connection's reader observes.
///
/// Called from the reader task, so implementations must not block.
pub trait FrameHandler: Send + Sync + 'static {
    /// The handshake with `member` succeeded. Runs before any frame of the
    /// connection is handed to [`FrameHandler::on_frame`].
    fn on_authenticated(&self, member: MemberId, response: &AuthResponse);

    /// A complete frame arrived.
    fn on_frame(&self, member: MemberId, connection: ConnectionId, frame: Frame);

    /// The connection stopped reading (EOF, I/O error, wire error or close).
    fn on_closed(&self, member: MemberId, connection: ConnectionId);
}

/// A connected and authenticated stream whose tasks are not running yet.
pub struct PendingConnection {
    stream: BoxedStream,
    buffer: BytesMut,
    response: AuthResponse,
    address: NetworkAddress,
}

impl std::fmt::Debug for PendingConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingConnection")
            .field("address", &self.address)
            .field("response", &self.response)
            .finish()
    }
}

impl PendingConnection {
    /// The member's answer to the handshake.
    pub fn response(&self) -> &AuthResponse {
        &self.response
    }

    /// Spawn the reader and writer tasks.
    ///
    /// `closed` receives `(member, id)` once the reader stops, after
    /// [`FrameHandler::on_closed`] ran.
    pub fn start(
        self,
        id: ConnectionId,
        handler: Arc<dyn FrameHandler>,
        closed: mpsc::UnboundedSender<(MemberId, ConnectionId)>,
    ) -> Connection {
        let member = self.response.member_id;
        handler.on_authenticated(member, &self.response);

        let (reader, writer) = tokio::io::split(self.stream);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let alive = Arc::new(AtomicBool::new(true));

        tokio::spawn(writer_task(writer, outbound_rx, shutdown_rx.clone(), member));
        tokio::spawn(reader_task(ReaderState {
            reader,
            buffer: self.buffer,
            member,
            id,
            handler,
            alive: alive.clone(),
            shutdown: shutdown_rx,
            closed,
        }));

        tracing::info!(member = %member, address = %self.address, connection = id, "connection established");

        Connection {
            id,
            member,
            address: self.address,
            outbound: outbound_tx,
            alive,
            shutdown: shutdown_tx,
        }
    }
}

/// A live connection to one member.
///
/// Dropping the last handle stops both background tasks.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    member: MemberId,
    address: NetworkAddress,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    alive: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
}

impl Connection {
    /// Connect to `address` and authenticate, all within `timeout`.
    ///
    /// # Errors
    ///
    /// - `ConnectFailed` if the provider cannot open a stream
    /// - `AuthenticationFailed` if the member rejects the request
    /// - `Handshake` if the member answers with an unexpected frame
    /// - `Timeout` if connect plus handshake exceed `timeout`
    pub async fn open(
        network: &dyn NetworkProvider,
        address: &NetworkAddress,
        auth: &AuthRequest,
        timeout: Duration,
    ) -> ConnectionResult<PendingConnection> {
        let attempt = async {
            let mut stream = network
                .connect(address)
                .await
                .map_err(|e| ConnectionError::io(address, e))?;
            let (response, buffer) = handshake(&mut stream, address, auth).await?;
            Ok(PendingConnection {
                stream,
                buffer,
                response,
                address: address.clone(),
            })
        };

        match tokio::time::timeout(timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Timeout {
                address: address.clone(),
            }),
        }
    }

    /// Connection id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Member at the other end.
    pub fn member(&self) -> MemberId {
        self.member
    }

    /// Address dialed.
    pub fn address(&self) -> &NetworkAddress {
        &self.address
    }

    /// Whether the reader is still running.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Queue a frame for writing.
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the connection is no longer alive; nothing was
    /// written in that case.
    pub fn send(&self, frame: &Frame) -> ConnectionResult<()> {
        if !self.is_alive() {
            return Err(ConnectionError::Closed {
                member: self.member,
            });
        }
        let bytes = encode_frame(frame)?;
        tracing::debug!(
            "connection {}: queue {:?} op={:#06x} correlation={} ({} bytes)",
            self.id,
            frame.tag,
            frame.op_code,
            frame.correlation_id,
            bytes.len()
        );
        self.outbound
            .send(bytes)
            .map_err(|_| ConnectionError::Closed {
                member: self.member,
            })
    }

    /// Stop both tasks. The reader still reports the close to the handler.
    pub fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.shutdown.send_replace(true);
    }
}

async fn handshake(
    stream: &mut BoxedStream,
    address: &NetworkAddress,
    auth: &AuthRequest,
) -> ConnectionResult<(AuthResponse, BytesMut)> {
    let handshake_error = |reason: String| ConnectionError::Handshake {
        address: address.clone(),
        reason,
    };

    let body = protocol::encode_body(auth).map_err(|e| handshake_error(e.to_string()))?;
    let request = encode_frame(&Frame::request(
        op::AUTHENTICATE,
        CorrelationId::HANDSHAKE,
        body,
    ))?;
    stream
        .write_all(&request)
        .await
        .map_err(|e| ConnectionError::io(address, e))?;
    stream
        .flush()
        .await
        .map_err(|e| ConnectionError::io(address, e))?;

    let mut buffer = BytesMut::with_capacity(READ_BUFFER_SIZE);
    loop {
        if let Some((frame, consumed)) = try_decode_frame(&buffer[..])? {
            buffer.advance(consumed);
            if frame.tag != FrameTag::Response || frame.correlation_id != CorrelationId::HANDSHAKE
            {
                return Err(handshake_error(format!(
                    "unexpected {:?} frame with correlation {}",
                    frame.tag, frame.correlation_id
                )));
            }
            if frame.is_error() {
                let reason = match protocol::decode_body::<RemoteError>(&frame.payload) {
                    Ok(remote) => remote.to_string(),
                    Err(e) => e.to_string(),
                };
                return Err(ConnectionError::AuthenticationFailed {
                    address: address.clone(),
                    reason,
                });
            }
            let response: AuthResponse = protocol::decode_body(&frame.payload)
                .map_err(|e| handshake_error(e.to_string()))?;
            return Ok((response, buffer));
        }

        let n = stream
            .read_buf(&mut buffer)
            .await
            .map_err(|e| ConnectionError::io(address, e))?;
        if n == 0 {
            return Err(handshake_error(
                "connection closed during handshake".to_string(),
            ));
        }
    }
}

async fn writer_task(
    mut writer: WriteHalf<BoxedStream>,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    mut shutdown: watch::Receiver<bool>,
    member: MemberId,
) {
    loop {
        tokio::select! {
            data = outbound.recv() => match data {
                Some(data) => {
                    if let Err(e) = writer.write_all(&data).await {
                        tracing::debug!("writer for {}: write failed: {}", member, e);
                        break;
                    }
                }
                None => break,
            },
            _ = shutdown.changed() => break,
        }
    }
    let _ = writer.shutdown().await;
}

struct ReaderState {
    reader: ReadHalf<BoxedStream>,
    buffer: BytesMut,
    member: MemberId,
    id: ConnectionId,
    handler: Arc<dyn FrameHandler>,
    alive: Arc<AtomicBool>,
    shutdown: watch::Receiver<bool>,
    closed: mpsc::UnboundedSender<(MemberId, ConnectionId)>,
}

async fn reader_task(mut state: ReaderState) {
    // Frames may have arrived together with the handshake response.
    let mut open = drain_frames(&mut state);

    while open {
        tokio::select! {
            read = state.reader.read_buf(&mut state.buffer) => match read {
                Ok(0) => {
                    tracing::debug!("connection {} to {}: closed by peer", state.id, state.member);
                    open = false;
                }
                Ok(n) => {
                    tracing::debug!(
                        "connection {}: received {} bytes, buffer now {} bytes",
                        state.id,
                        n,
                        state.buffer.len()
                    );
                    open = drain_frames(&mut state);
                }
                Err(e) => {
                    tracing::debug!("connection {} to {}: read failed: {}", state.id, state.member, e);
                    open = false;
                }
            },
            _ = state.shutdown.changed() => open = false,
        }
    }

    state.alive.store(false, Ordering::SeqCst);
    tracing::info!(member = %state.member, connection = state.id, "connection closed");
    state.handler.on_closed(state.member, state.id);
    let _ = state.closed.send((state.member, state.id));
}

/// Decode and dispatch every complete frame. Returns false on a wire error.
fn drain_frames(state: &mut ReaderState) -> bool {
    loop {
        match try_decode_frame(&state.buffer[..]) {
            Ok(Some((frame, consumed))) => {
                state.buffer.advance(consumed);
                state.handler.on_frame(state.member, state.id, frame);
            }
            Ok(None) => return true,
            Err(e) => {
                tracing::warn!(
                    "connection {} to {}: wire format error: {} - tearing down connection",
                    state.id,
                    state.member,
                    e
                );
                return false;
            }
        }
    }
}
