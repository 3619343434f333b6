//! The reliable stream transport shared by TCP and RadSec.
//!
//! One long-lived connection carries many requests at once: every PDU is
//! prefixed with a 4-byte big-endian length, writes are serialized behind a
//! mutex, and a receiver task matches inbound frames to waiters through a
//! pending table keyed by the identifier octet.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use byteorder::{ByteOrder, NetworkEndian};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use radius_proto::{Packet, PacketCode, PacketCodec, MAX_PACKET_LEN};

use super::Transport;
use crate::config::ConnectionConfig;
use crate::error::ClientError;
use crate::source::{IdentifierSequence, RandomSource};

/// Opens the byte stream a [`StreamTransport`] session runs on.
///
/// The plain and secure transports differ only in what this yields: a bare
/// TCP stream, or one wrapped in a finished TLS session. The connect timeout
/// is applied around `open` as a whole, so a TLS implementation must finish
/// its handshake inside `open`.
pub(crate) trait StreamConnector: Send + Sync + 'static {
    /// The established byte stream.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Opens one connection to the peer.
    fn open(&self) -> BoxFuture<'_, io::Result<Self::Stream>>;
}

/// Connects a plain TCP stream.
pub(crate) struct TcpConnector {
    pub(crate) address: String,
}

impl StreamConnector for TcpConnector {
    type Stream = TcpStream;

    fn open(&self) -> BoxFuture<'_, io::Result<Self::Stream>> {
        Box::pin(async move {
            let stream = TcpStream::connect(&*self.address).await?;
            stream.set_nodelay(true)?;
            Ok(stream)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum SessionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Closing = 3,
    Closed = 4,
}

/// Everything a keep-alive probe needs to build and check a Status-Server
/// exchange on its own.
pub(crate) struct ProbeContext {
    pub(crate) codec: PacketCodec,
    pub(crate) secret: Vec<u8>,
    pub(crate) random: Arc<dyn RandomSource>,
    pub(crate) identifiers: Arc<dyn IdentifierSequence>,
}

type PendingSlot = oneshot::Sender<Result<Vec<u8>, ClientError>>;

struct Shared<C: StreamConnector> {
    connector: C,
    config: ConnectionConfig,
    probe: ProbeContext,
    handle: Handle,

    state: AtomicU8,
    closing: AtomicBool,
    reconnect_attempts: AtomicU32,
    reconnect_exhausted: AtomicBool,

    /// Outstanding requests by identifier. Insertions happen on the send
    /// path, removals in the receiver task or on timeout; both sides go
    /// through this lock and never hold it across an await.
    pending: Mutex<HashMap<u8, PendingSlot>>,

    /// Write half of the live connection. The async mutex doubles as the
    /// writer serialization: a frame is written and flushed in one critical
    /// section.
    writer: AsyncMutex<Option<WriteHalf<C::Stream>>>,

    /// Receiver, keep-alive and reconnect tasks of the current session.
    tasks: Mutex<Vec<JoinHandle<()>>>,

    /// Serializes connection establishment.
    connect_lock: AsyncMutex<()>,

    last_activity: Mutex<Instant>,
}

/// A stream transport session, shared between callers and its background
/// tasks.
pub(crate) struct StreamTransport<C: StreamConnector> {
    inner: Arc<Shared<C>>,
}

impl<C: StreamConnector> StreamTransport<C> {
    pub(crate) fn new(
        connector: C,
        config: ConnectionConfig,
        probe: ProbeContext,
        handle: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Shared {
                connector,
                config,
                probe,
                handle,
                state: AtomicU8::new(SessionState::Disconnected as u8),
                closing: AtomicBool::new(false),
                reconnect_attempts: AtomicU32::new(0),
                reconnect_exhausted: AtomicBool::new(false),
                pending: Mutex::new(HashMap::new()),
                writer: AsyncMutex::new(None),
                tasks: Mutex::new(Vec::new()),
                connect_lock: AsyncMutex::new(()),
                last_activity: Mutex::new(Instant::now()),
            }),
        }
    }
}

impl<C: StreamConnector> Transport for StreamTransport<C> {
    fn connect(&self) -> BoxFuture<'_, Result<(), ClientError>> {
        let shared = Arc::clone(&self.inner);
        Box::pin(async move { shared.establish().await })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), ClientError>> {
        let shared = Arc::clone(&self.inner);
        Box::pin(async move { shared.close_session().await })
    }

    fn reset(&self) -> BoxFuture<'_, ()> {
        let shared = Arc::clone(&self.inner);
        Box::pin(async move { shared.reset_session().await })
    }

    fn is_connected(&self) -> bool {
        self.inner.state() == SessionState::Connected
    }

    fn has_pending(&self, identifier: u8) -> bool {
        self.inner.pending.lock().contains_key(&identifier)
    }

    fn exchange(
        &self,
        frame: Vec<u8>,
        identifier: u8,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<Vec<u8>, ClientError>> {
        let shared = Arc::clone(&self.inner);
        Box::pin(async move { shared.exchange(frame, identifier, timeout).await })
    }
}

impl<C: StreamConnector> Shared<C> {
    fn state(&self) -> SessionState {
        match self.state.load(Ordering::SeqCst) {
            0 => SessionState::Disconnected,
            1 => SessionState::Connecting,
            2 => SessionState::Connected,
            3 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Claims an identifier slot in the pending table.
    fn register(&self, identifier: u8) -> Result<oneshot::Receiver<Result<Vec<u8>, ClientError>>, ClientError> {
        match self.state() {
            SessionState::Connected => {}
            SessionState::Closing | SessionState::Closed => {
                return Err(ClientError::TransportClosed)
            }
            _ => return Err(ClientError::ConnectionLost),
        }

        let mut pending = self.pending.lock();
        if pending.contains_key(&identifier) {
            return Err(ClientError::DuplicateIdentifier(identifier));
        }

        let (sender, receiver) = oneshot::channel();
        pending.insert(identifier, sender);
        Ok(receiver)
    }

    fn remove_pending(&self, identifier: u8) {
        self.pending.lock().remove(&identifier);
    }

    /// Completes every outstanding request with the given error.
    fn fail_pending(&self, error: impl Fn() -> ClientError) {
        let slots: Vec<PendingSlot> = {
            let mut pending = self.pending.lock();
            pending.drain().map(|(_, slot)| slot).collect()
        };

        for slot in slots {
            let _ = slot.send(Err(error()));
        }
    }

    /// Writes one length-prefixed frame, serialized against other senders.
    async fn write_frame(&self, frame: &[u8]) -> Result<(), ClientError> {
        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(ClientError::ConnectionLost);
        };

        let mut buffer = Vec::with_capacity(4 + frame.len());
        let mut header = [0u8; 4];
        NetworkEndian::write_u32(&mut header, frame.len() as u32);
        buffer.extend_from_slice(&header);
        buffer.extend_from_slice(frame);

        let written = async {
            writer.write_all(&buffer).await?;
            writer.flush().await
        }
        .await;

        match written {
            Ok(()) => {
                self.touch();
                Ok(())
            }
            Err(error) => {
                debug!(%error, "frame write failed");
                Err(ClientError::ConnectionLost)
            }
        }
    }

    async fn exchange(
        self: &Arc<Self>,
        frame: Vec<u8>,
        identifier: u8,
        timeout: Duration,
    ) -> Result<Vec<u8>, ClientError> {
        let receiver = self.register(identifier)?;

        if let Err(error) = self.write_frame(&frame).await {
            self.remove_pending(identifier);
            self.on_connection_lost().await;
            return Err(error);
        }

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(result)) => result,
            // the sender half only disappears when the session collapses
            Ok(Err(_)) => Err(ClientError::ConnectionLost),
            Err(_) => {
                // drop the slot so a late reply is discarded instead of
                // completing a request nobody is waiting on
                self.remove_pending(identifier);
                Err(ClientError::AttemptTimeout(timeout))
            }
        }
    }

    /// Single connection attempt, bounded by the connection timeout. On
    /// success the receiver and keep-alive tasks are (re)started and the
    /// reconnect budget is refilled.
    fn establish(self: &Arc<Self>) -> BoxFuture<'_, Result<(), ClientError>> {
        Box::pin(self.establish_inner())
    }

    async fn establish_inner(self: &Arc<Self>) -> Result<(), ClientError> {
        let _guard = self.connect_lock.lock().await;

        match self.state() {
            SessionState::Connected => return Ok(()),
            SessionState::Closing | SessionState::Closed => {
                return Err(ClientError::TransportClosed)
            }
            _ => {}
        }
        if self.closing.load(Ordering::SeqCst) {
            return Err(ClientError::TransportClosed);
        }
        if self.reconnect_exhausted.load(Ordering::SeqCst) {
            return Err(ClientError::ReconnectExceeded(
                self.config.max_reconnect_attempts,
            ));
        }

        self.set_state(SessionState::Connecting);
        let stream = match tokio::time::timeout(
            self.config.connection_timeout,
            self.connector.open(),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(error)) => {
                self.set_state(SessionState::Disconnected);
                debug!(%error, "connect failed");
                return Err(ClientError::ConnectionLost);
            }
            Err(_) => {
                self.set_state(SessionState::Disconnected);
                return Err(ClientError::ConnectTimeout(self.config.connection_timeout));
            }
        };

        let (reader, writer) = tokio::io::split(stream);
        *self.writer.lock().await = Some(writer);

        self.reconnect_attempts.store(0, Ordering::SeqCst);
        self.reconnect_exhausted.store(false, Ordering::SeqCst);
        self.touch();
        self.set_state(SessionState::Connected);
        debug!("stream session established");

        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(self.handle.spawn(receiver_loop(Arc::clone(self), reader)));
        if let Some(interval) = self.config.keep_alive_interval {
            tasks.push(self.handle.spawn(keepalive_loop(Arc::clone(self), interval)));
        }

        Ok(())
    }

    /// Tears the session down after an I/O failure and kicks off automatic
    /// reconnection when the configuration allows it. Only the first
    /// observer of a live session acts; later callers are no-ops.
    async fn on_connection_lost(self: &Arc<Self>) {
        let was_connected = self
            .state
            .compare_exchange(
                SessionState::Connected as u8,
                SessionState::Disconnected as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if !was_connected {
            return;
        }

        *self.writer.lock().await = None;
        self.fail_pending(|| ClientError::ConnectionLost);

        if self.config.auto_reconnect_enabled && !self.closing.load(Ordering::SeqCst) {
            debug!("connection lost, scheduling reconnect");
            let mut tasks = self.tasks.lock();
            tasks.retain(|task| !task.is_finished());
            tasks.push(self.handle.spawn(reconnect_loop(Arc::clone(self))));
        } else {
            debug!("connection lost");
        }
    }

    async fn close_session(self: &Arc<Self>) -> Result<(), ClientError> {
        if self.closing.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.set_state(SessionState::Closing);

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            task.abort();
        }

        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }

        self.fail_pending(|| ClientError::TransportClosed);
        self.set_state(SessionState::Closed);
        debug!("stream session closed");

        Ok(())
    }

    /// Drops the current connection so the next `connect` starts fresh; the
    /// closed latch stays untouched.
    async fn reset_session(self: &Arc<Self>) {
        if self.closing.load(Ordering::SeqCst) {
            return;
        }

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            task.abort();
        }

        *self.writer.lock().await = None;
        self.fail_pending(|| ClientError::ConnectionLost);
        self.reconnect_attempts.store(0, Ordering::SeqCst);
        self.reconnect_exhausted.store(false, Ordering::SeqCst);
        self.set_state(SessionState::Disconnected);
        trace!("stream session reset");
    }

    /// Picks an identifier that has no request in flight, sweeping the full
    /// 8-bit space once before giving up.
    fn next_free_identifier(&self) -> Result<u8, ClientError> {
        for _ in 0..=u8::MAX as usize {
            let identifier = self.probe.identifiers.next_identifier();
            if !self.pending.lock().contains_key(&identifier) {
                return Ok(identifier);
            }
        }

        Err(ClientError::NoFreeIdentifier)
    }

    /// One Status-Server round trip over the ordinary pending-table path.
    async fn status_probe(self: &Arc<Self>) -> Result<(), ClientError> {
        let identifier = self.next_free_identifier()?;
        let packet = Packet::new(PacketCode::StatusServer)
            .with_identifier(identifier)
            .with_message_authenticator();

        let encoded = self.probe.codec.encode_request(
            &packet,
            &self.probe.secret,
            self.probe.random.request_authenticator(),
        )?;

        let reply = self
            .exchange(
                encoded.bytes().clone(),
                identifier,
                self.config.connection_timeout,
            )
            .await?;

        self.probe
            .codec
            .decode_response(&reply, &self.probe.secret, &encoded.authenticator())?;

        Ok(())
    }
}

/// Reads frames off the connection and completes their waiters. Any read
/// error, and any frame with an impossible length, ends the session.
async fn receiver_loop<C: StreamConnector>(shared: Arc<Shared<C>>, mut reader: ReadHalf<C::Stream>) {
    loop {
        let mut header = [0u8; 4];
        if let Err(error) = reader.read_exact(&mut header).await {
            debug!(%error, "frame header read failed");
            break;
        }

        let length = NetworkEndian::read_u32(&header) as usize;
        if length == 0 || length > MAX_PACKET_LEN {
            warn!(length, "peer sent a frame with an invalid length");
            break;
        }

        let mut frame = vec![0u8; length];
        if let Err(error) = reader.read_exact(&mut frame).await {
            debug!(%error, "frame body read failed");
            break;
        }

        shared.touch();

        if frame.len() < 2 {
            trace!(length, "dropping frame too short to carry an identifier");
            continue;
        }

        let identifier = frame[1];
        let slot = shared.pending.lock().remove(&identifier);
        match slot {
            Some(sender) => {
                // a dropped receiver means the waiter timed out; the frame
                // is simply discarded
                let _ = sender.send(Ok(frame));
            }
            None => trace!(identifier, "no pending request for frame, dropping"),
        }
    }

    if !shared.closing.load(Ordering::SeqCst) {
        shared.on_connection_lost().await;
    }
}

/// Probes an idle session every interval; a failed probe takes the same
/// path as any other connection loss.
async fn keepalive_loop<C: StreamConnector>(shared: Arc<Shared<C>>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;

        if shared.closing.load(Ordering::SeqCst) || shared.state() != SessionState::Connected {
            return;
        }
        if shared.last_activity.lock().elapsed() < interval {
            continue;
        }

        match shared.status_probe().await {
            Ok(()) => trace!("keep-alive probe answered"),
            Err(error) => {
                warn!(%error, "keep-alive probe failed, dropping session");
                shared.on_connection_lost().await;
                return;
            }
        }
    }
}

/// Re-establishes a broken session, pausing between tries, until the cap is
/// hit or the session closes.
async fn reconnect_loop<C: StreamConnector>(shared: Arc<Shared<C>>) {
    loop {
        if shared.closing.load(Ordering::SeqCst) {
            return;
        }

        let attempts = shared.reconnect_attempts.load(Ordering::SeqCst);
        if attempts >= shared.config.max_reconnect_attempts {
            warn!(attempts, "giving up on automatic reconnection");
            shared.reconnect_exhausted.store(true, Ordering::SeqCst);
            return;
        }

        tokio::time::sleep(shared.config.reconnect_delay).await;
        shared.reconnect_attempts.fetch_add(1, Ordering::SeqCst);

        match shared.establish().await {
            Ok(()) => {
                debug!("automatic reconnect succeeded");
                return;
            }
            Err(error) => debug!(%error, "reconnect attempt failed"),
        }
    }
}
