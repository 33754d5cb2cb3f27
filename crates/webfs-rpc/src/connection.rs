//! Peer connections.
//!
//! A [`PeerConnection`] owns one transport. One task runs the receive loop;
//! every outbound message (calls, replies, the `Ready` signal) goes through
//! a single async mutex, so writes never overlap and leave in the order
//! callers acquired the gate.
//!
//! ```text
//!   callers ──call()──▶ [send gate] ──▶ sink ════════▶ remote
//!      ▲                     ▲
//!      │ oneshot             │ reply
//!   pending map ◀── Reply ── receive loop ◀══ source ◀══ remote
//!                            │
//!                            └── Call ──▶ spawn(handler) ─┘
//! ```
//!
//! Lifecycle only moves forward:
//! `Connecting → Open → Ready → Closing → Closed`. The connection sends its
//! own `Ready` as soon as the loop runs and becomes `Ready` when the remote's
//! arrives. If that takes longer than the handshake timeout the connection
//! closes itself. Closing fails every pending call.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use webfs_types::{NtStatus, PeerIdentity};

use crate::codec::{ArgList, Element, LazyElementList};
use crate::constants::{
    CALL_TIMEOUT, HANDSHAKE_TIMEOUT, MAX_MESSAGE_SIZE, MAX_PROTOCOL_ERRORS, SEND_TIMEOUT,
};
use crate::error::{ProtocolError, RpcError, RpcResult};
use crate::frame::Frame;
use crate::transport::{MessageSink, MessageSource, Transport};

// ============================================================================
// Identity and state
// ============================================================================

/// Opaque unique token for one connection.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// First 8 hex characters, for logs.
    pub fn short(&self) -> String {
        self.0.as_simple().to_string()[..8].to_string()
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short())
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({})", self.short())
    }
}

/// Connection lifecycle. Ordered; transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConnectionState {
    Connecting,
    Open,
    Ready,
    Closing,
    Closed,
}

/// Tunables for one connection.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub handshake_timeout: Duration,
    pub call_timeout: Duration,
    /// Bound on acquiring the send gate plus writing one message.
    pub send_timeout: Duration,
    pub max_protocol_errors: u32,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            handshake_timeout: HANDSHAKE_TIMEOUT,
            call_timeout: CALL_TIMEOUT,
            send_timeout: SEND_TIMEOUT,
            max_protocol_errors: MAX_PROTOCOL_ERRORS,
        }
    }
}

// ============================================================================
// Inbound call handling
// ============================================================================

/// Answers inbound calls. Each call runs on its own task.
#[async_trait]
pub trait CallHandler: Send + Sync {
    /// Handle one call. `Ok(None)` is a success with no payload.
    async fn handle_call(&self, method: &str, args: LazyElementList) -> Result<Option<Element>, NtStatus>;
}

/// Handler for a side that never serves calls.
pub struct RejectCalls;

#[async_trait]
impl CallHandler for RejectCalls {
    async fn handle_call(&self, method: &str, _args: LazyElementList) -> Result<Option<Element>, NtStatus> {
        debug!(method, "rejecting inbound call");
        Err(NtStatus::NotImplemented)
    }
}

struct Reply {
    status: NtStatus,
    payload: Option<Element>,
}

// ============================================================================
// PeerConnection
// ============================================================================

/// One live transport to a peer.
pub struct PeerConnection {
    id: ConnectionId,
    identity: PeerIdentity,
    display_url: String,
    when_connected: SystemTime,
    options: ConnectionOptions,
    state: watch::Sender<ConnectionState>,
    send_gate: AsyncMutex<Box<dyn MessageSink>>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Reply>>>,
    next_call_id: AtomicU64,
    handler: Arc<dyn CallHandler>,
    cancel: CancellationToken,
}

impl PeerConnection {
    /// Start a connection over an open transport.
    ///
    /// Spawns the receive loop (which sends our `Ready` first) and the
    /// handshake watchdog. Must be called inside a tokio runtime.
    pub fn start(
        transport: Transport,
        identity: PeerIdentity,
        display_url: impl Into<String>,
        handler: Arc<dyn CallHandler>,
        options: ConnectionOptions,
    ) -> RpcResult<Arc<Self>> {
        if !transport.is_open() {
            return Err(RpcError::NotOpen);
        }
        let Transport { sink, source } = transport;
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let conn = Arc::new(Self {
            id: ConnectionId::new(),
            identity,
            display_url: display_url.into(),
            when_connected: SystemTime::now(),
            options,
            state,
            send_gate: AsyncMutex::new(sink),
            pending: Mutex::new(HashMap::new()),
            next_call_id: AtomicU64::new(1),
            handler,
            cancel: CancellationToken::new(),
        });
        conn.advance(ConnectionState::Open);
        info!(conn = %conn.id, peer = %conn.identity, "connection open");

        tokio::spawn(conn.clone().receive_loop(source));
        tokio::spawn(conn.clone().handshake_watchdog());
        Ok(conn)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn identity(&self) -> &PeerIdentity {
        &self.identity
    }

    pub fn display_url(&self) -> &str {
        &self.display_url
    }

    pub fn when_connected(&self) -> SystemTime {
        self.when_connected
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Resolve once the handshake finished (`true`) or the connection
    /// closed without it (`false`).
    pub async fn when_ready(&self) -> bool {
        let mut rx = self.state.subscribe();
        match rx.wait_for(|s| *s >= ConnectionState::Ready).await {
            Ok(s) => *s == ConnectionState::Ready,
            Err(_) => false,
        }
    }

    /// Resolve once the connection is fully closed.
    pub async fn closed(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| *s == ConnectionState::Closed).await;
    }

    /// Ask the connection to close. Idempotent; teardown runs on the
    /// receive loop.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            debug!(conn = %self.id, "close requested");
        }
        self.cancel.cancel();
    }

    /// Number of calls awaiting replies.
    pub fn pending_calls(&self) -> usize {
        self.pending.lock().len()
    }

    fn advance(&self, next: ConnectionState) -> bool {
        let moved = self.state.send_if_modified(|cur| {
            if next > *cur {
                *cur = next;
                true
            } else {
                false
            }
        });
        if moved {
            trace!(conn = %self.id, ?next, "state");
        }
        moved
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    /// Send one message through the gate. Waiting for the gate counts
    /// against `send_timeout`, and closing the connection abandons the
    /// send. A transport failure or timeout closes the connection.
    async fn send_message(&self, message: Vec<u8>) -> RpcResult<()> {
        let limit = self.options.send_timeout;
        let send = async {
            let mut sink = self.send_gate.lock().await;
            sink.send(message).await
        };
        let result = tokio::select! {
            _ = self.cancel.cancelled() => return Err(RpcError::ConnectionClosed),
            sent = tokio::time::timeout(limit, send) => match sent {
                Ok(result) => result,
                Err(_) => Err(RpcError::timeout("send", limit)),
            },
        };
        if let Err(e) = &result {
            warn!(conn = %self.id, "send failed: {e}");
            self.close();
        }
        result
    }

    /// Call `method` on the remote and wait for its reply.
    ///
    /// Returns the reply payload for a success, `RpcError::Remote` for a
    /// failure status, and `Timeout`/`ConnectionClosed` when no reply comes.
    pub async fn call(&self, method: &str, args: ArgList) -> RpcResult<Option<Element>> {
        if self.state() >= ConnectionState::Closing {
            return Err(RpcError::ConnectionClosed);
        }
        let call_id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        let message = Frame::encode_call(call_id, method, &args)?;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(call_id, tx);

        // The deadline covers the send as well as the reply.
        let exchange = async {
            self.send_message(message).await?;
            trace!(conn = %self.id, call_id, method, "call sent");
            tokio::select! {
                reply = rx => reply.map_err(|_| RpcError::ConnectionClosed),
                _ = self.cancel.cancelled() => Err(RpcError::ConnectionClosed),
            }
        };
        let reply = match tokio::time::timeout(self.options.call_timeout, exchange).await {
            Ok(reply) => reply,
            Err(_) => Err(RpcError::timeout("call", self.options.call_timeout)),
        };
        if reply.is_err() {
            self.pending.lock().remove(&call_id);
        }
        let reply = reply?;
        if reply.status.is_success() {
            Ok(reply.payload)
        } else {
            Err(RpcError::Remote(reply.status))
        }
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    async fn handshake_watchdog(self: Arc<Self>) {
        let timeout = self.options.handshake_timeout;
        let mut rx = self.state.subscribe();
        let reached = tokio::time::timeout(timeout, rx.wait_for(|s| *s >= ConnectionState::Ready)).await;
        if reached.is_err() {
            warn!(conn = %self.id, peer = %self.identity, ?timeout, "handshake timed out");
            self.close();
        }
    }

    async fn receive_loop(self: Arc<Self>, mut source: Box<dyn MessageSource>) {
        if let Err(e) = self.send_message(Frame::encode_ready()).await {
            debug!(conn = %self.id, "could not send ready: {e}");
        }

        let mut buffer: Vec<u8> = Vec::new();
        let mut protocol_errors = 0u32;
        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => break,
                next = source.recv() => next,
            };
            let chunk = match next {
                None => {
                    debug!(conn = %self.id, "transport closed by remote");
                    break;
                }
                Some(Err(e)) => {
                    warn!(conn = %self.id, "receive failed: {e}");
                    break;
                }
                Some(Ok(chunk)) => chunk,
            };

            buffer.extend_from_slice(&chunk.data);
            if buffer.len() > MAX_MESSAGE_SIZE {
                let size = buffer.len();
                buffer.clear();
                if self.protocol_error(&mut protocol_errors, ProtocolError::TooLarge(size)) {
                    break;
                }
                continue;
            }
            if !chunk.last {
                continue;
            }
            let message = std::mem::take(&mut buffer);
            match Frame::parse(&message) {
                Ok(frame) => {
                    protocol_errors = 0;
                    self.dispatch(frame);
                }
                Err(e) => {
                    if self.protocol_error(&mut protocol_errors, e) {
                        break;
                    }
                }
            }
        }
        self.shutdown().await;
    }

    /// Record a bad message; true when the connection should give up.
    fn protocol_error(&self, count: &mut u32, error: ProtocolError) -> bool {
        *count += 1;
        warn!(conn = %self.id, count = *count, "dropping message: {error}");
        *count >= self.options.max_protocol_errors
    }

    fn dispatch(self: &Arc<Self>, frame: Frame) {
        match frame {
            Frame::Ready => {
                if self.advance(ConnectionState::Ready) {
                    info!(conn = %self.id, peer = %self.identity, "connection ready");
                }
            }
            Frame::Call {
                call_id,
                method,
                args,
            } => {
                let conn = self.clone();
                tokio::spawn(async move {
                    let handled = std::panic::AssertUnwindSafe(conn.handler.handle_call(&method, args))
                        .catch_unwind()
                        .await;
                    let (status, payload) = match handled {
                        Ok(Ok(payload)) => (NtStatus::Success, payload),
                        Ok(Err(status)) => (status, None),
                        Err(_) => {
                            warn!(conn = %conn.id, method, "handler panicked");
                            (NtStatus::Unsuccessful, None)
                        }
                    };
                    match Frame::encode_reply(call_id, status, payload) {
                        Ok(reply) => {
                            let _ = conn.send_message(reply).await;
                        }
                        Err(e) => warn!(conn = %conn.id, method, "could not encode reply: {e}"),
                    }
                });
            }
            Frame::Reply {
                call_id,
                status,
                payload,
            } => match self.pending.lock().remove(&call_id) {
                Some(tx) => {
                    let _ = tx.send(Reply { status, payload });
                }
                None => debug!(conn = %self.id, call_id, "reply for unknown call"),
            },
        }
    }

    async fn shutdown(&self) {
        self.advance(ConnectionState::Closing);
        self.cancel.cancel();
        let limit = self.options.send_timeout;
        let close = async {
            let mut sink = self.send_gate.lock().await;
            sink.close().await
        };
        match tokio::time::timeout(limit, close).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => trace!(conn = %self.id, "close: {e}"),
            Err(_) => debug!(conn = %self.id, "transport close stalled; abandoning it"),
        }
        let failed: Vec<_> = self.pending.lock().drain().collect();
        if !failed.is_empty() {
            debug!(conn = %self.id, count = failed.len(), "failing pending calls");
        }
        drop(failed);
        self.advance(ConnectionState::Closed);
        info!(conn = %self.id, peer = %self.identity, "connection closed");
    }
}

impl fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerConnection")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("state", &self.state())
            .finish()
    }
}
