//! Message transports.
//!
//! A transport is split into a [`MessageSink`] (whole messages out) and a
//! [`MessageSource`] (chunks in). A source may hand one message over in
//! several chunks; the connection's receive loop joins them until a chunk
//! marked `last`. Neither half supports overlapping use: the connection
//! gates the sink and owns the source on one task.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::trace;

use crate::error::{RpcError, RpcResult};

/// A piece of an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub data: Vec<u8>,
    /// Final chunk of the current message.
    pub last: bool,
}

impl Chunk {
    pub fn whole(data: Vec<u8>) -> Self {
        Self { data, last: true }
    }
}

/// Outbound half.
#[async_trait]
pub trait MessageSink: Send {
    /// Send one whole binary message.
    async fn send(&mut self, message: Vec<u8>) -> RpcResult<()>;

    /// Close the transport. Idempotent.
    async fn close(&mut self) -> RpcResult<()>;
}

/// Inbound half.
#[async_trait]
pub trait MessageSource: Send {
    /// Next chunk, or `None` once the transport has closed.
    async fn recv(&mut self) -> Option<RpcResult<Chunk>>;

    /// Whether the transport is open for traffic.
    fn is_open(&self) -> bool;
}

/// Both halves of one transport.
pub struct Transport {
    pub sink: Box<dyn MessageSink>,
    pub source: Box<dyn MessageSource>,
}

impl Transport {
    pub fn new(sink: Box<dyn MessageSink>, source: Box<dyn MessageSource>) -> Self {
        Self { sink, source }
    }

    pub fn is_open(&self) -> bool {
        self.source.is_open()
    }

    /// Wrap an established WebSocket.
    pub fn websocket<S>(ws: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, stream) = ws.split();
        Self {
            sink: Box::new(WsSink { sink, closed: false }),
            source: Box::new(WsSource { stream, open: true }),
        }
    }

    /// Two connected in-memory transports.
    ///
    /// With `chunk_size`, each message is delivered in pieces of at most that
    /// many bytes.
    pub fn memory_pair(chunk_size: Option<usize>) -> (Transport, Transport) {
        let closed = Arc::new(AtomicBool::new(false));
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        let a = Transport {
            sink: Box::new(MemorySink {
                tx: Some(a_tx),
                chunk_size,
                closed: closed.clone(),
            }),
            source: Box::new(MemorySource {
                rx: b_rx,
                closed: closed.clone(),
            }),
        };
        let b = Transport {
            sink: Box::new(MemorySink {
                tx: Some(b_tx),
                chunk_size,
                closed: closed.clone(),
            }),
            source: Box::new(MemorySource { rx: a_rx, closed }),
        };
        (a, b)
    }
}

// ============================================================================
// WebSocket
// ============================================================================

struct WsSink<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
    closed: bool,
}

#[async_trait]
impl<S> MessageSink for WsSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, message: Vec<u8>) -> RpcResult<()> {
        if self.closed {
            return Err(RpcError::ConnectionClosed);
        }
        self.sink.send(Message::Binary(message)).await?;
        Ok(())
    }

    async fn close(&mut self) -> RpcResult<()> {
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }
        self.sink.close().await?;
        Ok(())
    }
}

struct WsSource<S> {
    stream: SplitStream<WebSocketStream<S>>,
    open: bool,
}

#[async_trait]
impl<S> MessageSource for WsSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn recv(&mut self) -> Option<RpcResult<Chunk>> {
        loop {
            let msg = match self.stream.next().await {
                None => {
                    self.open = false;
                    return None;
                }
                Some(Err(e)) => {
                    self.open = false;
                    return Some(Err(e.into()));
                }
                Some(Ok(msg)) => msg,
            };
            match msg {
                Message::Binary(data) => return Some(Ok(Chunk::whole(data))),
                Message::Close(frame) => {
                    trace!(?frame, "websocket close frame");
                    self.open = false;
                    return None;
                }
                // Pings are answered by tungstenite; text is not part of the protocol.
                Message::Ping(_) | Message::Pong(_) | Message::Text(_) | Message::Frame(_) => {}
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

// ============================================================================
// In-memory
// ============================================================================

struct MemorySink {
    tx: Option<mpsc::UnboundedSender<Chunk>>,
    chunk_size: Option<usize>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl MessageSink for MemorySink {
    async fn send(&mut self, message: Vec<u8>) -> RpcResult<()> {
        let tx = self.tx.as_ref().ok_or(RpcError::ConnectionClosed)?;
        let chunks: Vec<Chunk> = match self.chunk_size {
            Some(size) if size > 0 && message.len() > size => {
                let pieces: Vec<&[u8]> = message.chunks(size).collect();
                let n = pieces.len();
                pieces
                    .into_iter()
                    .enumerate()
                    .map(|(i, p)| Chunk {
                        data: p.to_vec(),
                        last: i + 1 == n,
                    })
                    .collect()
            }
            _ => vec![Chunk::whole(message)],
        };
        for chunk in chunks {
            tx.send(chunk).map_err(|_| RpcError::ConnectionClosed)?;
        }
        Ok(())
    }

    async fn close(&mut self) -> RpcResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.tx = None;
        Ok(())
    }
}

struct MemorySource {
    rx: mpsc::UnboundedReceiver<Chunk>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl MessageSource for MemorySource {
    async fn recv(&mut self) -> Option<RpcResult<Chunk>> {
        self.rx.recv().await.map(Ok)
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_pair_delivers_whole_messages() {
        let (mut a, mut b) = Transport::memory_pair(None);
        a.sink.send(vec![1, 2, 3]).await.unwrap();
        assert_eq!(b.source.recv().await.unwrap().unwrap(), Chunk::whole(vec![1, 2, 3]));
        b.sink.send(vec![4]).await.unwrap();
        assert_eq!(a.source.recv().await.unwrap().unwrap().data, vec![4]);
    }

    #[tokio::test]
    async fn test_memory_pair_fragments() {
        let (mut a, mut b) = Transport::memory_pair(Some(2));
        a.sink.send(vec![1, 2, 3, 4, 5]).await.unwrap();
        let mut pieces = Vec::new();
        loop {
            let chunk = b.source.recv().await.unwrap().unwrap();
            let last = chunk.last;
            pieces.push(chunk.data);
            if last {
                break;
            }
        }
        assert_eq!(pieces, vec![vec![1, 2], vec![3, 4], vec![5]]);
    }

    #[tokio::test]
    async fn test_close_ends_both_directions() {
        let (mut a, mut b) = Transport::memory_pair(None);
        assert!(a.is_open() && b.is_open());
        a.sink.close().await.unwrap();
        assert!(!b.is_open());
        assert!(b.source.recv().await.is_none());
        assert!(a.sink.send(vec![1]).await.is_err());
    }
}
