//! Transport abstraction and the TCP implementation
//!
//! The pipeline core only needs a way to move bytes to and from a peer;
//! address resolution, reconnection and retry policy belong to whoever
//! constructs the `Transport`. Frames on a stream transport are delimited
//! by a 4-byte big-endian length prefix:
//!
//! ```text
//! [4 bytes: length (big-endian)][N bytes: frame]
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use parking_lot::RwLock;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};

use beacon_protocol::MAX_FRAME_SIZE;

use crate::{PipelineError, Result};

/// Length prefix size (4 bytes, big-endian u32)
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Peer identity within a process (daemon:0, leader, sub:17, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId(Arc<str>);

impl PeerId {
    /// The identity as a string
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(Arc::from(s.as_str()))
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Byte-level connection to one peer
///
/// Implementations must deliver each `send` as one framed message and
/// return exactly one framed message per `recv`, in order, at least once
/// per connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one framed message
    async fn send(&self, bytes: Bytes) -> Result<()>;

    /// Receive the next framed message
    async fn recv(&self) -> Result<Bytes>;
}

/// Write one length-prefixed frame to a stream
pub async fn write_frame_bytes<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) -> Result<()> {
    let len = bytes.len() as u32;
    writer
        .write_all(&len.to_be_bytes())
        .await
        .map_err(PipelineError::transport)?;
    writer
        .write_all(bytes)
        .await
        .map_err(PipelineError::transport)?;
    writer.flush().await.map_err(PipelineError::transport)?;
    Ok(())
}

/// Read one length-prefixed frame from a stream
///
/// `buf` carries partial reads across calls; callers keep one buffer per
/// connection. Returns `ConnectionClosed` on clean EOF at a frame
/// boundary.
pub async fn read_frame_bytes<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut BytesMut,
) -> Result<Bytes> {
    loop {
        if buf.len() >= LENGTH_PREFIX_SIZE {
            let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
            if len > MAX_FRAME_SIZE {
                return Err(PipelineError::TransportFailure(format!(
                    "frame length {len} exceeds maximum {MAX_FRAME_SIZE}"
                )));
            }
            if buf.len() >= LENGTH_PREFIX_SIZE + len {
                buf.advance(LENGTH_PREFIX_SIZE);
                return Ok(buf.split_to(len).freeze());
            }
        }
        let read = reader
            .read_buf(buf)
            .await
            .map_err(PipelineError::transport)?;
        if read == 0 {
            return Err(PipelineError::ConnectionClosed);
        }
    }
}

/// TCP transport with length-prefixed framing
///
/// Reader and writer halves are independently locked so a blocked send
/// never prevents receiving and vice versa.
pub struct TcpTransport {
    reader: Mutex<(tokio::net::tcp::OwnedReadHalf, BytesMut)>,
    writer: Mutex<tokio::net::tcp::OwnedWriteHalf>,
}

impl TcpTransport {
    /// Wrap an established connection
    pub fn new(stream: TcpStream) -> Self {
        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: Mutex::new((read_half, BytesMut::with_capacity(64 * 1024))),
            writer: Mutex::new(write_half),
        }
    }

    /// Connect to a peer address
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(PipelineError::transport)?;
        Ok(Self::new(stream))
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, bytes: Bytes) -> Result<()> {
        let mut writer = self.writer.lock().await;
        write_frame_bytes(&mut *writer, &bytes).await
    }

    async fn recv(&self) -> Result<Bytes> {
        let mut guard = self.reader.lock().await;
        let (reader, buf) = &mut *guard;
        read_frame_bytes(reader, buf).await
    }
}

/// In-process transport over channels, for tests and loopback wiring
pub struct ChannelTransport {
    tx: mpsc::Sender<Bytes>,
    rx: Mutex<mpsc::Receiver<Bytes>>,
}

impl ChannelTransport {
    /// Create a connected pair; what one side sends the other receives
    pub fn pair(capacity: usize) -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::channel(capacity);
        let (b_tx, b_rx) = mpsc::channel(capacity);
        (
            Self {
                tx: a_tx,
                rx: Mutex::new(b_rx),
            },
            Self {
                tx: b_tx,
                rx: Mutex::new(a_rx),
            },
        )
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, bytes: Bytes) -> Result<()> {
        self.tx
            .send(bytes)
            .await
            .map_err(|_| PipelineError::ConnectionClosed)
    }

    async fn recv(&self) -> Result<Bytes> {
        self.rx
            .lock()
            .await
            .recv()
            .await
            .ok_or(PipelineError::ConnectionClosed)
    }
}

/// Registry of transports to this process's peers
///
/// Owned by the surrounding process and injected into the core; the
/// pipeline only looks connections up, it never creates them.
#[derive(Default)]
pub struct SocketSet {
    sockets: RwLock<HashMap<PeerId, Arc<dyn Transport>>>,
}

impl SocketSet {
    /// Create an empty socket set
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for a peer, replacing any prior one
    pub fn register(&self, peer: PeerId, transport: Arc<dyn Transport>) {
        self.sockets.write().insert(peer, transport);
    }

    /// Look up a peer's connection
    pub fn get(&self, peer: &PeerId) -> Option<Arc<dyn Transport>> {
        self.sockets.read().get(peer).cloned()
    }

    /// Remove a peer's connection
    pub fn remove(&self, peer: &PeerId) -> Option<Arc<dyn Transport>> {
        self.sockets.write().remove(peer)
    }

    /// All registered peers
    pub fn peers(&self) -> Vec<PeerId> {
        self.sockets.read().keys().cloned().collect()
    }

    /// Drop all connections
    pub fn clear(&self) {
        self.sockets.write().clear();
    }
}
