use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use ws_wire::WsError;

/// Unique identifier for an upgraded connection
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Lifecycle of a peer: `Connecting → Handshaking → Open → Closed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// HTTP request received, nothing validated yet
    Connecting = 0,
    /// Transport taken over, history not yet replayed
    Handshaking = 1,
    /// Registered and receiving broadcasts
    Open = 2,
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Handshaking,
            2 => Self::Open,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Handshaking => "handshaking",
            Self::Open => "open",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Outbound queue depth used when none is configured.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

/// How long a closing writer waits for the transport to shut down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// One queued unit of outbound work.
#[derive(Debug)]
enum Outbound {
    Text(String),
    /// History replay, written back to back before any live message.
    Backlog(Vec<String>),
}

/// Identity and outbound queue of an upgraded stream.
///
/// The read side belongs to the connection's read loop. The write side is
/// owned by a dedicated writer task that drains the queue in order, so a slow
/// peer only ever backs up its own queue. Enqueueing never waits: a full or
/// closed queue is reported as a write failure.
pub struct Connection {
    id: ConnectionId,
    state: AtomicU8,
    outbound: mpsc::Sender<Outbound>,
    closed: CancellationToken,
    write_failed: Arc<AtomicBool>,
}

impl Connection {
    /// Wrap `writer` and spawn its writer task. Must be called inside a
    /// tokio runtime.
    pub fn new<W>(id: ConnectionId, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::with_capacity(id, writer, DEFAULT_OUTBOUND_CAPACITY)
    }

    pub fn with_capacity<W>(id: ConnectionId, writer: W, capacity: usize) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (outbound, queue) = mpsc::channel(capacity.max(1));
        let closed = CancellationToken::new();
        let write_failed = Arc::new(AtomicBool::new(false));
        tokio::spawn(drain_outbound(
            id,
            writer,
            queue,
            closed.clone(),
            write_failed.clone(),
        ));

        Self {
            id,
            state: AtomicU8::new(ConnectionState::Handshaking as u8),
            outbound,
            closed,
            write_failed,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Queue `text` for delivery as a server frame.
    pub fn send_text(&self, text: &str) -> Result<(), WsError> {
        self.enqueue(Outbound::Text(text.to_owned()))
    }

    /// Queue the history replay. Counts as a single queue slot.
    pub fn send_backlog(&self, entries: Vec<String>) -> Result<(), WsError> {
        if entries.is_empty() {
            return Ok(());
        }
        self.enqueue(Outbound::Backlog(entries))
    }

    fn enqueue(&self, item: Outbound) -> Result<(), WsError> {
        if self.is_closed() {
            return Err(WsError::StreamWriteFailure(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "connection closed",
            )));
        }
        self.outbound.try_send(item).map_err(|e| {
            let (kind, reason) = match e {
                TrySendError::Full(_) => (io::ErrorKind::WouldBlock, "outbound queue full"),
                TrySendError::Closed(_) => (io::ErrorKind::BrokenPipe, "writer stopped"),
            };
            WsError::StreamWriteFailure(io::Error::new(kind, reason))
        })
    }

    /// Mark closed and stop the read loop and the writer task. Frames still
    /// queued are dropped.
    pub fn close(&self) {
        self.set_state(ConnectionState::Closed);
        self.closed.cancel();
    }

    /// Resolves once the connection is closed or its writer has failed.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// True once the writer task gave up on a failed write.
    pub fn write_failed(&self) -> bool {
        self.write_failed.load(Ordering::Acquire)
    }
}

async fn drain_outbound<W>(
    id: ConnectionId,
    mut writer: W,
    mut queue: mpsc::Receiver<Outbound>,
    closed: CancellationToken,
    write_failed: Arc<AtomicBool>,
) where
    W: AsyncWrite + Send + Unpin,
{
    loop {
        let item = tokio::select! {
            _ = closed.cancelled() => break,
            item = queue.recv() => match item {
                Some(item) => item,
                None => break,
            },
        };
        let result = tokio::select! {
            _ = closed.cancelled() => break,
            result = write_outbound(&mut writer, item) => result,
        };
        if let Err(e) = result {
            warn!(conn = %id, error = %e, "write failed, closing connection");
            write_failed.store(true, Ordering::Release);
            closed.cancel();
            break;
        }
    }

    match tokio::time::timeout(SHUTDOWN_GRACE, writer.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(conn = %id, error = %e, "shutdown after close failed"),
        Err(_) => debug!(conn = %id, "shutdown after close timed out"),
    }
}

async fn write_outbound<W>(writer: &mut W, item: Outbound) -> Result<(), WsError>
where
    W: AsyncWrite + Unpin,
{
    match item {
        Outbound::Text(text) => ws_wire::write_text(writer, &text).await,
        Outbound::Backlog(entries) => {
            for text in &entries {
                ws_wire::write_text(writer, text).await?;
            }
            Ok(())
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

/// The set of live connections.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    next_id: AtomicU64,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn allocate_id(&self) -> ConnectionId {
        ConnectionId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    pub async fn register(&self, connection: Arc<Connection>) {
        let id = connection.id();
        self.connections.write().await.insert(id, connection);
        debug!(conn = %id, "registered");
    }

    /// Remove and close a connection. Returns false if it was already gone.
    pub async fn unregister(&self, id: ConnectionId) -> bool {
        let removed = self.connections.write().await.remove(&id);
        match removed {
            Some(connection) => {
                connection.close();
                debug!(conn = %id, "unregistered");
                true
            }
            None => false,
        }
    }

    /// Current members in join order.
    pub async fn snapshot(&self) -> Vec<Arc<Connection>> {
        let mut members: Vec<_> = self.connections.read().await.values().cloned().collect();
        members.sort_by_key(|c| c.id());
        members
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}
