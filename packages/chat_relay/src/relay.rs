//! Broadcast relay: the single task that orders joins and messages.
//!
//! Every mutation of the history log and every broadcast goes through one
//! actor, so a joining peer's replay can never race a live message: it either
//! sees a message in its replay or receives it live, never both, never neither.
//!
//! The actor never touches a socket. It only enqueues onto each connection's
//! outbound queue, so a peer that stops reading cannot hold up anyone else.

use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use ws_wire::WsError;

use crate::error::ChatError;
use crate::history::HistoryLog;
use crate::metrics::RelayMetrics;
use crate::registry::{Connection, ConnectionId, ConnectionRegistry, ConnectionState};

/// Messages that can be sent to the relay actor
enum RelayCommand {
    Join {
        connection: Arc<Connection>,
        respond_to: oneshot::Sender<Result<(), WsError>>,
    },
    Publish {
        from: ConnectionId,
        text: String,
    },
}

/// Cloneable front for the relay actor
#[derive(Clone)]
pub struct RelayHandle {
    sender: mpsc::Sender<RelayCommand>,
    registry: Arc<ConnectionRegistry>,
    history: Arc<HistoryLog>,
    metrics: Arc<RelayMetrics>,
    outbound_capacity: usize,
}

impl RelayHandle {
    /// Start the relay actor on the current runtime.
    ///
    /// `capacity` bounds queued join/publish commands; `outbound_capacity`
    /// bounds each connection's queue of undelivered frames.
    pub fn spawn(
        registry: Arc<ConnectionRegistry>,
        history: Arc<HistoryLog>,
        metrics: Arc<RelayMetrics>,
        capacity: usize,
        outbound_capacity: usize,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let actor = RelayActor {
            registry: registry.clone(),
            history: history.clone(),
            metrics: metrics.clone(),
            receiver,
        };
        tokio::spawn(actor.run());

        Self {
            sender,
            registry,
            history,
            metrics,
            outbound_capacity,
        }
    }

    /// Allocate an id and wrap the write half of a freshly upgraded stream.
    pub fn open_connection<W>(&self, writer: W) -> Arc<Connection>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let id = self.registry.allocate_id();
        Arc::new(Connection::with_capacity(
            id,
            writer,
            self.outbound_capacity,
        ))
    }

    /// Replay history to `connection`, then register it as open.
    pub async fn join(&self, connection: Arc<Connection>) -> Result<(), ChatError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(RelayCommand::Join {
                connection,
                respond_to,
            })
            .await
            .map_err(|_| ChatError::RelayClosed)?;
        response.await.map_err(|_| ChatError::RelayClosed)??;
        Ok(())
    }

    /// Queue a message for logging and broadcast.
    pub async fn publish(&self, from: ConnectionId, text: String) -> Result<(), ChatError> {
        self.sender
            .send(RelayCommand::Publish { from, text })
            .await
            .map_err(|_| ChatError::RelayClosed)
    }

    /// Unregister and close a connection after a terminal error.
    pub async fn leave(&self, id: ConnectionId) {
        retire(&self.registry, &self.metrics, id).await;
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn history(&self) -> &Arc<HistoryLog> {
        &self.history
    }

    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.metrics
    }
}

async fn retire(registry: &ConnectionRegistry, metrics: &RelayMetrics, id: ConnectionId) {
    if registry.unregister(id).await {
        metrics.connection_closed();
        info!(conn = %id, state = %ConnectionState::Closed, "connection closed");
    }
}

/// The relay actor that runs in a separate task
struct RelayActor {
    registry: Arc<ConnectionRegistry>,
    history: Arc<HistoryLog>,
    metrics: Arc<RelayMetrics>,
    receiver: mpsc::Receiver<RelayCommand>,
}

impl RelayActor {
    async fn run(mut self) {
        debug!("relay actor started");

        while let Some(command) = self.receiver.recv().await {
            match command {
                RelayCommand::Join {
                    connection,
                    respond_to,
                } => {
                    let result = self.handle_join(connection).await;
                    let _ = respond_to.send(result);
                }
                RelayCommand::Publish { from, text } => {
                    self.handle_publish(from, text).await;
                }
            }
        }

        debug!("relay actor shutting down");
    }

    async fn handle_join(&self, connection: Arc<Connection>) -> Result<(), WsError> {
        let id = connection.id();
        let backlog = self.history.snapshot().await;
        let replayed = backlog.len();
        if let Err(e) = connection.send_backlog(backlog) {
            self.metrics.write_failure();
            return Err(e);
        }
        if replayed > 0 {
            self.metrics.history_replayed(replayed);
        }

        self.registry.register(connection.clone()).await;
        connection.set_state(ConnectionState::Open);
        self.metrics.connection_opened();
        info!(conn = %id, replayed, state = %ConnectionState::Open, "connection open");
        Ok(())
    }

    async fn handle_publish(&self, from: ConnectionId, text: String) {
        let history_len = self.history.append(text.clone()).await;
        let recipients = self.registry.snapshot().await;
        debug!(
            from = %from,
            len = text.len(),
            history_len,
            recipients = recipients.len(),
            "broadcasting message"
        );

        for connection in &recipients {
            match connection.send_text(&text) {
                Ok(()) => self.metrics.frame_sent(),
                Err(e) => {
                    let id = connection.id();
                    warn!(conn = %id, error = %e, "broadcast enqueue failed, dropping connection");
                    self.metrics.write_failure();
                    retire(&self.registry, &self.metrics, id).await;
                }
            }
        }
    }
}

/// Drive one upgraded connection until it fails or is closed.
///
/// Joins the relay (history replay first), then decodes frames from `reader`
/// and publishes each message. Any decode or read error ends the connection
/// without affecting anyone else.
pub async fn serve_connection<R>(relay: RelayHandle, connection: Arc<Connection>, reader: R)
where
    R: AsyncRead + Send + Unpin,
{
    let id = connection.id();
    if let Err(e) = relay.join(connection.clone()).await {
        warn!(conn = %id, error = %e, "join failed, dropping connection");
        connection.close();
        return;
    }
    pump_messages(relay, connection, reader).await;
}

/// Read loop for a connection that has already joined.
pub async fn pump_messages<R>(relay: RelayHandle, connection: Arc<Connection>, mut reader: R)
where
    R: AsyncRead + Send + Unpin,
{
    let id = connection.id();
    loop {
        let result = tokio::select! {
            _ = connection.closed() => break,
            result = ws_wire::read_message(&mut reader) => result,
        };

        match result {
            Ok(text) => {
                relay.metrics.message_received();
                debug!(conn = %id, len = text.len(), "message received");
                if relay.publish(id, text).await.is_err() {
                    warn!(conn = %id, "relay stopped, dropping connection");
                    break;
                }
            }
            Err(e) if e.is_disconnect() => {
                debug!(conn = %id, error = %e, "peer disconnected");
                break;
            }
            Err(e @ WsError::ProtocolViolation(_)) => {
                relay.metrics.protocol_violation();
                warn!(conn = %id, error = %e, "closing connection");
                break;
            }
            Err(e) => {
                warn!(conn = %id, error = %e, code = e.error_code(), "closing connection");
                break;
            }
        }
    }

    if connection.write_failed() {
        relay.metrics.write_failure();
    }
    relay.leave(id).await;
}
