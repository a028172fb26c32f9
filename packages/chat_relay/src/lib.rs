//! Chat Relay - broadcast chat over a hand-rolled WebSocket engine
//!
//! Serves a single HTML page at `/`, upgrades `/chat` to a WebSocket, and
//! relays every text message to every open connection. Joining peers first
//! receive the full message history.

use axum::{Router, routing::get};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::{MakeSpan, TraceLayer};
use uuid::Uuid;

pub mod config;
pub mod error;
pub mod handlers;
pub mod history;
pub mod metrics;
pub mod registry;
pub mod relay;

use crate::config::ServerConfig;
use crate::history::HistoryLog;
use crate::metrics::RelayMetrics;
use crate::registry::ConnectionRegistry;
use crate::relay::RelayHandle;

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

#[derive(Clone)]
pub struct AppState {
    pub relay: RelayHandle,
    pub page_path: Arc<PathBuf>,
}

impl AppState {
    /// Spawn a fresh relay with empty history. Must be called inside a
    /// tokio runtime.
    pub fn new(
        page_path: impl Into<PathBuf>,
        command_capacity: usize,
        outbound_capacity: usize,
    ) -> Self {
        let relay = RelayHandle::spawn(
            Arc::new(ConnectionRegistry::new()),
            Arc::new(HistoryLog::new()),
            Arc::new(RelayMetrics::new()),
            command_capacity,
            outbound_capacity,
        );
        Self {
            relay,
            page_path: Arc::new(page_path.into()),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.page_path.clone(),
            config.command_capacity,
            config.outbound_capacity,
        )
    }
}

/// All routes with request tracing applied.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index_handler))
        .route("/chat", get(handlers::chat_handler))
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .with_state(state)
}
