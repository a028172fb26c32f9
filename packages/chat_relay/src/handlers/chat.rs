use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    response::Response,
};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use tracing::{debug, warn};
use ws_wire::{HandshakeResponse, WsError};

use crate::AppState;
use crate::error::ChatError;
use crate::registry::ConnectionState;
use crate::relay::{RelayHandle, serve_connection};

/// Upgrade `/chat` to a WebSocket connection.
///
/// The handshake is answered by hand: the accept key is derived from
/// `Sec-WebSocket-Key` and the raw transport is taken over once hyper has
/// flushed the `101` response.
pub async fn chat_handler(
    State(state): State<AppState>,
    mut req: Request,
) -> Result<Response, ChatError> {
    debug!(
        method = %req.method(),
        uri = %req.uri(),
        headers = ?req.headers(),
        state = %ConnectionState::Connecting,
        "upgrade request"
    );

    let key = req
        .headers()
        .get(ws_wire::handshake::KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    let handshake = HandshakeResponse::new(key)?;

    let on_upgrade = req
        .extensions_mut()
        .remove::<OnUpgrade>()
        .ok_or(WsError::UpgradeUnsupported)?;

    tokio::spawn(take_over(state.relay.clone(), on_upgrade));

    let mut response =
        axum::http::Response::builder().status(StatusCode::SWITCHING_PROTOCOLS);
    for (name, value) in handshake.headers() {
        response = response.header(name, value);
    }
    Ok(response.body(Body::empty())?)
}

async fn take_over(relay: RelayHandle, on_upgrade: OnUpgrade) {
    let upgraded = match on_upgrade.await {
        Ok(upgraded) => upgraded,
        Err(e) => {
            warn!(error = %e, "transport upgrade failed");
            return;
        }
    };

    let (reader, writer) = tokio::io::split(TokioIo::new(upgraded));
    let connection = relay.open_connection(writer);
    let id = connection.id();
    debug!(conn = %id, state = %connection.state(), "transport taken over");

    serve_connection(relay, connection, reader).await;
}
