//! Server side of the RFC 6455 opening handshake (Section 4.2).
//!
//! ```http
//! GET /chat HTTP/1.1
//! Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==
//!
//! HTTP/1.1 101 Switching Protocols
//! Upgrade: websocket
//! Connection: Upgrade
//! Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=
//! ```
//!
//! Only the accept-token derivation lives here. Taking over the transport is
//! the caller's business since it depends on the HTTP stack in use.

use base64::Engine;
use sha1::{Digest, Sha1};

use crate::error::WsError;

/// Fixed GUID appended to the client key before hashing.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Name of the request header carrying the client nonce.
pub const KEY_HEADER: &str = "Sec-WebSocket-Key";

/// Name of the response header carrying the derived token.
pub const ACCEPT_HEADER: &str = "Sec-WebSocket-Accept";

/// Compute `base64(SHA-1(key ++ GUID))`.
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// Validate the raw `Sec-WebSocket-Key` header value.
///
/// An absent header and an empty one are treated the same way.
pub fn client_key(header: Option<&str>) -> Result<&str, WsError> {
    match header {
        Some(key) if !key.is_empty() => Ok(key),
        _ => Err(WsError::MissingHandshakeKey),
    }
}

/// The `101 Switching Protocols` answer to a valid upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    accept: String,
}

impl HandshakeResponse {
    /// Negotiate from the request's key header.
    pub fn new(key_header: Option<&str>) -> Result<Self, WsError> {
        let key = client_key(key_header)?;
        let accept = accept_key(key);
        tracing::debug!(%accept, "computed websocket accept token");
        Ok(Self { accept })
    }

    pub fn accept(&self) -> &str {
        &self.accept
    }

    /// Response headers in the order they go on the wire.
    pub fn headers(&self) -> [(&'static str, &str); 3] {
        [
            ("Upgrade", "websocket"),
            ("Connection", "Upgrade"),
            (ACCEPT_HEADER, self.accept.as_str()),
        ]
    }
}
