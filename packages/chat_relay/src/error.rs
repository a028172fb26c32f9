use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::path::PathBuf;
use tracing::{debug, error};
use ws_wire::WsError;

/// Errors surfaced by the relay and its HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error(transparent)]
    Wire(#[from] WsError),

    #[error("failed to load page {}: {source}", path.display())]
    PageLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build response: {0}")]
    Response(#[from] axum::http::Error),

    #[error("relay is not running")]
    RelayClosed,
}

impl ChatError {
    pub fn status(&self) -> StatusCode {
        match self {
            ChatError::Wire(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        } else {
            debug!(error = %self, "request rejected");
        }
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_bad_request() {
        let err = ChatError::from(WsError::MissingHandshakeKey);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn upgrade_unsupported_is_server_error() {
        let err = ChatError::from(WsError::UpgradeUnsupported);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn page_load_is_server_error() {
        let err = ChatError::PageLoad {
            path: PathBuf::from("missing.html"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().starts_with("failed to load page missing.html"));
    }

    #[test]
    fn into_response_keeps_status() {
        let resp = ChatError::RelayClosed.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
