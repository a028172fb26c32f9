use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};

use crate::AppState;
use crate::error::ChatError;

/// Serve the chat page. Read from disk on every request so edits show up
/// without a restart.
pub async fn index_handler(State(state): State<AppState>) -> Result<Response, ChatError> {
    let path = state.page_path.as_path();
    let body = tokio::fs::read(path)
        .await
        .map_err(|source| ChatError::PageLoad {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(([(header::CONTENT_TYPE, "text/html")], body).into_response())
}
