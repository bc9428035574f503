//! Stream, submit and cancel endpoints

use super::handlers::{AppError, RelayState};
use crate::relay::CancelOutcome;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub session_id: Option<String>,
}

/// GET /sse?session_id=
///
/// Holds the session for as long as the response body is being read.
pub async fn open_stream(
    State(state): State<RelayState>,
    Query(query): Query<SessionQuery>,
) -> Result<Response, AppError> {
    let sender = state.transport().open_stream(query.session_id.as_deref())?;
    debug!(session_id = %sender.session_id(), endpoint = %sender.endpoint_url(), "Stream opened");
    Ok(sender.into_response())
}

/// POST {messages_path}?session_id=
///
/// 202 once the message is durable in the mailbox; processing is asynchronous.
pub async fn submit_message(
    State(state): State<RelayState>,
    Query(query): Query<SessionQuery>,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    state
        .transport()
        .submit(query.session_id.as_deref(), &body)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

/// DELETE /sessions/{session_id}
pub async fn cancel_session(
    State(state): State<RelayState>,
    Path(session_id): Path<String>,
) -> Result<Response, AppError> {
    let response = match state.transport().cancel(Some(&session_id)).await? {
        CancelOutcome::Draining => StatusCode::ACCEPTED.into_response(),
        CancelOutcome::Purged(deleted) => {
            (StatusCode::OK, Json(json!({ "deleted": deleted }))).into_response()
        }
    };
    Ok(response)
}
