//! Shared server state, error mapping and the health check

use crate::events::EventBus;
use crate::mailbox::MailboxStore;
use crate::mcp::McpEngineFactory;
use crate::relay::{EngineFactory, RelayError, RelaySettings, RelayTransport, SessionRegistry};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;

/// Shared server state
pub struct ServerState {
    pub store: Arc<dyn MailboxStore>,
    pub engines: Arc<dyn EngineFactory>,
    /// Sessions whose stream is held by this process
    pub registry: SessionRegistry,
    pub event_bus: EventBus,
    pub relay: Arc<RelaySettings>,
}

pub type RelayState = Arc<ServerState>;

impl ServerState {
    /// State serving the MCP engine over `store`.
    pub fn new(store: Arc<dyn MailboxStore>, relay: RelaySettings) -> Self {
        Self {
            store,
            engines: Arc::new(McpEngineFactory),
            registry: SessionRegistry::new(),
            event_bus: EventBus::default(),
            relay: Arc::new(relay),
        }
    }

    /// Fresh transport for one request.
    pub fn transport(&self) -> RelayTransport {
        RelayTransport::new(
            Arc::clone(&self.store),
            Arc::clone(&self.engines),
            self.registry.clone(),
            self.event_bus.clone(),
            Arc::clone(&self.relay),
        )
    }
}

// ============================================================================
// Health check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_sessions: usize,
}

pub async fn health(State(state): State<RelayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_sessions: state.registry.active_count(),
    })
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug)]
pub enum AppError {
    Internal(anyhow::Error),
    BadRequest(String),
    ServiceUnavailable(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::Internal(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<RelayError> for AppError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::InvalidSession(_) | RelayError::InvalidMessage(_) => {
                AppError::BadRequest(err.to_string())
            }
            RelayError::StoreUnavailable(_) => AppError::ServiceUnavailable(err.to_string()),
            RelayError::DecodeFailure { .. } | RelayError::CleanupFailure { .. } => {
                AppError::Internal(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::{Position, SessionId};

    #[test]
    fn test_relay_error_status_mapping() {
        let cases = [
            (RelayError::InvalidSession("x".into()), StatusCode::BAD_REQUEST),
            (RelayError::InvalidMessage("x".into()), StatusCode::BAD_REQUEST),
            (
                RelayError::StoreUnavailable("down".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                RelayError::DecodeFailure {
                    position: Position(1),
                    reason: "x".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                RelayError::CleanupFailure {
                    session_id: SessionId::generate(),
                    reason: "x".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            let response = AppError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
