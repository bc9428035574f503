//! API route definitions

use super::handlers::{self, RelayState};
use super::sse_handlers;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the relay router
pub fn create_router(state: RelayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let messages_path = state.relay.messages_path.clone();

    Router::new()
        .route("/health", get(handlers::health))
        .route("/sse", get(sse_handlers::open_stream))
        .route(&messages_path, post(sse_handlers::submit_message))
        .route(
            "/sessions/{session_id}",
            delete(sse_handlers::cancel_session),
        )
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
