//! HTTP surface of the relay

pub mod handlers;
pub mod routes;
pub mod sse_handlers;

pub use handlers::{AppError, RelayState, ServerState};
pub use routes::create_router;
