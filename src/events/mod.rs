//! Session lifecycle events
//!
//! - `SessionEvent`: one state transition of a session
//! - `EventBus`: broadcast channel distributing those events to observers

mod bus;
mod types;

pub use bus::EventBus;
pub use types::{DrainTrigger, EventEmitter, SessionEvent, SessionState};
