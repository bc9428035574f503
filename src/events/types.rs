//! Session lifecycle event types

use serde::{Deserialize, Serialize};

/// Lifecycle state of one stream-holding session.
///
/// Ordered: a session only ever moves forward through these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Init,
    Streaming,
    Draining,
    Closed,
}

/// What started a session's teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainTrigger {
    InactivityTimeout,
    ClientDisconnect,
    EngineFinished,
    EngineFailed,
    Cancelled,
}

/// A state transition of a session
///
/// Must be Clone for `tokio::sync::broadcast`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub session_id: String,
    pub state: SessionState,
    /// Set on the transition into `Draining`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<DrainTrigger>,
    /// Records removed by cleanup, set on the transition into `Closed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<usize>,
    /// ISO 8601 timestamp
    pub timestamp: String,
}

impl SessionEvent {
    pub fn new(session_id: impl Into<String>, state: SessionState) -> Self {
        Self {
            session_id: session_id.into(),
            state,
            trigger: None,
            deleted: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_trigger(mut self, trigger: DrainTrigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn with_deleted(mut self, deleted: usize) -> Self {
        self.deleted = Some(deleted);
        self
    }
}

/// Sink for session events. Emitting must never block or fail.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: SessionEvent);

    fn emit_state(&self, session_id: &str, state: SessionState) {
        self.emit(SessionEvent::new(session_id, state));
    }
}
