//! Relay error taxonomy

use crate::mailbox::{Position, SessionId, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Missing or malformed session identifier. Raised before any store access.
    #[error("invalid session id: {0}")]
    InvalidSession(String),

    /// Submitted body is not a well-formed message. Nothing is written.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Transient backend failure.
    #[error("mailbox store unavailable: {0}")]
    StoreUnavailable(String),

    /// A stored record could not be decoded. The record is skipped.
    #[error("undecodable record at position {position}: {reason}")]
    DecodeFailure { position: Position, reason: String },

    /// Cleanup did not complete; records may be left behind.
    #[error("cleanup of session {session_id} failed: {reason}")]
    CleanupFailure {
        session_id: SessionId,
        reason: String,
    },
}

impl From<StoreError> for RelayError {
    fn from(err: StoreError) -> Self {
        RelayError::StoreUnavailable(err.to_string())
    }
}

impl RelayError {
    /// True for errors caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RelayError::InvalidSession(_) | RelayError::InvalidMessage(_)
        )
    }
}
