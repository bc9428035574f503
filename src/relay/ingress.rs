//! Ingress: validate, stamp and append one inbound message
//!
//! Runs in whatever invocation receives the submit request. It shares no
//! memory with the invocation holding the stream; the mailbox is the only
//! link between the two.

use super::error::RelayError;
use crate::mailbox::{MailboxStore, Position, SessionId};
use crate::mcp::JsonRpcMessage;
use tracing::{debug, warn};

/// Parse the session id carried by a request.
pub fn parse_session_id(raw: Option<&str>) -> Result<SessionId, RelayError> {
    let raw = raw
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| RelayError::InvalidSession("session_id required".to_string()))?;
    SessionId::parse(raw).map_err(|e| RelayError::InvalidSession(format!("{raw:?}: {e}")))
}

/// Stateless submit path.
pub struct Ingress<'a> {
    store: &'a dyn MailboxStore,
}

impl<'a> Ingress<'a> {
    pub fn new(store: &'a dyn MailboxStore) -> Self {
        Self { store }
    }

    /// Validate and append. Returns as soon as the record is persisted.
    pub async fn submit(
        &self,
        session_param: Option<&str>,
        body: &[u8],
    ) -> Result<Position, RelayError> {
        let session_id = parse_session_id(session_param)?;
        let message =
            JsonRpcMessage::parse(body).map_err(|e| RelayError::InvalidMessage(e.to_string()))?;

        let position = self
            .store
            .append(&session_id, &message.to_json())
            .await
            .map_err(|e| {
                warn!(session_id = %session_id, error = %e, "Append failed");
                RelayError::from(e)
            })?;

        debug!(session_id = %session_id, position = %position, "Message accepted");
        Ok(position)
    }
}
