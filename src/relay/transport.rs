//! Request-scoped entry point to the relay
//!
//! Built fresh for every inbound request from shared handles. Nothing here
//! survives the request except what `open_stream` hands to the lifecycle.

use super::cleanup;
use super::engine::EngineFactory;
use super::error::RelayError;
use super::ingress::{parse_session_id, Ingress};
use super::lifecycle::SessionLifecycle;
use super::registry::SessionRegistry;
use super::sender::OutputSender;
use super::RelaySettings;
use crate::events::EventBus;
use crate::mailbox::{MailboxStore, Position};
use std::sync::Arc;

/// What a cancel request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// A live session held by this process is draining.
    Draining,
    /// No live session here; its records were purged directly.
    Purged(usize),
}

#[derive(Clone)]
pub struct RelayTransport {
    store: Arc<dyn MailboxStore>,
    engines: Arc<dyn EngineFactory>,
    registry: SessionRegistry,
    events: EventBus,
    settings: Arc<RelaySettings>,
}

impl RelayTransport {
    pub fn new(
        store: Arc<dyn MailboxStore>,
        engines: Arc<dyn EngineFactory>,
        registry: SessionRegistry,
        events: EventBus,
        settings: Arc<RelaySettings>,
    ) -> Self {
        Self {
            store,
            engines,
            registry,
            events,
            settings,
        }
    }

    /// Start a session and return its output sender.
    pub fn open_stream(&self, session_param: Option<&str>) -> Result<OutputSender, RelayError> {
        let session_id = parse_session_id(session_param)?;
        let lifecycle =
            SessionLifecycle::new(session_id, Arc::clone(&self.store), self.events.clone());
        let engine = self.engines.create(&session_id);
        let sender = lifecycle.start(engine, &self.settings);
        self.registry.register(lifecycle);
        Ok(sender)
    }

    pub async fn submit(
        &self,
        session_param: Option<&str>,
        body: &[u8],
    ) -> Result<Position, RelayError> {
        Ingress::new(self.store.as_ref())
            .submit(session_param, body)
            .await
    }

    pub async fn cancel(&self, session_param: Option<&str>) -> Result<CancelOutcome, RelayError> {
        let session_id = parse_session_id(session_param)?;
        if self.registry.cancel(&session_id) {
            return Ok(CancelOutcome::Draining);
        }
        let deleted = cleanup::cleanup_session(self.store.as_ref(), &session_id).await?;
        Ok(CancelOutcome::Purged(deleted))
    }
}
