//! Process-local index of live sessions
//!
//! Only sessions whose stream is held by this process are listed. Other
//! processes reach a session through the mailbox, never through here.

use super::lifecycle::SessionLifecycle;
use crate::events::DrainTrigger;
use crate::mailbox::SessionId;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<SessionId, Arc<SessionLifecycle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a started session until it closes.
    pub fn register(&self, lifecycle: Arc<SessionLifecycle>) {
        let session_id = lifecycle.session_id();
        if self
            .sessions
            .insert(session_id, Arc::clone(&lifecycle))
            .is_some()
        {
            warn!(
                session_id = %session_id,
                "Second stream opened for session; tracking the newest"
            );
        }

        let sessions = Arc::clone(&self.sessions);
        tokio::spawn(async move {
            lifecycle.closed().await;
            sessions.remove_if(&session_id, |_, current| Arc::ptr_eq(current, &lifecycle));
        });
    }

    pub fn get(&self, session_id: &SessionId) -> Option<Arc<SessionLifecycle>> {
        self.sessions.get(session_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Drain a live session. Returns `false` when it is not held here.
    pub fn cancel(&self, session_id: &SessionId) -> bool {
        match self.get(session_id) {
            Some(lifecycle) => {
                lifecycle.drain(DrainTrigger::Cancelled);
                true
            }
            None => false,
        }
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Drain every live session and wait up to `grace` for them to close.
    pub async fn drain_all(&self, grace: Duration) -> usize {
        let live: Vec<Arc<SessionLifecycle>> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        if live.is_empty() {
            return 0;
        }

        info!(sessions = live.len(), "Draining live sessions");
        for lifecycle in &live {
            lifecycle.drain(DrainTrigger::Cancelled);
        }
        let all_closed = futures::future::join_all(live.iter().map(|l| l.closed()));
        if tokio::time::timeout(grace, all_closed).await.is_err() {
            warn!("Shutdown grace period elapsed before every session closed");
        }
        live.len()
    }
}
