//! Session lifecycle manager
//!
//! One instance per open stream. `start` wires the channels, spawns the
//! engine and the poll loop, and hands back the output sender. `drain` is
//! the single teardown entry point: whichever trigger arrives first wins,
//! later ones are no-ops. Teardown runs as a detached task so it completes
//! even when the request that started it is gone.

use super::cleanup;
use super::engine::{EngineChannels, MessageEngine};
use super::poller::{PollExit, PollLoop};
use super::sender::OutputSender;
use super::RelaySettings;
use crate::events::{DrainTrigger, EventBus, EventEmitter, SessionEvent, SessionState};
use crate::mailbox::{MailboxStore, SessionId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct SessionLifecycle {
    session_id: SessionId,
    store: Arc<dyn MailboxStore>,
    events: EventBus,
    cancel: CancellationToken,
    drained: AtomicBool,
    state: watch::Sender<SessionState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionLifecycle {
    pub fn new(session_id: SessionId, store: Arc<dyn MailboxStore>, events: EventBus) -> Arc<Self> {
        let (state, _) = watch::channel(SessionState::Init);
        Arc::new(Self {
            session_id,
            store,
            events,
            cancel: CancellationToken::new(),
            drained: AtomicBool::new(false),
            state,
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Wire the engine to the mailbox and return the client-facing sender.
    pub fn start(
        self: &Arc<Self>,
        engine: Box<dyn MessageEngine>,
        settings: &RelaySettings,
    ) -> OutputSender {
        let (inbound_tx, inbound_rx) = mpsc::channel(settings.channel_capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(settings.channel_capacity);

        let options = engine.initialization_options();
        info!(
            session_id = %self.session_id,
            engine = %options.server_name,
            engine_version = %options.server_version,
            "Session streaming"
        );
        self.transition(SessionEvent::new(self.session_id.to_string(), SessionState::Streaming));

        // Held across both spawns so teardown cannot observe a partial list
        let mut tasks = self.lock_tasks();

        let this = Arc::clone(self);
        let cancel = self.cancel.clone();
        tasks.push(tokio::spawn(async move {
            let channels = EngineChannels {
                inbound: inbound_rx,
                outbound: outbound_tx,
            };
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                result = engine.run(channels) => result,
            };
            match result {
                Ok(()) => {
                    this.drain(DrainTrigger::EngineFinished);
                }
                Err(e) => {
                    error!(session_id = %this.session_id, error = %e, "Engine failed");
                    this.drain(DrainTrigger::EngineFailed);
                }
            }
        }));

        let this = Arc::clone(self);
        let cancel = self.cancel.clone();
        let poller = PollLoop::new(self.session_id, Arc::clone(&self.store), settings);
        tasks.push(tokio::spawn(async move {
            let exit = poller.run(&inbound_tx, &cancel).await;
            if exit == PollExit::InactivityTimeout {
                this.drain(DrainTrigger::InactivityTimeout);
            }
            // Engine sees end of input only after the trigger is recorded
            drop(inbound_tx);
        }));
        drop(tasks);

        OutputSender::new(
            self.session_id,
            outbound_rx,
            self.cancel.clone(),
            DisconnectGuard::new(Arc::clone(self)),
            settings,
        )
    }

    /// Begin teardown. Returns `true` only for the call that actually started it.
    pub fn drain(self: &Arc<Self>, trigger: DrainTrigger) -> bool {
        if self.drained.swap(true, Ordering::AcqRel) {
            debug!(session_id = %self.session_id, trigger = ?trigger, "Drain already in progress");
            return false;
        }

        info!(session_id = %self.session_id, trigger = ?trigger, "Session draining");
        self.transition(
            SessionEvent::new(self.session_id.to_string(), SessionState::Draining)
                .with_trigger(trigger),
        );
        self.cancel.cancel();

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let this = Arc::clone(self);
                runtime.spawn(async move { this.release().await });
            }
            Err(_) => {
                error!(
                    session_id = %self.session_id,
                    "No runtime to run cleanup; records left for the administrative sweep"
                );
                self.transition(SessionEvent::new(
                    self.session_id.to_string(),
                    SessionState::Closed,
                ));
            }
        }
        true
    }

    /// Resolve once the session reached `Closed`.
    pub async fn closed(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| *s == SessionState::Closed).await;
    }

    /// Wait for the engine and poll tasks, then purge the session's records.
    async fn release(&self) {
        let tasks = std::mem::take(&mut *self.lock_tasks());
        for task in tasks {
            if let Err(e) = task.await {
                if e.is_panic() {
                    warn!(session_id = %self.session_id, "Session task panicked");
                }
            }
        }

        let mut closed = SessionEvent::new(self.session_id.to_string(), SessionState::Closed);
        match cleanup::cleanup_session(self.store.as_ref(), &self.session_id).await {
            Ok(deleted) => {
                info!(session_id = %self.session_id, deleted, "Session closed");
                closed = closed.with_deleted(deleted);
            }
            Err(e) => {
                error!(
                    session_id = %self.session_id,
                    error = %e,
                    "Records left for the administrative sweep"
                );
            }
        }
        self.transition(closed);
    }

    fn transition(&self, event: SessionEvent) {
        let next = event.state;
        let moved = self.state.send_if_modified(|current| {
            if next > *current {
                *current = next;
                true
            } else {
                false
            }
        });
        if moved {
            self.events.emit(event);
        }
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Fires `ClientDisconnect` when the client-facing stream is dropped.
pub struct DisconnectGuard {
    lifecycle: Arc<SessionLifecycle>,
}

impl DisconnectGuard {
    pub(crate) fn new(lifecycle: Arc<SessionLifecycle>) -> Self {
        Self { lifecycle }
    }
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        self.lifecycle.drain(DrainTrigger::ClientDisconnect);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::{InMemoryMailbox, Position};
    use crate::mcp::{JsonRpcMessage, JsonRpcRequest, McpServer};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::time::timeout;

    fn fast_settings() -> RelaySettings {
        RelaySettings {
            poll_interval: Duration::from_millis(10),
            inactivity_timeout: Duration::from_millis(200),
            ..RelaySettings::default()
        }
    }

    struct FailingEngine;

    #[async_trait]
    impl MessageEngine for FailingEngine {
        fn initialization_options(&self) -> crate::mcp::InitializationOptions {
            McpServer::new().initialization_options()
        }

        async fn run(self: Box<Self>, _channels: EngineChannels) -> anyhow::Result<()> {
            anyhow::bail!("engine exploded")
        }
    }

    async fn wait_closed(lifecycle: &SessionLifecycle) {
        timeout(Duration::from_secs(5), lifecycle.closed())
            .await
            .expect("session did not close");
    }

    #[tokio::test]
    async fn test_idle_session_closes_with_no_records() {
        let store = Arc::new(InMemoryMailbox::new());
        let session = SessionId::generate();
        let events = EventBus::default();
        let mut rx = events.subscribe();

        let lifecycle = SessionLifecycle::new(session, store.clone(), events);
        let sender = lifecycle.start(Box::new(McpServer::new()), &fast_settings());

        wait_closed(&lifecycle).await;
        assert_eq!(lifecycle.state(), SessionState::Closed);
        assert_eq!(store.record_count(&session).await, 0);

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            seen.push((event.state, event.trigger));
        }
        assert_eq!(
            seen,
            vec![
                (SessionState::Streaming, None),
                (SessionState::Draining, Some(DrainTrigger::InactivityTimeout)),
                (SessionState::Closed, None),
            ]
        );
        drop(sender);
    }

    #[tokio::test]
    async fn test_racing_triggers_drain_once() {
        let store = Arc::new(InMemoryMailbox::new());
        let session = SessionId::generate();
        let events = EventBus::default();
        let mut rx = events.subscribe();

        let lifecycle = SessionLifecycle::new(session, store.clone(), events);
        let sender = lifecycle.start(Box::new(McpServer::new()), &fast_settings());

        let mut handles = Vec::new();
        for trigger in [
            DrainTrigger::Cancelled,
            DrainTrigger::ClientDisconnect,
            DrainTrigger::EngineFinished,
            DrainTrigger::InactivityTimeout,
        ] {
            let lifecycle = Arc::clone(&lifecycle);
            handles.push(tokio::spawn(async move { lifecycle.drain(trigger) }));
        }
        let mut started = 0;
        for handle in handles {
            if handle.await.unwrap() {
                started += 1;
            }
        }
        drop(sender);

        assert_eq!(started, 1);
        wait_closed(&lifecycle).await;

        let mut draining = 0;
        let mut closed = 0;
        while let Ok(event) = rx.try_recv() {
            match event.state {
                SessionState::Draining => draining += 1,
                SessionState::Closed => closed += 1,
                _ => {}
            }
        }
        assert_eq!((draining, closed), (1, 1));
    }

    #[tokio::test]
    async fn test_dropping_sender_is_a_client_disconnect() {
        let store = Arc::new(InMemoryMailbox::new());
        let session = SessionId::generate();
        let events = EventBus::default();
        let mut rx = events.subscribe();

        let lifecycle = SessionLifecycle::new(session, store.clone(), events);
        let settings = RelaySettings {
            inactivity_timeout: Duration::from_secs(60),
            ..fast_settings()
        };
        let sender = lifecycle.start(Box::new(McpServer::new()), &settings);
        store.insert_raw(&session, Position(1), "{garbage").await;

        drop(sender);
        wait_closed(&lifecycle).await;
        assert_eq!(store.record_count(&session).await, 0);

        let trigger = std::iter::from_fn(|| rx.try_recv().ok())
            .find(|e| e.state == SessionState::Draining)
            .and_then(|e| e.trigger);
        assert_eq!(trigger, Some(DrainTrigger::ClientDisconnect));
    }

    #[tokio::test]
    async fn test_engine_failure_tears_down() {
        let store = Arc::new(InMemoryMailbox::new());
        let session = SessionId::generate();
        let lifecycle = SessionLifecycle::new(session, store.clone(), EventBus::default());
        let settings = RelaySettings {
            inactivity_timeout: Duration::from_secs(60),
            ..fast_settings()
        };
        let _sender = lifecycle.start(Box::new(FailingEngine), &settings);

        wait_closed(&lifecycle).await;
        assert!(!lifecycle.drain(DrainTrigger::Cancelled));
    }

    #[tokio::test]
    async fn test_cleanup_only_touches_own_session() {
        let store = Arc::new(InMemoryMailbox::new());
        let mine = SessionId::generate();
        let other = SessionId::generate();
        store.append(&other, "{}").await.unwrap();

        let lifecycle = SessionLifecycle::new(mine, store.clone(), EventBus::default());
        let sender = lifecycle.start(Box::new(McpServer::new()), &fast_settings());
        let message = JsonRpcMessage::from(JsonRpcRequest::new(1, "ping", None));
        store.append(&mine, &message.to_json()).await.unwrap();

        lifecycle.drain(DrainTrigger::Cancelled);
        drop(sender);
        wait_closed(&lifecycle).await;

        assert_eq!(store.record_count(&mine).await, 0);
        assert_eq!(store.record_count(&other).await, 1);
    }

    #[tokio::test]
    async fn test_failed_cleanup_still_closes() {
        let store = Arc::new(InMemoryMailbox::new());
        let session = SessionId::generate();
        store.insert_raw(&session, Position(1), "{}").await;
        let events = EventBus::default();
        let mut rx = events.subscribe();

        let lifecycle = SessionLifecycle::new(session, store.clone(), events);
        let sender = lifecycle.start(Box::new(McpServer::new()), &fast_settings());
        store.set_available(false);

        lifecycle.drain(DrainTrigger::Cancelled);
        drop(sender);
        wait_closed(&lifecycle).await;

        // Records stay behind for the sweep
        assert_eq!(store.record_count(&session).await, 1);
        let mut closed = None;
        while let Ok(event) = rx.try_recv() {
            if event.state == SessionState::Closed {
                closed = Some(event);
            }
        }
        let closed = closed.expect("no Closed event");
        assert_eq!(closed.session_id, session.to_string());
        assert_eq!(closed.deleted, None);
    }
}
