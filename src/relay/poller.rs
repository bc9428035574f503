//! Poll loop: mailbox to engine inbound channel
//!
//! Owns the session's read cursor and inactivity clock. Each tick asks the
//! store for everything strictly after the cursor, forwards what decodes and
//! skips what does not. The cursor advances past both, so a poisoned record
//! is never read twice.

use super::error::RelayError;
use super::RelaySettings;
use crate::mailbox::{MailboxStore, Position, SessionId};
use crate::mcp::JsonRpcMessage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of a single poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Batch processed (possibly empty).
    Polled { forwarded: usize, skipped: usize },
    /// The store failed; treated as an empty batch.
    StoreError,
    /// No forwarded message for longer than the inactivity timeout.
    InactivityExpired,
    /// The engine's inbound channel is gone.
    EngineClosed,
}

/// Why `run` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollExit {
    InactivityTimeout,
    EngineClosed,
    Cancelled,
}

pub struct PollLoop {
    session_id: SessionId,
    store: Arc<dyn MailboxStore>,
    cursor: Position,
    last_activity: Instant,
    poll_interval: Duration,
    inactivity_timeout: Duration,
}

impl PollLoop {
    pub fn new(
        session_id: SessionId,
        store: Arc<dyn MailboxStore>,
        settings: &RelaySettings,
    ) -> Self {
        Self {
            session_id,
            store,
            cursor: Position::ZERO,
            last_activity: Instant::now(),
            poll_interval: settings.poll_interval,
            inactivity_timeout: settings.inactivity_timeout,
        }
    }

    pub fn cursor(&self) -> Position {
        self.cursor
    }

    pub async fn tick(&mut self, inbound: &mpsc::Sender<JsonRpcMessage>) -> TickOutcome {
        if self.last_activity.elapsed() > self.inactivity_timeout {
            return TickOutcome::InactivityExpired;
        }

        let records = match self.store.query_after(&self.session_id, self.cursor).await {
            Ok(records) => records,
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "Mailbox poll failed");
                return TickOutcome::StoreError;
            }
        };

        let mut forwarded = 0;
        let mut skipped = 0;
        for record in records {
            if record.position <= self.cursor {
                warn!(
                    session_id = %self.session_id,
                    position = %record.position,
                    cursor = %self.cursor,
                    "Store returned a record at or before the cursor"
                );
                continue;
            }
            self.cursor = record.position;

            let message = match JsonRpcMessage::parse_str(&record.payload) {
                Ok(message) => message,
                Err(e) => {
                    let err = RelayError::DecodeFailure {
                        position: record.position,
                        reason: e.to_string(),
                    };
                    warn!(session_id = %self.session_id, error = %err, "Skipping record");
                    skipped += 1;
                    continue;
                }
            };

            if inbound.send(message).await.is_err() {
                debug!(session_id = %self.session_id, "Engine inbound closed");
                return TickOutcome::EngineClosed;
            }
            self.last_activity = Instant::now();
            forwarded += 1;
        }

        TickOutcome::Polled { forwarded, skipped }
    }

    /// Poll until cancelled, idle past the timeout, or the engine goes away.
    ///
    /// The inbound sender is borrowed so the caller decides when the engine
    /// sees end of input.
    pub async fn run(
        mut self,
        inbound: &mpsc::Sender<JsonRpcMessage>,
        cancel: &CancellationToken,
    ) -> PollExit {
        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollExit::Cancelled,
                outcome = self.tick(inbound) => outcome,
            };

            match outcome {
                TickOutcome::InactivityExpired => {
                    info!(
                        session_id = %self.session_id,
                        timeout_ms = self.inactivity_timeout.as_millis() as u64,
                        "Session inactive"
                    );
                    return PollExit::InactivityTimeout;
                }
                TickOutcome::EngineClosed => return PollExit::EngineClosed,
                TickOutcome::Polled { .. } | TickOutcome::StoreError => {}
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollExit::Cancelled,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::InMemoryMailbox;
    use crate::mcp::JsonRpcRequest;

    fn settings(poll_ms: u64, idle_ms: u64) -> RelaySettings {
        RelaySettings {
            poll_interval: Duration::from_millis(poll_ms),
            inactivity_timeout: Duration::from_millis(idle_ms),
            ..RelaySettings::default()
        }
    }

    fn ping(id: i64) -> String {
        JsonRpcMessage::from(JsonRpcRequest::new(id, "ping", None)).to_json()
    }

    #[tokio::test]
    async fn test_tick_forwards_in_order_and_advances_cursor() {
        let store = Arc::new(InMemoryMailbox::new());
        let session = SessionId::generate();
        store.append(&session, &ping(1)).await.unwrap();
        let last = store.append(&session, &ping(2)).await.unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let mut poller = PollLoop::new(session, store.clone(), &settings(10, 10_000));

        assert_eq!(
            poller.tick(&tx).await,
            TickOutcome::Polled { forwarded: 2, skipped: 0 }
        );
        assert_eq!(poller.cursor(), last);

        for expected in [1, 2] {
            match rx.recv().await.unwrap() {
                JsonRpcMessage::Request(req) => assert_eq!(req.id, Some(expected.into())),
                other => panic!("unexpected {other:?}"),
            }
        }

        // Nothing new: nothing forwarded again
        assert_eq!(
            poller.tick(&tx).await,
            TickOutcome::Polled { forwarded: 0, skipped: 0 }
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_poison_record_is_skipped_once() {
        let store = Arc::new(InMemoryMailbox::new());
        let session = SessionId::generate();
        store.insert_raw(&session, Position(10), &ping(1)).await;
        store.insert_raw(&session, Position(20), "{garbage").await;
        store.insert_raw(&session, Position(30), &ping(3)).await;

        let (tx, mut rx) = mpsc::channel(8);
        let mut poller = PollLoop::new(session, store.clone(), &settings(10, 10_000));

        assert_eq!(
            poller.tick(&tx).await,
            TickOutcome::Polled { forwarded: 2, skipped: 1 }
        );
        assert_eq!(poller.cursor(), Position(30));
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_some());

        assert_eq!(
            poller.tick(&tx).await,
            TickOutcome::Polled { forwarded: 0, skipped: 0 }
        );
    }

    #[tokio::test]
    async fn test_store_outage_is_an_empty_batch() {
        let store = Arc::new(InMemoryMailbox::new());
        let session = SessionId::generate();
        store.append(&session, &ping(1)).await.unwrap();
        store.set_available(false);

        let (tx, mut rx) = mpsc::channel(8);
        let mut poller = PollLoop::new(session, store.clone(), &settings(10, 10_000));
        assert_eq!(poller.tick(&tx).await, TickOutcome::StoreError);
        assert_eq!(poller.cursor(), Position::ZERO);

        store.set_available(true);
        assert_eq!(
            poller.tick(&tx).await,
            TickOutcome::Polled { forwarded: 1, skipped: 0 }
        );
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_closed_inbound_is_reported() {
        let store = Arc::new(InMemoryMailbox::new());
        let session = SessionId::generate();
        store.append(&session, &ping(1)).await.unwrap();

        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let mut poller = PollLoop::new(session, store, &settings(10, 10_000));
        assert_eq!(poller.tick(&tx).await, TickOutcome::EngineClosed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_after_inactivity() {
        let store = Arc::new(InMemoryMailbox::new());
        let (tx, _rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let poller = PollLoop::new(SessionId::generate(), store, &settings(100, 1_000));

        let exit = poller.run(&tx, &cancel).await;
        assert_eq!(exit, PollExit::InactivityTimeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_resets_inactivity_clock() {
        let store = Arc::new(InMemoryMailbox::new());
        let session = SessionId::generate();
        let (tx, mut rx) = mpsc::channel(8);
        let mut poller = PollLoop::new(session, store.clone(), &settings(100, 1_000));

        tokio::time::advance(Duration::from_millis(900)).await;
        store.append(&session, &ping(1)).await.unwrap();
        assert_eq!(
            poller.tick(&tx).await,
            TickOutcome::Polled { forwarded: 1, skipped: 0 }
        );
        rx.recv().await.unwrap();

        tokio::time::advance(Duration::from_millis(900)).await;
        assert!(matches!(poller.tick(&tx).await, TickOutcome::Polled { .. }));

        tokio::time::advance(Duration::from_millis(200)).await;
        assert_eq!(poller.tick(&tx).await, TickOutcome::InactivityExpired);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let store = Arc::new(InMemoryMailbox::new());
        let (tx, _rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let poller = PollLoop::new(SessionId::generate(), store, &settings(10, 60_000));

        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            token.cancel();
        });
        assert_eq!(poller.run(&tx, &cancel).await, PollExit::Cancelled);
    }
}
