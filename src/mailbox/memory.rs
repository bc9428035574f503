//! In-memory implementation of MailboxStore
//!
//! Used for single-process runs and tests. Records live in a `BTreeMap` per
//! session behind an async `RwLock`, so ordering comes for free.

use super::error::StoreError;
use super::models::{MessageRecord, Position, RecordPage, SessionId, SessionPage};
use super::traits::MailboxStore;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct SessionMailbox {
    records: BTreeMap<Position, String>,
    last_assigned: Option<Position>,
}

/// In-memory mailbox with an availability switch for outage simulation.
pub struct InMemoryMailbox {
    sessions: RwLock<HashMap<SessionId, SessionMailbox>>,
    available: AtomicBool,
    appends: AtomicUsize,
    queries: AtomicUsize,
}

impl InMemoryMailbox {
    /// Create a new empty mailbox.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            appends: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
        }
    }

    /// Simulate the backend going down (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Store a payload at an explicit position, bypassing the clock and validation.
    pub async fn insert_raw(&self, session_id: &SessionId, position: Position, payload: &str) {
        let mut sessions = self.sessions.write().await;
        let mailbox = sessions.entry(*session_id).or_default();
        mailbox.records.insert(position, payload.to_string());
        mailbox.last_assigned = mailbox.last_assigned.max(Some(position));
    }

    /// Number of records currently held for `session_id`.
    pub async fn record_count(&self, session_id: &SessionId) -> usize {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|m| m.records.len())
            .unwrap_or(0)
    }

    /// Number of records across all sessions.
    pub async fn total_records(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .map(|m| m.records.len())
            .sum()
    }

    /// Successful `append` calls so far.
    pub fn append_count(&self) -> usize {
        self.appends.load(Ordering::SeqCst)
    }

    /// Successful `query_page` calls so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("in-memory mailbox switched off".into()))
        }
    }
}

impl Default for InMemoryMailbox {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MailboxStore for InMemoryMailbox {
    async fn append(&self, session_id: &SessionId, payload: &str) -> Result<Position, StoreError> {
        self.check_available()?;
        let mut sessions = self.sessions.write().await;
        let mailbox = sessions.entry(*session_id).or_default();
        let position = Position::next_after(mailbox.last_assigned, Position::now_micros());
        mailbox.records.insert(position, payload.to_string());
        mailbox.last_assigned = Some(position);
        self.appends.fetch_add(1, Ordering::SeqCst);
        Ok(position)
    }

    async fn query_page(
        &self,
        session_id: &SessionId,
        after: Position,
        limit: usize,
    ) -> Result<RecordPage, StoreError> {
        self.check_available()?;
        self.queries.fetch_add(1, Ordering::SeqCst);
        let sessions = self.sessions.read().await;
        let Some(mailbox) = sessions.get(session_id) else {
            return Ok(RecordPage::default());
        };

        let mut range = mailbox
            .records
            .range((std::ops::Bound::Excluded(after), std::ops::Bound::Unbounded));
        let records: Vec<MessageRecord> = range
            .by_ref()
            .take(limit)
            .map(|(position, payload)| MessageRecord {
                session_id: *session_id,
                position: *position,
                payload: payload.clone(),
            })
            .collect();
        let more = range.next().is_some();
        let next = if more {
            records.last().map(|r| r.position)
        } else {
            None
        };

        Ok(RecordPage { records, next })
    }

    async fn delete_batch(
        &self,
        session_id: &SessionId,
        positions: &[Position],
    ) -> Result<usize, StoreError> {
        self.check_available()?;
        let mut sessions = self.sessions.write().await;
        let Some(mailbox) = sessions.get_mut(session_id) else {
            return Ok(0);
        };
        Ok(positions
            .iter()
            .filter(|p| mailbox.records.remove(p).is_some())
            .count())
    }

    async fn forget_session(&self, session_id: &SessionId) -> Result<(), StoreError> {
        self.check_available()?;
        let mut sessions = self.sessions.write().await;
        if sessions
            .get(session_id)
            .is_some_and(|m| m.records.is_empty())
        {
            sessions.remove(session_id);
        }
        Ok(())
    }

    async fn list_sessions(
        &self,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<SessionPage, StoreError> {
        self.check_available()?;
        let start = cursor
            .as_deref()
            .map(SessionId::parse)
            .transpose()
            .map_err(|e| StoreError::Corrupt(format!("bad session cursor: {e}")))?;

        let sessions = self.sessions.read().await;
        let mut ids: Vec<SessionId> = sessions
            .keys()
            .copied()
            .filter(|id| start.map_or(true, |s| *id > s))
            .collect();
        ids.sort();

        let more = ids.len() > limit;
        ids.truncate(limit);
        let next = if more {
            ids.last().map(|id| id.to_string())
        } else {
            None
        };

        Ok(SessionPage { sessions: ids, next })
    }
}
