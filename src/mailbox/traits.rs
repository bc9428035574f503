//! MailboxStore trait definition
//!
//! Defines the abstract interface over the external ordered key-value store.
//! Backends implement the primitive page/batch operations; the full-scan
//! operations (`query_after`, `delete_all`) are provided on top of them so
//! every backend paginates the same way.

use super::error::StoreError;
use super::models::{MessageRecord, Position, RecordPage, SessionId, SessionPage};
use async_trait::async_trait;
use tracing::debug;

/// Records fetched per `query_page` call.
pub const QUERY_PAGE_SIZE: usize = 100;

/// Records removed per `delete_batch` call (batch-write limit of the reference store).
pub const DELETE_BATCH_SIZE: usize = 25;

/// Append-only per-session ordered records.
#[async_trait]
pub trait MailboxStore: Send + Sync {
    /// Persist `payload` for `session_id` and return its position.
    ///
    /// The returned position is strictly greater than every position this
    /// store previously assigned to the same session.
    async fn append(&self, session_id: &SessionId, payload: &str) -> Result<Position, StoreError>;

    /// Fetch at most `limit` records with position > `after`, ascending.
    async fn query_page(
        &self,
        session_id: &SessionId,
        after: Position,
        limit: usize,
    ) -> Result<RecordPage, StoreError>;

    /// Delete the listed records. Missing records are ignored.
    async fn delete_batch(
        &self,
        session_id: &SessionId,
        positions: &[Position],
    ) -> Result<usize, StoreError>;

    /// Drop any per-session bookkeeping kept next to the records (position clock).
    async fn forget_session(&self, session_id: &SessionId) -> Result<(), StoreError>;

    /// Enumerate sessions owning records or per-session bookkeeping, one page
    /// at a time.
    async fn list_sessions(
        &self,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<SessionPage, StoreError>;

    /// All records with position > `cursor`, as one ascending sequence.
    async fn query_after(
        &self,
        session_id: &SessionId,
        cursor: Position,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let mut records = Vec::new();
        let mut after = cursor;
        loop {
            let page = self.query_page(session_id, after, QUERY_PAGE_SIZE).await?;
            records.extend(page.records);
            match page.next {
                // A continuation that does not move forward would loop forever
                Some(next) if next > after => after = next,
                _ => break,
            }
        }
        Ok(records)
    }

    /// Delete every record of `session_id`. A no-op on an empty session.
    async fn delete_all(&self, session_id: &SessionId) -> Result<usize, StoreError> {
        let positions: Vec<Position> = self
            .query_after(session_id, Position::ZERO)
            .await?
            .into_iter()
            .map(|r| r.position)
            .collect();

        let mut deleted = 0;
        for batch in positions.chunks(DELETE_BATCH_SIZE) {
            deleted += self.delete_batch(session_id, batch).await?;
        }
        self.forget_session(session_id).await?;

        debug!(session_id = %session_id, deleted, "Mailbox emptied");
        Ok(deleted)
    }
}
