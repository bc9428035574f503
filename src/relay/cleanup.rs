//! Mailbox cleanup
//!
//! Per-session purge used by the lifecycle manager, and the full-store sweep
//! used by the administrative reset. Both go through `MailboxStore::delete_all`
//! so they share one pagination and batch-delete path.

use super::error::RelayError;
use crate::mailbox::{MailboxStore, SessionId};
use tracing::{debug, info, warn};

/// Sessions fetched per `list_sessions` page during a sweep.
pub const SESSION_PAGE_SIZE: usize = 100;

/// Delete every record of one session. Idempotent; not retried on failure.
pub async fn cleanup_session(
    store: &dyn MailboxStore,
    session_id: &SessionId,
) -> Result<usize, RelayError> {
    debug!(session_id = %session_id, "Cleaning up session");
    store
        .delete_all(session_id)
        .await
        .map_err(|e| RelayError::CleanupFailure {
            session_id: *session_id,
            reason: e.to_string(),
        })
}

/// Outcome of a full-store sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PurgeReport {
    pub sessions: usize,
    pub records: usize,
    pub failed: Vec<SessionId>,
}

/// Every session with records or a leftover clock, across all pages.
pub async fn list_all_sessions(store: &dyn MailboxStore) -> Result<Vec<SessionId>, RelayError> {
    let mut sessions = Vec::new();
    let mut cursor = None;
    loop {
        let page = store.list_sessions(cursor, SESSION_PAGE_SIZE).await?;
        sessions.extend(page.sessions);
        match page.next {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    // Scans may report a session more than once
    sessions.sort();
    sessions.dedup();
    Ok(sessions)
}

/// Delete every record in the store, regardless of session.
pub async fn purge_all(store: &dyn MailboxStore) -> Result<PurgeReport, RelayError> {
    let sessions = list_all_sessions(store).await?;
    info!(sessions = sessions.len(), "Purging mailbox");

    let mut report = PurgeReport::default();
    for session_id in sessions {
        match cleanup_session(store, &session_id).await {
            Ok(deleted) => {
                report.sessions += 1;
                report.records += deleted;
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Session purge failed");
                report.failed.push(session_id);
            }
        }
    }

    info!(
        sessions = report.sessions,
        records = report.records,
        failed = report.failed.len(),
        "Mailbox purge complete"
    );
    Ok(report)
}
