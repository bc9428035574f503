//! Mailbox data model

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque session token, always a well-formed UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Parse a client-supplied token. Accepts hyphenated and simple (hex) forms.
    pub fn parse(raw: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(raw.trim()).map(Self)
    }

    /// Generate a fresh random session id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Simple (hex, no hyphens) form used in submission URLs.
    pub fn simple(&self) -> String {
        self.0.simple().to_string()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl From<Uuid> for SessionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Per-session ordering key, in microseconds since the Unix epoch.
///
/// Positions are assigned by a hybrid clock: wall-clock time when it moves
/// forward, otherwise one past the last assigned position.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Position(pub u64);

impl Position {
    pub const ZERO: Position = Position(0);

    /// Next position for a session whose last assigned position is `last`.
    pub fn next_after(last: Option<Position>, now_micros: u64) -> Position {
        match last {
            Some(Position(prev)) if prev >= now_micros => Position(prev + 1),
            _ => Position(now_micros),
        }
    }

    /// Current wall-clock time in microseconds.
    pub fn now_micros() -> u64 {
        chrono::Utc::now().timestamp_micros().max(0) as u64
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One inbound message persisted in the mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub session_id: SessionId,
    pub position: Position,
    /// Serialized application message, validated at ingress.
    pub payload: String,
}

/// One page of records returned by `query_page`.
#[derive(Debug, Clone, Default)]
pub struct RecordPage {
    pub records: Vec<MessageRecord>,
    /// Exclusive start for the following page; `None` when the scan is complete.
    pub next: Option<Position>,
}

/// One page of session ids returned by `list_sessions`.
#[derive(Debug, Clone, Default)]
pub struct SessionPage {
    pub sessions: Vec<SessionId>,
    /// Opaque continuation token; `None` when the scan is complete.
    pub next: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_accepts_both_forms() {
        let id = SessionId::generate();
        let from_hyphenated = SessionId::parse(&id.to_string()).unwrap();
        let from_simple = SessionId::parse(&id.simple()).unwrap();
        assert_eq!(from_hyphenated, id);
        assert_eq!(from_simple, id);
        assert_eq!(id.simple().len(), 32);
    }

    #[test]
    fn test_session_id_rejects_garbage() {
        assert!(SessionId::parse("").is_err());
        assert!(SessionId::parse("abc123").is_err());
        assert!(SessionId::parse("not-a-uuid-at-all-really-not").is_err());
    }

    #[test]
    fn test_position_follows_wall_clock_when_it_advances() {
        assert_eq!(Position::next_after(None, 1_000), Position(1_000));
        assert_eq!(Position::next_after(Some(Position(500)), 1_000), Position(1_000));
    }

    #[test]
    fn test_position_strictly_increases_on_clock_collision() {
        // Same microsecond twice, then a clock that went backwards
        let first = Position::next_after(None, 1_000);
        let second = Position::next_after(Some(first), 1_000);
        let third = Position::next_after(Some(second), 900);
        assert!(first < second);
        assert!(second < third);
        assert_eq!(third, Position(1_002));
    }

    #[test]
    fn test_position_serializes_as_integer() {
        let json = serde_json::to_string(&Position(42)).unwrap();
        assert_eq!(json, "42");
    }
}
