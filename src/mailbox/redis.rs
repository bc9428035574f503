//! Redis implementation of MailboxStore
//!
//! Layout, per session:
//! - `{prefix}:session:{id}`: sorted set, score = position,
//!   member = `"{position}:{payload}"`
//! - `{prefix}:clock:{id}`: last assigned position
//!
//! Positions are assigned inside a Lua script so the hybrid clock stays
//! monotonic even when several stateless processes append to one session.

use super::error::StoreError;
use super::models::{MessageRecord, Position, RecordPage, SessionId, SessionPage};
use super::traits::MailboxStore;
use async_trait::async_trait;
use deadpool_redis::redis::{cmd, pipe, Script};
use deadpool_redis::{Config, Pool, PoolConfig, Runtime};
use tracing::{debug, warn};

// Numbers are formatted with %d: Redis stringifies Lua numbers with 14
// significant digits, which would truncate microsecond positions.
const APPEND_SCRIPT: &str = r#"
local now = tonumber(ARGV[1])
local last = tonumber(redis.call('GET', KEYS[1]) or '0')
local pos = now
if last >= now then
    pos = last + 1
end
local encoded = string.format('%d', pos)
redis.call('SET', KEYS[1], encoded)
redis.call('ZADD', KEYS[2], encoded, encoded .. ':' .. ARGV[2])
return encoded
"#;

/// Mailbox stored in Redis sorted sets, reached through a deadpool pool.
#[derive(Clone)]
pub struct RedisMailbox {
    pool: Pool,
    prefix: String,
}

impl RedisMailbox {
    /// Build a pool for `url`. No connection is opened until first use.
    pub fn connect(url: &str, prefix: &str, pool_size: usize) -> Result<Self, StoreError> {
        let mut cfg = Config::from_url(url);
        cfg.pool = Some(PoolConfig::new(pool_size));
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self::with_pool(pool, prefix))
    }

    pub fn with_pool(pool: Pool, prefix: &str) -> Self {
        Self {
            pool,
            prefix: prefix.trim_end_matches(':').to_string(),
        }
    }

    /// Round-trip a PING to confirm the backend is reachable.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        let _: String = cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn records_key(&self, session_id: &SessionId) -> String {
        format!("{}:session:{}", self.prefix, session_id)
    }

    fn clock_key(&self, session_id: &SessionId) -> String {
        format!("{}:clock:{}", self.prefix, session_id)
    }

    /// Matches both record and clock keys, so a clock left without records
    /// is still found by the sweep.
    fn session_pattern(&self) -> String {
        format!("{}:*", self.prefix)
    }

    fn session_from_key(&self, key: &str) -> Option<SessionId> {
        let rest = key.strip_prefix(&self.prefix)?.strip_prefix(':')?;
        let raw = rest
            .strip_prefix("session:")
            .or_else(|| rest.strip_prefix("clock:"))?;
        SessionId::parse(raw).ok()
    }
}

/// Rebuild a record from a sorted-set member and its score.
///
/// The score is the position. A member without the expected `"{position}:"`
/// prefix is passed up whole, so the reader fails to decode it and skips it.
fn decode_member(session_id: &SessionId, member: &str, score: f64) -> MessageRecord {
    let position = Position(score.max(0.0) as u64);
    let prefix = format!("{}:", position.0);
    let payload = match member.strip_prefix(&prefix) {
        Some(payload) => payload.to_string(),
        None => {
            warn!(
                session_id = %session_id,
                position = %position,
                "Sorted-set member without its position prefix"
            );
            member.to_string()
        }
    };
    MessageRecord {
        session_id: *session_id,
        position,
        payload,
    }
}

#[async_trait]
impl MailboxStore for RedisMailbox {
    async fn append(&self, session_id: &SessionId, payload: &str) -> Result<Position, StoreError> {
        let mut conn = self.pool.get().await?;
        let assigned: String = Script::new(APPEND_SCRIPT)
            .key(self.clock_key(session_id))
            .key(self.records_key(session_id))
            .arg(Position::now_micros())
            .arg(payload)
            .invoke_async(&mut conn)
            .await?;
        let position = assigned
            .parse::<u64>()
            .map_err(|e| StoreError::Corrupt(format!("append returned {assigned:?}: {e}")))?;
        Ok(Position(position))
    }

    async fn query_page(
        &self,
        session_id: &SessionId,
        after: Position,
        limit: usize,
    ) -> Result<RecordPage, StoreError> {
        let mut conn = self.pool.get().await?;
        let members: Vec<(String, f64)> = cmd("ZRANGEBYSCORE")
            .arg(self.records_key(session_id))
            .arg(format!("({}", after.0))
            .arg("+inf")
            .arg("WITHSCORES")
            .arg("LIMIT")
            .arg(0)
            .arg(limit + 1)
            .query_async(&mut conn)
            .await?;

        let more = members.len() > limit;
        let records: Vec<MessageRecord> = members
            .iter()
            .take(limit)
            .map(|(member, score)| decode_member(session_id, member, *score))
            .collect();
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
        if positions.is_empty() {
            return Ok(0);
        }
        let key = self.records_key(session_id);
        let mut batch = pipe();
        batch.atomic();
        for position in positions {
            batch
                .cmd("ZREMRANGEBYSCORE")
                .arg(&key)
                .arg(position.0)
                .arg(position.0);
        }

        let mut conn = self.pool.get().await?;
        let removed: Vec<usize> = batch.query_async(&mut conn).await?;
        Ok(removed.into_iter().sum())
    }

    async fn forget_session(&self, session_id: &SessionId) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        let _: usize = cmd("DEL")
            .arg(self.clock_key(session_id))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn list_sessions(
        &self,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<SessionPage, StoreError> {
        let mut conn = self.pool.get().await?;
        let (next_cursor, keys): (String, Vec<String>) = cmd("SCAN")
            .arg(cursor.unwrap_or_else(|| "0".to_string()))
            .arg("MATCH")
            .arg(self.session_pattern())
            .arg("COUNT")
            .arg(limit)
            .query_async(&mut conn)
            .await?;

        let mut sessions = Vec::with_capacity(keys.len());
        for key in &keys {
            match self.session_from_key(key) {
                Some(id) => sessions.push(id),
                None => warn!(key = %key, "Skipping mailbox key with unparsable session id"),
            }
        }
        // Record and clock keys of one session usually land in the same page
        sessions.sort();
        sessions.dedup();
        debug!(found = sessions.len(), cursor = %next_cursor, "Scanned mailbox sessions");

        Ok(SessionPage {
            sessions,
            next: (next_cursor != "0").then_some(next_cursor),
        })
    }
}
