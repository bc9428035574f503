//! Store-level errors

use thiserror::Error;

/// Failures surfaced by a [`MailboxStore`](super::MailboxStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or rejected the operation.
    #[error("mailbox store unavailable: {0}")]
    Unavailable(String),

    /// An entry in the store could not be interpreted as a mailbox record.
    #[error("corrupt mailbox entry: {0}")]
    Corrupt(String),
}

impl From<deadpool_redis::PoolError> for StoreError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

impl From<deadpool_redis::redis::RedisError> for StoreError {
    fn from(err: deadpool_redis::redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}
