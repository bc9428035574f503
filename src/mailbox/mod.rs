//! Mailbox store: per-session ordered records on top of an external store
//!
//! The mailbox is the only durable state of the relay. Ingress appends to it
//! and the poll loop reads from it; cleanup empties it on teardown.

mod error;
pub mod memory;
pub mod models;
pub mod redis;
pub mod traits;

pub use error::StoreError;
pub use memory::InMemoryMailbox;
pub use models::{MessageRecord, Position, RecordPage, SessionId, SessionPage};
pub use redis::RedisMailbox;
pub use traits::{MailboxStore, DELETE_BATCH_SIZE, QUERY_PAGE_SIZE};
