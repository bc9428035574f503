//! Session relay
//!
//! Turns a sequence of short, stateless request invocations into one
//! long-lived bidirectional session. The stream-holding invocation runs the
//! engine plus a poll loop over the mailbox; any invocation can submit into
//! that mailbox.

pub mod cleanup;
pub mod engine;
mod error;
pub mod ingress;
pub mod lifecycle;
pub mod poller;
pub mod registry;
pub mod sender;
pub mod transport;

pub use cleanup::{cleanup_session, purge_all, PurgeReport};
pub use engine::{EngineChannels, EngineFactory, MessageEngine};
pub use error::RelayError;
pub use ingress::{parse_session_id, Ingress};
pub use lifecycle::{DisconnectGuard, SessionLifecycle};
pub use poller::{PollExit, PollLoop, TickOutcome};
pub use registry::SessionRegistry;
pub use sender::{endpoint_url, OutputSender};
pub use transport::{CancelOutcome, RelayTransport};

use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(5);
/// Size of the whitespace comment sent ahead of the first event.
pub const DEFAULT_PADDING_BYTES: usize = 65536;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// Timing and addressing knobs shared by every session of a process.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub poll_interval: Duration,
    pub inactivity_timeout: Duration,
    pub keep_alive: Duration,
    pub padding_bytes: usize,
    pub channel_capacity: usize,
    /// Path of the submit route, as advertised in the endpoint event.
    pub messages_path: String,
    /// Prefix added in front of `messages_path` (API gateway stage, mount point).
    pub public_base_path: String,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            inactivity_timeout: DEFAULT_INACTIVITY_TIMEOUT,
            keep_alive: DEFAULT_KEEP_ALIVE,
            padding_bytes: DEFAULT_PADDING_BYTES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            messages_path: "/messages".to_string(),
            public_base_path: String::new(),
        }
    }
}
