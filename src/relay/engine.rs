//! Processing-engine seam
//!
//! The relay does not interpret messages. It hands decoded inbound messages to
//! an engine and streams whatever the engine produces back to the client.

use crate::mailbox::SessionId;
use crate::mcp::{InitializationOptions, JsonRpcMessage};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Channel ends handed to an engine for the lifetime of one session.
pub struct EngineChannels {
    /// Messages delivered by the poll loop, in mailbox order.
    pub inbound: mpsc::Receiver<JsonRpcMessage>,
    /// Messages for the client stream.
    pub outbound: mpsc::Sender<JsonRpcMessage>,
}

/// A per-session message processor.
#[async_trait]
pub trait MessageEngine: Send {
    /// Handshake data announced when the session starts streaming.
    fn initialization_options(&self) -> InitializationOptions;

    /// Consume inbound messages until the channel closes or the engine is done.
    async fn run(self: Box<Self>, channels: EngineChannels) -> anyhow::Result<()>;
}

/// Builds one engine per session.
pub trait EngineFactory: Send + Sync {
    fn create(&self, session_id: &SessionId) -> Box<dyn MessageEngine>;
}

impl<F> EngineFactory for F
where
    F: Fn(&SessionId) -> Box<dyn MessageEngine> + Send + Sync,
{
    fn create(&self, session_id: &SessionId) -> Box<dyn MessageEngine> {
        self(session_id)
    }
}
