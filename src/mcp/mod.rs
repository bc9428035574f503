//! MCP (Model Context Protocol) engine
//!
//! The processing engine that sits behind the session relay. It speaks
//! JSON-RPC 2.0 over the relay's inbound/outbound channels and exposes a
//! small set of tools.

pub mod handlers;
pub mod protocol;
pub mod server;
pub mod tools;

pub use protocol::*;
pub use server::{McpEngineFactory, McpServer};
