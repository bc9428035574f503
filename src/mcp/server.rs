//! MCP Server implementation
//!
//! Implements the MCP server that communicates over the relay's channels
//! using JSON-RPC 2.0. One server instance serves one session.

use super::handlers::ToolHandler;
use super::protocol::*;
use super::tools::all_tools;
use crate::mailbox::SessionId;
use crate::relay::engine::{EngineChannels, EngineFactory, MessageEngine};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "mailbox-relay";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// MCP Server that handles JSON-RPC 2.0 requests for one session
pub struct McpServer {
    tool_handler: ToolHandler,
    initialized: bool,
}

impl McpServer {
    pub fn new() -> Self {
        Self {
            tool_handler: ToolHandler::new(),
            initialized: false,
        }
    }

    /// Handle a single JSON-RPC message, returning the reply if one is due
    pub async fn handle_message(&mut self, message: JsonRpcMessage) -> Option<JsonRpcMessage> {
        let request = match message {
            JsonRpcMessage::Request(request) => request,
            JsonRpcMessage::Response(response) => {
                // The server never issues requests, so there is nothing to correlate
                debug!("Ignoring client response for id {}", response.id);
                return None;
            }
        };

        // Get the request ID (notifications have no ID)
        let id = match &request.id {
            Some(id) => id.clone(),
            None => {
                self.handle_notification(&request);
                return None;
            }
        };

        let result = self.handle_request(&request).await;

        Some(
            match result {
                Ok(value) => JsonRpcResponse::success(id, value),
                Err(error) => JsonRpcResponse::error(id, error),
            }
            .into(),
        )
    }

    /// Handle a notification (no response expected)
    fn handle_notification(&mut self, request: &JsonRpcRequest) {
        match request.method.as_str() {
            "notifications/initialized" => {
                info!("Client confirmed initialization");
            }
            "notifications/cancelled" => {
                warn!("Request cancelled by client");
            }
            _ => {
                debug!("Unknown notification: {}", request.method);
            }
        }
    }

    /// Handle a request and return the result or error
    async fn handle_request(&mut self, request: &JsonRpcRequest) -> Result<Value, JsonRpcError> {
        match request.method.as_str() {
            "initialize" => self.handle_initialize(&request.params),
            "ping" => Ok(json!({})),
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(&request.params).await,
            _ => Err(JsonRpcError::method_not_found(&request.method)),
        }
    }

    fn handle_initialize(&mut self, params: &Option<Value>) -> Result<Value, JsonRpcError> {
        let params: InitializeParams = params
            .as_ref()
            .map(|p| serde_json::from_value(p.clone()))
            .transpose()
            .map_err(|e| JsonRpcError::invalid_params(e.to_string()))?
            .unwrap_or(InitializeParams {
                protocol_version: PROTOCOL_VERSION.to_string(),
                capabilities: ClientCapabilities::default(),
                client_info: None,
            });

        info!(
            "Initializing MCP server (client protocol: {})",
            params.protocol_version
        );

        if let Some(ref client) = params.client_info {
            info!(
                "Client: {} v{}",
                client.name,
                client.version.as_deref().unwrap_or("unknown")
            );
        }

        self.initialized = true;

        let options = self.initialization_options();
        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: options.capabilities,
            server_info: ServerInfo {
                name: options.server_name,
                version: options.server_version,
            },
        };

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(e.to_string()))
    }

    fn handle_tools_list(&self) -> Result<Value, JsonRpcError> {
        if !self.initialized {
            return Err(JsonRpcError::invalid_request("Server not initialized"));
        }

        let result = ToolsListResult { tools: all_tools() };
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(e.to_string()))
    }

    async fn handle_tools_call(&self, params: &Option<Value>) -> Result<Value, JsonRpcError> {
        if !self.initialized {
            return Err(JsonRpcError::invalid_request("Server not initialized"));
        }

        let params: ToolCallParams = params
            .clone()
            .ok_or_else(|| JsonRpcError::invalid_params("params required"))
            .and_then(|p| {
                serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(e.to_string()))
            })?;

        info!("Tool call: {}", params.name);
        debug!("Arguments: {:?}", params.arguments);

        let tool_result = match self.tool_handler.handle(&params.name, params.arguments).await {
            Ok(text) => ToolCallResult::success(text),
            Err(e) => {
                error!("Tool error: {}", e);
                ToolCallResult::error(e.to_string())
            }
        };

        serde_json::to_value(tool_result).map_err(|e| JsonRpcError::internal_error(e.to_string()))
    }
}

impl Default for McpServer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageEngine for McpServer {
    fn initialization_options(&self) -> InitializationOptions {
        InitializationOptions {
            server_name: SERVER_NAME.to_string(),
            server_version: SERVER_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: ToolsCapability {
                    list_changed: false,
                },
            },
        }
    }

    async fn run(mut self: Box<Self>, mut channels: EngineChannels) -> Result<()> {
        info!("MCP engine starting");

        while let Some(message) = channels.inbound.recv().await {
            if let Some(reply) = self.handle_message(message).await {
                if channels.outbound.send(reply).await.is_err() {
                    debug!("Outbound stream closed, stopping engine");
                    break;
                }
            }
        }

        info!("MCP engine shutting down");
        Ok(())
    }
}

/// Creates a fresh [`McpServer`] for every session
#[derive(Debug, Default, Clone, Copy)]
pub struct McpEngineFactory;

impl EngineFactory for McpEngineFactory {
    fn create(&self, session_id: &SessionId) -> Box<dyn MessageEngine> {
        debug!(session_id = %session_id, "Creating MCP engine");
        Box::new(McpServer::new())
    }
}
