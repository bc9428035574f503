//! JSON-RPC 2.0 and MCP wire types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const JSONRPC_VERSION: &str = "2.0";

// ============================================================================
// JSON-RPC envelope
// ============================================================================

/// A request, or a notification when `id` is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id: Some(id.into()),
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id: None,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// A result or error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error(detail: impl Into<String>) -> Self {
        Self::new(-32700, format!("Parse error: {}", detail.into()))
    }

    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self::new(-32600, format!("Invalid request: {}", detail.into()))
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(-32601, format!("Method not found: {}", method))
    }

    pub fn invalid_params(detail: impl Into<String>) -> Self {
        Self::new(-32602, format!("Invalid params: {}", detail.into()))
    }

    pub fn internal_error(detail: impl Into<String>) -> Self {
        Self::new(-32603, format!("Internal error: {}", detail.into()))
    }
}

/// Any JSON-RPC message that may travel through the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Response(JsonRpcResponse),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("not valid JSON-RPC: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unsupported jsonrpc version {0:?}")]
    Version(String),

    #[error("{0}")]
    Shape(&'static str),
}

impl JsonRpcMessage {
    /// Decode and validate a message from raw bytes.
    pub fn parse(raw: &[u8]) -> Result<Self, ProtocolError> {
        let message: JsonRpcMessage = serde_json::from_slice(raw)?;
        message.validate()?;
        Ok(message)
    }

    /// Decode and validate a message from a stored string.
    pub fn parse_str(raw: &str) -> Result<Self, ProtocolError> {
        Self::parse(raw.as_bytes())
    }

    fn validate(&self) -> Result<(), ProtocolError> {
        let version = match self {
            JsonRpcMessage::Request(req) => &req.jsonrpc,
            JsonRpcMessage::Response(resp) => &resp.jsonrpc,
        };
        if version != JSONRPC_VERSION {
            return Err(ProtocolError::Version(version.clone()));
        }
        match self {
            JsonRpcMessage::Request(req) if req.method.is_empty() => {
                Err(ProtocolError::Shape("request method is empty"))
            }
            JsonRpcMessage::Response(resp) if resp.result.is_some() == resp.error.is_some() => {
                Err(ProtocolError::Shape("response must carry exactly one of result or error"))
            }
            _ => Ok(()),
        }
    }

    /// Compact JSON encoding.
    pub fn to_json(&self) -> String {
        // Serializing these types cannot fail: every field is JSON-native.
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl From<JsonRpcRequest> for JsonRpcMessage {
    fn from(req: JsonRpcRequest) -> Self {
        JsonRpcMessage::Request(req)
    }
}

impl From<JsonRpcResponse> for JsonRpcMessage {
    fn from(resp: JsonRpcResponse) -> Self {
        JsonRpcMessage::Response(resp)
    }
}

// ============================================================================
// MCP lifecycle
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientCapabilities {
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: ClientCapabilities,
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    pub list_changed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerCapabilities {
    pub tools: ToolsCapability,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    pub server_info: ServerInfo,
}

/// What an engine announces about itself when a session starts.
#[derive(Debug, Clone, PartialEq)]
pub struct InitializationOptions {
    pub server_name: String,
    pub server_version: String,
    pub capabilities: ServerCapabilities,
}

// ============================================================================
// Tools
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsListResult {
    pub tools: Vec<ToolDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    pub content: Vec<ContentItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ToolCallResult {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem {
                content_type: "text".to_string(),
                text: text.into(),
            }],
            is_error: None,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem {
                content_type: "text".to_string(),
                text: text.into(),
            }],
            is_error: Some(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_request_and_notification() {
        let msg = JsonRpcMessage::parse(br#"{"jsonrpc":"2.0","method":"tools/list","id":2}"#)
            .unwrap();
        match msg {
            JsonRpcMessage::Request(req) => {
                assert_eq!(req.method, "tools/list");
                assert!(!req.is_notification());
            }
            other => panic!("expected request, got {:?}", other),
        }

        let msg =
            JsonRpcMessage::parse(br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
                .unwrap();
        assert!(matches!(msg, JsonRpcMessage::Request(ref r) if r.is_notification()));
    }

    #[test]
    fn test_parse_response() {
        let msg = JsonRpcMessage::parse(br#"{"jsonrpc":"2.0","id":7,"result":{}}"#).unwrap();
        assert!(matches!(msg, JsonRpcMessage::Response(_)));

        let msg = JsonRpcMessage::parse(
            br#"{"jsonrpc":"2.0","id":7,"error":{"code":-32601,"message":"nope"}}"#,
        )
        .unwrap();
        assert!(matches!(msg, JsonRpcMessage::Response(ref r) if r.error.is_some()));
    }

    #[test]
    fn test_rejects_malformed_messages() {
        assert!(JsonRpcMessage::parse(b"not json").is_err());
        assert!(JsonRpcMessage::parse(br#"{"op":"add","a":5,"b":7}"#).is_err());
        assert!(matches!(
            JsonRpcMessage::parse(br#"{"jsonrpc":"1.0","method":"ping","id":1}"#),
            Err(ProtocolError::Version(_))
        ));
        assert!(matches!(
            JsonRpcMessage::parse(br#"{"jsonrpc":"2.0","id":1}"#),
            Err(ProtocolError::Malformed(_)) | Err(ProtocolError::Shape(_))
        ));
        assert!(JsonRpcMessage::parse(br#"{"jsonrpc":"2.0","method":"","id":1}"#).is_err());
    }

    #[test]
    fn test_to_json_omits_absent_fields() {
        let msg: JsonRpcMessage = JsonRpcResponse::success(json!(1), json!({"ok": true})).into();
        let encoded = msg.to_json();
        assert!(encoded.contains("\"result\""));
        assert!(!encoded.contains("\"error\""));
        assert_eq!(JsonRpcMessage::parse_str(&encoded).unwrap(), msg);
    }

    #[test]
    fn test_tool_call_result_error_flag() {
        let value = serde_json::to_value(ToolCallResult::error("boom")).unwrap();
        assert_eq!(value["isError"], json!(true));
        assert_eq!(value["content"][0]["type"], "text");
        let value = serde_json::to_value(ToolCallResult::success("12")).unwrap();
        assert!(value.get("isError").is_none());
    }
}
