//! MCP Tool definitions

use super::protocol::{InputSchema, ToolDefinition};
use serde_json::json;

/// Generate all tool definitions
pub fn all_tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "add".to_string(),
            description: "Add two numbers".to_string(),
            input_schema: InputSchema {
                schema_type: "object".to_string(),
                properties: Some(json!({
                    "a": {"type": "number"},
                    "b": {"type": "number"}
                })),
                required: Some(vec!["a".to_string(), "b".to_string()]),
            },
        },
        ToolDefinition {
            name: "register_trace".to_string(),
            description: "Register a trace from the client".to_string(),
            input_schema: InputSchema {
                schema_type: "object".to_string(),
                properties: Some(json!({
                    "trace": {"type": "string"}
                })),
                required: Some(vec!["trace".to_string()]),
            },
        },
    ]
}
