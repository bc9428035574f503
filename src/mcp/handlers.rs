//! MCP Tool handlers
//!
//! Implements the actual logic for each MCP tool.

use anyhow::{anyhow, bail, Result};
use serde_json::{json, Number, Value};
use tracing::info;

/// Handles MCP tool calls
#[derive(Debug, Default, Clone)]
pub struct ToolHandler;

impl ToolHandler {
    pub fn new() -> Self {
        Self
    }

    /// Handle a tool call and return its text output
    pub async fn handle(&self, name: &str, args: Option<Value>) -> Result<String> {
        let args = args.unwrap_or(json!({}));

        match name {
            "add" => self.add(&args),
            "register_trace" => self.register_trace(&args),
            _ => bail!("Unknown tool: {}", name),
        }
    }

    fn add(&self, args: &Value) -> Result<String> {
        let a = number_arg(args, "a")?;
        let b = number_arg(args, "b")?;

        // Integers stay integers; anything else is summed as f64
        let sum = match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a
                .checked_add(b)
                .map(Number::from)
                .ok_or_else(|| anyhow!("integer overflow"))?,
            _ => {
                let total = a.as_f64().unwrap_or_default() + b.as_f64().unwrap_or_default();
                Number::from_f64(total).ok_or_else(|| anyhow!("result is not finite"))?
            }
        };
        Ok(sum.to_string())
    }

    fn register_trace(&self, args: &Value) -> Result<String> {
        let trace = args
            .get("trace")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("trace is required"))?;
        info!(trace = %trace, "Trace registered");
        Ok(format!("Trace registered: {}", trace))
    }
}

fn number_arg<'a>(args: &'a Value, field: &str) -> Result<&'a Number> {
    match args.get(field) {
        Some(Value::Number(n)) => Ok(n),
        Some(_) => bail!("{} must be a number", field),
        None => bail!("{} is required", field),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_integers() {
        let handler = ToolHandler::new();
        let out = handler
            .handle("add", Some(json!({"a": 5, "b": 7})))
            .await
            .unwrap();
        assert_eq!(out, "12");
    }

    #[tokio::test]
    async fn test_add_floats() {
        let handler = ToolHandler::new();
        let out = handler
            .handle("add", Some(json!({"a": 1.5, "b": 2})))
            .await
            .unwrap();
        assert_eq!(out, "3.5");
    }

    #[tokio::test]
    async fn test_add_rejects_missing_or_non_numeric() {
        let handler = ToolHandler::new();
        assert!(handler.handle("add", Some(json!({"a": 1}))).await.is_err());
        assert!(handler
            .handle("add", Some(json!({"a": "1", "b": 2})))
            .await
            .is_err());
        assert!(handler.handle("add", None).await.is_err());
    }

    #[tokio::test]
    async fn test_register_trace() {
        let handler = ToolHandler::new();
        let out = handler
            .handle("register_trace", Some(json!({"trace": "x"})))
            .await
            .unwrap();
        assert_eq!(out, "Trace registered: x");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let err = ToolHandler::new().handle("nope", None).await.unwrap_err();
        assert!(err.to_string().contains("Unknown tool"));
    }
}
