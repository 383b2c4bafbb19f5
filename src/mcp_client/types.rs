//! Shared types for the MCP client.
//!
//! JSON-RPC 2.0 message types, MCP protocol structures, and the normalized
//! result shapes returned by the `ClientManager`.

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use super::errors::{FailureKind, McpError};

// ─── JSON-RPC 2.0 ───────────────────────────────────────────────────────────

/// JSON-RPC 2.0 request message.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: u64, method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response message (success or error).
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[allow(dead_code)]
    #[serde(default)]
    pub jsonrpc: String,
    pub id: u64,
    pub result: Option<serde_json::Value>,
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

// ─── Server Configuration ────────────────────────────────────────────────────

/// Identity and connection info for one remote tool server.
///
/// Unknown fields are rejected so that typos in a config file surface at
/// registration time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub name: String,
    #[serde(alias = "address")]
    pub url: String,
    #[serde(default)]
    pub description: String,
}

impl ServerConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

// ─── MCP Protocol Types ──────────────────────────────────────────────────────

/// A tool advertised by a server in its `tools/list` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, alias = "inputSchema")]
    pub input_schema: serde_json::Value,
}

/// One page of a `tools/list` response.
#[derive(Debug, Clone, Deserialize)]
pub struct ListToolsPage {
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
    #[serde(default, alias = "nextCursor")]
    pub next_cursor: Option<String>,
}

/// Raw `tools/call` result as sent by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct CallToolResponse {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default, alias = "isError")]
    pub is_error: bool,
    #[serde(default, alias = "structuredContent")]
    pub structured_content: Option<serde_json::Value>,
}

/// A content item inside a `tools/call` result. Only text is interpreted.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

// ─── Normalized Results ──────────────────────────────────────────────────────

/// Error payload of a failed call: what went wrong and where it originated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallFailure {
    pub classification: FailureKind,
    pub message: String,
}

impl From<McpError> for CallFailure {
    fn from(err: McpError) -> Self {
        let classification = err.kind();
        let message = match err {
            // Remote application failures are relayed verbatim.
            McpError::ToolError { message, .. } => message,
            other => other.to_string(),
        };
        Self {
            classification,
            message,
        }
    }
}

/// Normalized outcome of any tool invocation.
///
/// Serializes as `{"status": "ok", "result": ...}` or
/// `{"status": "error", "classification": ..., "message": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolCallResult {
    Ok { result: serde_json::Value },
    Error(CallFailure),
}

impl ToolCallResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, ToolCallResult::Ok { .. })
    }

    pub fn is_error(&self) -> bool {
        !self.is_ok()
    }

    /// The success payload, if any.
    pub fn result(&self) -> Option<&serde_json::Value> {
        match self {
            ToolCallResult::Ok { result } => Some(result),
            ToolCallResult::Error(_) => None,
        }
    }

    /// The failure payload, if any.
    pub fn failure(&self) -> Option<&CallFailure> {
        match self {
            ToolCallResult::Ok { .. } => None,
            ToolCallResult::Error(failure) => Some(failure),
        }
    }

    pub fn classification(&self) -> Option<FailureKind> {
        self.failure().map(|f| f.classification)
    }
}

impl From<Result<serde_json::Value, McpError>> for ToolCallResult {
    fn from(outcome: Result<serde_json::Value, McpError>) -> Self {
        match outcome {
            Ok(result) => ToolCallResult::Ok { result },
            Err(e) => ToolCallResult::Error(e.into()),
        }
    }
}

// ─── Health ──────────────────────────────────────────────────────────────────

/// Result of probing one server.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub name: String,
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Tool names the server advertised during the probe.
    pub tools: Vec<String>,
    pub latency_ms: u64,
    pub checked_at: DateTime<Utc>,
}

/// Health of every registered server, in registration order.
///
/// Serializes as a JSON object keyed by server name.
#[derive(Debug, Clone, Default)]
pub struct HealthReport {
    statuses: Vec<HealthStatus>,
}

impl HealthReport {
    pub fn new(statuses: Vec<HealthStatus>) -> Self {
        Self { statuses }
    }

    pub fn get(&self, name: &str) -> Option<&HealthStatus> {
        self.statuses.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HealthStatus> {
        self.statuses.iter()
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    pub fn all_reachable(&self) -> bool {
        self.statuses.iter().all(|s| s.reachable)
    }
}

impl Serialize for HealthReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.statuses.len()))?;
        for status in &self.statuses {
            map.serialize_entry(&status.name, status)?;
        }
        map.end()
    }
}

// ─── Standard MCP Error Codes ────────────────────────────────────────────────

/// Well-known JSON-RPC error codes.
pub mod error_codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i32 = -32700;
    /// The JSON sent is not a valid Request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_rpc_request_serialization() {
        let req = JsonRpcRequest::new(1, "tools/list", None);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"method\":\"tools/list\""));
        assert!(!json.contains("params"));
    }

    #[test]
    fn test_json_rpc_error_response() {
        let json = r#"{
            "jsonrpc": "2.0",
            "id": 2,
            "error": {"code": -32601, "message": "Method not found"}
        }"#;
        let resp: JsonRpcResponse = serde_json::from_str(json).unwrap();
        let err = resp.error.unwrap();
        assert_eq!(err.code, error_codes::METHOD_NOT_FOUND);
        assert!(resp.result.is_none());
    }

    #[test]
    fn test_server_config_accepts_address_alias() {
        let json = r#"{"name": "Doc", "address": "http://localhost:8001/sse"}"#;
        let config: ServerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.url, "http://localhost:8001/sse");
        assert!(config.description.is_empty());
    }

    #[test]
    fn test_server_config_rejects_unknown_fields() {
        let json = r#"{"name": "Doc", "url": "http://x/sse", "transport": "sse"}"#;
        let err = serde_json::from_str::<ServerConfig>(json).unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn test_tool_descriptor_input_schema_alias() {
        let json = r#"{"name": "ping", "inputSchema": {"type": "object"}}"#;
        let tool: ToolDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(tool.input_schema["type"], "object");
        assert!(tool.description.is_none());
    }

    #[test]
    fn test_tool_call_result_ok_shape() {
        let result = ToolCallResult::Ok {
            result: serde_json::json!({"chunks": 3}),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["result"]["chunks"], 3);
        assert!(json.get("classification").is_none());
    }

    #[test]
    fn test_tool_call_result_error_shape() {
        let result: ToolCallResult = Err(McpError::ConnectionFailed {
            server: "Doc".into(),
            reason: "connection refused".into(),
        })
        .into();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["classification"], "ConnectionFailure");
        assert!(json["message"].as_str().unwrap().contains("connection refused"));
        assert!(json.get("result").is_none());
    }

    #[test]
    fn test_tool_error_message_is_verbatim() {
        let failure = CallFailure::from(McpError::ToolError {
            server: "Doc".into(),
            tool: "process_document".into(),
            message: "Unsupported file type: xyz".into(),
        });
        assert_eq!(failure.classification, FailureKind::ToolError);
        assert_eq!(failure.message, "Unsupported file type: xyz");
    }

    #[test]
    fn test_tool_call_result_round_trips() {
        let json = r#"{"status":"error","classification":"Timeout","message":"slow"}"#;
        let result: ToolCallResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.classification(), Some(FailureKind::Timeout));
        assert!(result.result().is_none());
    }

    #[test]
    fn test_health_report_serializes_as_map() {
        let status = |name: &str, reachable: bool| HealthStatus {
            name: name.to_string(),
            reachable,
            detail: None,
            tools: vec![],
            latency_ms: 1,
            checked_at: Utc::now(),
        };
        let report = HealthReport::new(vec![status("B", true), status("A", false)]);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["B"]["reachable"], true);
        assert_eq!(json["A"]["reachable"], false);
        assert!(!report.all_reachable());
        let names: Vec<&str> = report.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);
    }
}
