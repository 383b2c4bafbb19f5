//! Tool invocation contract on top of a [`Session`].
//!
//! Turns raw `tools/call` and `tools/list` exchanges into payloads or
//! classified [`McpError`]s.

use std::time::Duration;

use super::errors::McpError;
use super::transport::Session;
use super::types::{CallToolResponse, ListToolsPage, ToolDescriptor};

/// Upper bound on `tools/list` pages followed for one listing.
const MAX_TOOL_PAGES: usize = 64;

const UNKNOWN_TOOL_PREFIX: &str = "unknown tool:";

/// Invoke `tool` with `arguments` and return its payload.
pub async fn invoke_tool(
    session: &dyn Session,
    tool: &str,
    arguments: serde_json::Map<String, serde_json::Value>,
    timeout: Duration,
) -> Result<serde_json::Value, McpError> {
    let params = serde_json::json!({
        "name": tool,
        "arguments": arguments,
    });

    let raw = session
        .request("tools/call", Some(params), timeout)
        .await
        .map_err(|e| classify_rpc_error(session.server_name(), tool, e))?;

    interpret_call_response(session.server_name(), tool, raw)
}

/// List every tool the server exposes, following pagination cursors.
pub async fn fetch_tools(
    session: &dyn Session,
    timeout: Duration,
) -> Result<Vec<ToolDescriptor>, McpError> {
    let mut tools = Vec::new();
    let mut cursor: Option<String> = None;

    for _ in 0..MAX_TOOL_PAGES {
        let params = cursor
            .as_ref()
            .map(|c| serde_json::json!({ "cursor": c }));
        let raw = session.request("tools/list", params, timeout).await?;

        let page: ListToolsPage =
            serde_json::from_value(raw).map_err(|e| McpError::ProtocolError {
                server: session.server_name().to_string(),
                reason: format!("failed to parse tools/list response: {e}"),
            })?;

        tools.extend(page.tools);
        match page.next_cursor {
            Some(next) if !next.is_empty() => cursor = Some(next),
            _ => return Ok(tools),
        }
    }

    Err(McpError::ProtocolError {
        server: session.server_name().to_string(),
        reason: format!("tools/list did not terminate after {MAX_TOOL_PAGES} pages"),
    })
}

/// Reclassify a JSON-RPC error from `tools/call`.
fn classify_rpc_error(server: &str, tool: &str, err: McpError) -> McpError {
    match err {
        McpError::ServerError { code, message, .. } => {
            if reports_unknown_tool(&message) {
                McpError::ToolNotFound {
                    server: server.to_string(),
                    tool: tool.to_string(),
                    reason: message,
                }
            } else {
                McpError::ToolError {
                    server: server.to_string(),
                    tool: tool.to_string(),
                    message: format!("[{code}] {message}"),
                }
            }
        }
        other => other,
    }
}

/// MCP servers reject calls to unregistered tools with `Unknown tool: <name>`.
/// Failures raised inside a tool are worded differently and stay tool errors.
fn reports_unknown_tool(message: &str) -> bool {
    message
        .trim_start()
        .get(..UNKNOWN_TOOL_PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(UNKNOWN_TOOL_PREFIX))
}

/// Interpret a `tools/call` result.
pub fn interpret_call_response(
    server: &str,
    tool: &str,
    raw: serde_json::Value,
) -> Result<serde_json::Value, McpError> {
    let response: CallToolResponse =
        serde_json::from_value(raw).map_err(|e| McpError::ProtocolError {
            server: server.to_string(),
            reason: format!("failed to parse tools/call response: {e}"),
        })?;

    let texts: Vec<&str> = response
        .content
        .iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text.as_deref())
        .collect();

    if response.is_error {
        let message = texts.join("\n");
        if reports_unknown_tool(&message) {
            return Err(McpError::ToolNotFound {
                server: server.to_string(),
                tool: tool.to_string(),
                reason: message,
            });
        }
        return Err(McpError::ToolError {
            server: server.to_string(),
            tool: tool.to_string(),
            message,
        });
    }

    let payload = match (response.structured_content, texts.first()) {
        (Some(structured), _) => structured,
        (None, Some(text)) => {
            serde_json::from_str(text).map_err(|e| McpError::ProtocolError {
                server: server.to_string(),
                reason: format!("invalid JSON response from tool '{tool}': {e}: {text}"),
            })?
        }
        (None, None) => {
            return Err(McpError::ProtocolError {
                server: server.to_string(),
                reason: format!("no response content for tool '{tool}'"),
            })
        }
    };

    // Tools report handled failures in-band as {"status": "error", "error": ...}.
    if payload.get("status").and_then(|s| s.as_str()) == Some("error") {
        let message = match payload.get("error") {
            Some(serde_json::Value::String(msg)) => msg.clone(),
            Some(other) => other.to_string(),
            None => payload.to_string(),
        };
        return Err(McpError::ToolError {
            server: server.to_string(),
            tool: tool.to_string(),
            message,
        });
    }

    Ok(payload)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
