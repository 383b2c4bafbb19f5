//! Session abstraction between the manager and a concrete wire transport.
//!
//! A [`Connector`] opens [`Session`]s; a session carries correlated JSON-RPC
//! requests to one server. The manager only ever talks to these traits, so
//! the SSE transport can be swapped for an in-memory one in tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::errors::McpError;
use super::types::{JsonRpcResponse, ServerConfig};

// ─── Request ID Generator ────────────────────────────────────────────────────

/// Global monotonic request ID counter.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique request ID.
pub fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// Opens sessions to servers described by a [`ServerConfig`].
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open and initialize a session. Any failure is a connection failure.
    async fn open(&self, config: &ServerConfig) -> Result<Arc<dyn Session>, McpError>;
}

/// One open channel to a tool server.
///
/// A session performs a single attempt per request; retries belong to the
/// caller. Responses are matched to requests by id, so concurrent callers
/// may share a session.
#[async_trait]
pub trait Session: Send + Sync {
    /// Registry name of the server this session belongs to.
    fn server_name(&self) -> &str;

    /// The address the session was opened against.
    fn address(&self) -> &str;

    /// `false` once the underlying connection is known to be broken or closed.
    fn is_alive(&self) -> bool;

    /// Send a request and wait at most `timeout` for its response.
    ///
    /// Returns the `result` member of the response; a JSON-RPC error becomes
    /// [`McpError::ServerError`].
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<serde_json::Value, McpError>;

    /// Release the connection. Idempotent.
    async fn close(&self);
}

// ─── Response Helpers ────────────────────────────────────────────────────────

/// Extract the result from a JSON-RPC response, converting errors to `McpError`.
pub fn extract_result(response: JsonRpcResponse) -> Result<serde_json::Value, McpError> {
    if let Some(err) = response.error {
        return Err(McpError::ServerError {
            code: err.code,
            message: err.message,
            data: err.data,
        });
    }

    response.result.ok_or(McpError::ServerError {
        code: -32603,
        message: "response missing both result and error".into(),
        data: None,
    })
}

pub(crate) fn timeout_ms(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
