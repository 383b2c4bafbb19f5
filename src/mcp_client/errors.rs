//! MCP Client error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while talking to an MCP server.
///
/// These never cross the `ClientManager` boundary as-is: every public
/// manager operation folds them into a [`CallFailure`](super::types::CallFailure)
/// classified by [`McpError::kind`].
#[derive(Debug, Error)]
pub enum McpError {
    /// No server with this name is in the registry.
    #[error("server '{name}' not registered")]
    NotRegistered {
        name: String,
    },

    /// Opening the session failed (refused, DNS, bad address, handshake).
    #[error("failed to connect to '{server}': {reason}")]
    ConnectionFailed {
        server: String,
        reason: String,
    },

    /// An established session broke (event stream ended, POST rejected).
    #[error("connection to '{server}' lost: {reason}")]
    TransportClosed {
        server: String,
        reason: String,
    },

    /// A request did not complete within its deadline.
    #[error("{operation} on '{server}' timed out after {timeout_ms}ms")]
    Timeout {
        server: String,
        operation: String,
        timeout_ms: u64,
    },

    /// The server does not expose the requested tool.
    #[error("tool '{tool}' not found on '{server}': {reason}")]
    ToolNotFound {
        server: String,
        tool: String,
        reason: String,
    },

    /// The tool ran and reported an application-level failure.
    #[error("tool '{tool}' on '{server}' failed: {message}")]
    ToolError {
        server: String,
        tool: String,
        message: String,
    },

    /// Server returned a JSON-RPC error response.
    #[error("server error [{code}]: {message}")]
    ServerError {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// The server answered with something that is not a valid response.
    #[error("malformed response from '{server}': {reason}")]
    ProtocolError {
        server: String,
        reason: String,
    },
}

/// Classification of a failed call, as surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    NotRegistered,
    ConnectionFailure,
    Timeout,
    ToolNotFound,
    ToolError,
    ProtocolError,
}

impl FailureKind {
    /// Whether a retry policy may try the call again.
    pub fn is_transient(self) -> bool {
        matches!(self, FailureKind::ConnectionFailure | FailureKind::Timeout)
    }
}

impl McpError {
    /// Map this error onto its public classification.
    pub fn kind(&self) -> FailureKind {
        match self {
            McpError::NotRegistered { .. } => FailureKind::NotRegistered,
            McpError::ConnectionFailed { .. } | McpError::TransportClosed { .. } => {
                FailureKind::ConnectionFailure
            }
            McpError::Timeout { .. } => FailureKind::Timeout,
            McpError::ToolNotFound { .. } => FailureKind::ToolNotFound,
            McpError::ToolError { .. } | McpError::ServerError { .. } => FailureKind::ToolError,
            McpError::ProtocolError { .. } => FailureKind::ProtocolError,
        }
    }

    /// Whether the session that produced this error must not be reused.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            McpError::ConnectionFailed { .. }
                | McpError::TransportClosed { .. }
                | McpError::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_closed_is_connection_failure() {
        let err = McpError::TransportClosed {
            server: "Doc".into(),
            reason: "stream ended".into(),
        };
        assert_eq!(err.kind(), FailureKind::ConnectionFailure);
        assert!(err.is_session_fatal());
    }

    #[test]
    fn test_server_error_is_tool_error() {
        let err = McpError::ServerError {
            code: -32603,
            message: "internal".into(),
            data: None,
        };
        assert_eq!(err.kind(), FailureKind::ToolError);
        assert!(!err.is_session_fatal());
    }

    #[test]
    fn test_timeout_discards_session() {
        let err = McpError::Timeout {
            server: "Doc".into(),
            operation: "tools/call".into(),
            timeout_ms: 100,
        };
        assert_eq!(err.kind(), FailureKind::Timeout);
        assert!(err.is_session_fatal());
        assert_eq!(err.to_string(), "tools/call on 'Doc' timed out after 100ms");
    }

    #[test]
    fn test_transient_kinds() {
        assert!(FailureKind::ConnectionFailure.is_transient());
        assert!(FailureKind::Timeout.is_transient());
        assert!(!FailureKind::ToolError.is_transient());
        assert!(!FailureKind::NotRegistered.is_transient());
    }

    #[test]
    fn test_kind_serializes_as_variant_name() {
        let json = serde_json::to_string(&FailureKind::ConnectionFailure).unwrap();
        assert_eq!(json, "\"ConnectionFailure\"");
    }
}
