//! MCP Client: JSON-RPC over SSE for multi-server tool invocation.
//!
//! This module handles:
//! - A registration-ordered registry of named tool servers
//! - Lazily opened, reused and discarded sessions per server
//! - Tool listing and invocation with classified failures
//! - Concurrent health probing across all servers
//!
//! [`ClientManager`] is the entry point; everything it returns is a value,
//! never an error that escapes to the caller.

pub mod client;
pub mod errors;
pub mod lifecycle;
pub mod protocol;
pub mod registry;
pub mod sse;
#[cfg(test)]
pub(crate) mod testing;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use client::{ClientManager, Timeouts};
pub use errors::{FailureKind, McpError};
pub use lifecycle::RetryPolicy;
pub use types::{
    CallFailure, HealthReport, HealthStatus, ServerConfig, ToolCallResult, ToolDescriptor,
};
