//! In-memory connector used by the manager tests.
//!
//! Sessions answer `tools/list` with their configured tool names and
//! implement a handful of scripted tools:
//!
//! - `ping` → `{"pong": true}`
//! - `whoami` → `{"address": <session address>}`
//! - `echo` → the call arguments
//! - `fail` → `isError` with text `boom`
//! - `app_error` → in-band `{"status": "error", "error": "bad input"}`
//! - `slow` → sleeps far beyond any test timeout
//! - `nap` → `{"napped": true}` after 600ms
//! - `disconnect` → kills the session mid-call
//!
//! Any other listed tool answers `{"tool": <name>, "arguments": <arguments>}`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::errors::McpError;
use super::transport::{timeout_ms, Connector, Session};
use super::types::ServerConfig;

/// How a mocked address behaves when opened.
#[derive(Debug, Clone)]
pub enum Behavior {
    Reachable { tools: Vec<String> },
    Unreachable,
    /// Takes this long before refusing.
    SlowOpen(Duration),
    /// Reachable, but `tools/list` stalls for `delay`.
    SlowListing { tools: Vec<String>, delay: Duration },
}

impl Behavior {
    pub fn reachable(tools: &[&str]) -> Self {
        Behavior::Reachable {
            tools: tools.iter().map(|t| t.to_string()).collect(),
        }
    }
}

#[derive(Default)]
pub struct MockConnector {
    behaviors: HashMap<String, Behavior>,
    opens: Mutex<HashMap<String, usize>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, address: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(address.to_string(), behavior);
        self
    }

    /// How many times a session to `address` was opened.
    pub fn opens(&self, address: &str) -> usize {
        self.opens
            .lock()
            .unwrap()
            .get(address)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, config: &ServerConfig) -> Result<Arc<dyn Session>, McpError> {
        *self
            .opens
            .lock()
            .unwrap()
            .entry(config.url.clone())
            .or_default() += 1;

        match self.behaviors.get(&config.url) {
            Some(Behavior::Reachable { tools }) => Ok(Arc::new(MockSession {
                server_name: config.name.clone(),
                address: config.url.clone(),
                tools: tools.clone(),
                list_delay: None,
                alive: AtomicBool::new(true),
            })),
            Some(Behavior::SlowListing { tools, delay }) => Ok(Arc::new(MockSession {
                server_name: config.name.clone(),
                address: config.url.clone(),
                tools: tools.clone(),
                list_delay: Some(*delay),
                alive: AtomicBool::new(true),
            })),
            Some(Behavior::SlowOpen(delay)) => {
                tokio::time::sleep(*delay).await;
                Err(McpError::ConnectionFailed {
                    server: config.name.clone(),
                    reason: "gave up".into(),
                })
            }
            Some(Behavior::Unreachable) | None => Err(McpError::ConnectionFailed {
                server: config.name.clone(),
                reason: "connection refused".into(),
            }),
        }
    }
}

pub struct MockSession {
    server_name: String,
    address: String,
    tools: Vec<String>,
    list_delay: Option<Duration>,
    alive: AtomicBool,
}

impl MockSession {
    async fn call(&self, params: serde_json::Value) -> Result<serde_json::Value, McpError> {
        let name = params["name"].as_str().unwrap_or_default().to_string();
        if !self.tools.contains(&name) {
            return Err(McpError::ServerError {
                code: -32602,
                message: format!("Unknown tool: {name}"),
                data: None,
            });
        }

        let text = match name.as_str() {
            "whoami" => json!({ "address": self.address }).to_string(),
            "echo" => params["arguments"].to_string(),
            "fail" => {
                return Ok(json!({
                    "content": [{"type": "text", "text": "boom"}],
                    "isError": true,
                }))
            }
            "app_error" => json!({"status": "error", "error": "bad input"}).to_string(),
            "slow" => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "late".to_string()
            }
            "disconnect" => {
                self.alive.store(false, Ordering::SeqCst);
                return Err(McpError::TransportClosed {
                    server: self.server_name.clone(),
                    reason: "peer reset".into(),
                });
            }
            "nap" => {
                tokio::time::sleep(Duration::from_millis(600)).await;
                json!({"napped": true}).to_string()
            }
            "ping" => json!({"pong": true}).to_string(),
            _ => json!({"tool": name, "arguments": params["arguments"]}).to_string(),
        };

        Ok(json!({"content": [{"type": "text", "text": text}]}))
    }
}

#[async_trait]
impl Session for MockSession {
    fn server_name(&self) -> &str {
        &self.server_name
    }

    fn address(&self) -> &str {
        &self.address
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<serde_json::Value, McpError> {
        if !self.is_alive() {
            return Err(McpError::TransportClosed {
                server: self.server_name.clone(),
                reason: "session is closed".into(),
            });
        }

        let exchange = async {
            match method {
                "tools/list" => {
                    if let Some(delay) = self.list_delay {
                        tokio::time::sleep(delay).await;
                    }
                    let tools: Vec<serde_json::Value> = self
                        .tools
                        .iter()
                        .map(|name| json!({"name": name, "inputSchema": {"type": "object"}}))
                        .collect();
                    Ok(json!({ "tools": tools }))
                }
                "tools/call" => self.call(params.unwrap_or_default()).await,
                other => Err(McpError::ServerError {
                    code: -32601,
                    message: format!("Method not found: {other}"),
                    data: None,
                }),
            }
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| McpError::Timeout {
                server: self.server_name.clone(),
                operation: method.to_string(),
                timeout_ms: timeout_ms(timeout),
            })?
    }

    async fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}
