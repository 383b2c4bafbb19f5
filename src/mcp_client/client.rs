//! MCP Client Manager: the single entry point for talking to tool servers.
//!
//! Owns the server registry, opens sessions lazily, and exposes tool
//! listing, invocation and health probing. Every public operation returns a
//! value: transport and protocol failures are classified and folded into
//! [`ToolCallResult`] / [`CallFailure`] / [`HealthStatus`], so one server's
//! outage never aborts a caller working across several servers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::RwLock;

use crate::config::Settings;

use super::errors::McpError;
use super::lifecycle::RetryPolicy;
use super::protocol;
use super::registry::{ServerEntry, ServerRegistry};
use super::sse::SseConnector;
use super::transport::{timeout_ms, Connector, Session};
use super::types::{
    CallFailure, HealthReport, HealthStatus, ServerConfig, ToolCallResult, ToolDescriptor,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default bound on opening a session (connect + handshake).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for tool call execution.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on a single health probe, including connecting.
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Deadlines applied by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub call: Duration,
    pub health: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: DEFAULT_CONNECT_TIMEOUT,
            call: DEFAULT_CALL_TIMEOUT,
            health: DEFAULT_HEALTH_TIMEOUT,
        }
    }
}

// ─── ClientManager ───────────────────────────────────────────────────────────

/// Manages connections to multiple MCP servers.
///
/// Construct one at startup and share it (`Arc<ClientManager>`) with every
/// component that needs to reach a tool server.
pub struct ClientManager {
    registry: RwLock<ServerRegistry>,
    connector: Arc<dyn Connector>,
    timeouts: Timeouts,
}

impl ClientManager {
    /// Create an empty manager that reaches servers over SSE.
    pub fn new(timeouts: Timeouts) -> Result<Self, McpError> {
        let connector = SseConnector::new(timeouts.connect, timeouts.connect)?;
        Ok(Self::with_connector(Arc::new(connector), timeouts))
    }

    /// Create an empty manager using a custom connector.
    pub fn with_connector(connector: Arc<dyn Connector>, timeouts: Timeouts) -> Self {
        Self {
            registry: RwLock::new(ServerRegistry::new()),
            connector,
            timeouts,
        }
    }

    /// Create a manager with `servers` already registered, in order.
    pub fn with_servers(
        timeouts: Timeouts,
        servers: impl IntoIterator<Item = ServerConfig>,
    ) -> Result<Self, McpError> {
        let mut manager = Self::new(timeouts)?;
        let registry = manager.registry.get_mut();
        for config in servers {
            registry.insert(config);
        }
        Ok(manager)
    }

    /// Create a manager from loaded settings, registering its servers.
    pub fn from_settings(settings: &Settings) -> Result<Self, McpError> {
        Self::with_servers(
            settings.timeouts.to_timeouts(),
            settings.servers.iter().cloned(),
        )
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    // ─── Registry ────────────────────────────────────────────────────────

    /// Register a server. An existing entry with the same name is replaced
    /// and its session closed; the next call connects to the new address.
    pub async fn register(&self, config: ServerConfig) {
        let name = config.name.clone();
        let url = config.url.clone();
        let replaced = self.registry.write().await.insert(config);

        match replaced {
            Some(old) => {
                tracing::info!(
                    server = %name,
                    old_url = %old.config.url,
                    new_url = %url,
                    "re-registered MCP server"
                );
                old.slot.close().await;
            }
            None => tracing::info!(server = %name, url = %url, "registered MCP server"),
        }
    }

    /// Register several servers in order.
    pub async fn register_all(&self, configs: impl IntoIterator<Item = ServerConfig>) {
        for config in configs {
            self.register(config).await;
        }
    }

    /// Remove a server and close its session. Returns `false` if unknown.
    pub async fn deregister(&self, name: &str) -> bool {
        let removed = self.registry.write().await.remove(name);
        match removed {
            Some(entry) => {
                entry.slot.close().await;
                tracing::info!(server = %name, "deregistered MCP server");
                true
            }
            None => false,
        }
    }

    /// Registered servers, in registration order.
    pub async fn list_servers(&self) -> Vec<ServerConfig> {
        self.registry.read().await.configs()
    }

    pub async fn is_registered(&self, name: &str) -> bool {
        self.registry.read().await.contains(name)
    }

    pub async fn server_count(&self) -> usize {
        self.registry.read().await.len()
    }

    // ─── Tools ───────────────────────────────────────────────────────────

    /// List the tools a server exposes.
    pub async fn list_tools(&self, server: &str) -> Result<Vec<ToolDescriptor>, CallFailure> {
        self.try_list_tools(server)
            .await
            .map_err(|e| {
                tracing::warn!(
                    server,
                    classification = ?e.kind(),
                    error = %e,
                    "failed to list tools"
                );
                CallFailure::from(e)
            })
    }

    /// Call a tool on the specified server.
    ///
    /// Never fails: every outcome, including an unknown server, is returned
    /// as a [`ToolCallResult`].
    pub async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> ToolCallResult {
        let start = Instant::now();
        let outcome = self.try_call_tool(server, tool, arguments).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &outcome {
            Ok(_) => tracing::info!(server, tool, elapsed_ms, "tool call succeeded"),
            Err(e) => tracing::warn!(
                server,
                tool,
                elapsed_ms,
                classification = ?e.kind(),
                error = %e,
                "tool call failed"
            ),
        }

        outcome.into()
    }

    /// [`call_tool`](Self::call_tool) repeated under `policy` while the
    /// failure is transient.
    pub async fn call_tool_with_retry(
        &self,
        server: &str,
        tool: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
        policy: &RetryPolicy,
    ) -> ToolCallResult {
        let mut attempt = 1;
        loop {
            let result = self.call_tool(server, tool, arguments.clone()).await;
            match result.classification() {
                Some(kind) if policy.should_retry(attempt, kind) => {
                    let delay = policy.delay_for(attempt - 1);
                    tracing::info!(
                        server,
                        tool,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retrying tool call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                _ => return result,
            }
        }
    }

    // ─── Health ──────────────────────────────────────────────────────────

    /// Probe one server by listing its tools. Never fails.
    pub async fn health_check_one(&self, server: &str) -> HealthStatus {
        let start = Instant::now();
        let listing = self.timed_listing(server).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let (reachable, detail, tools) = match listing {
            Ok(tools) => (true, None, tools.into_iter().map(|t| t.name).collect()),
            Err(e) => (false, Some(e.to_string()), Vec::new()),
        };

        if reachable {
            tracing::debug!(server, latency_ms, "server healthy");
        } else {
            tracing::warn!(
                server,
                latency_ms,
                detail = detail.as_deref().unwrap_or_default(),
                "server unhealthy"
            );
        }

        HealthStatus {
            name: server.to_string(),
            reachable,
            detail,
            tools,
            latency_ms,
            checked_at: Utc::now(),
        }
    }

    /// Probe every registered server concurrently.
    ///
    /// Each probe is independently bounded, so the whole check takes about as
    /// long as the slowest probe. Results follow registration order.
    pub async fn health_check_all(&self) -> HealthReport {
        let names = self.registry.read().await.names();
        let statuses = join_all(names.iter().map(|name| self.health_check_one(name))).await;

        let healthy = statuses.iter().filter(|s| s.reachable).count();
        tracing::info!(total = statuses.len(), healthy, "health check complete");

        HealthReport::new(statuses)
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Close every open session. Servers stay registered.
    pub async fn shutdown(&self) {
        let entries = self.registry.read().await.entries();
        join_all(entries.iter().map(|entry| entry.slot.close())).await;
        tracing::info!(servers = entries.len(), "MCP client manager shut down");
    }

    // ─── Internals ───────────────────────────────────────────────────────

    async fn entry(&self, server: &str) -> Result<Arc<ServerEntry>, McpError> {
        self.registry
            .read()
            .await
            .get(server)
            .ok_or_else(|| McpError::NotRegistered {
                name: server.to_string(),
            })
    }

    async fn open(&self, server: &str) -> Result<(Arc<ServerEntry>, Arc<dyn Session>), McpError> {
        let entry = self.entry(server).await?;
        let session = entry
            .slot
            .acquire(self.connector.as_ref(), &entry.config, self.timeouts.connect)
            .await?;
        Ok((entry, session))
    }

    /// Retire the session if `outcome` shows it can no longer be trusted.
    async fn settle<T>(
        entry: &ServerEntry,
        session: &Arc<dyn Session>,
        outcome: Result<T, McpError>,
    ) -> Result<T, McpError> {
        match &outcome {
            // Other requests may still be waiting on a slow session; stop
            // handing it out but let them finish.
            Err(e @ McpError::Timeout { .. }) => {
                tracing::debug!(server = %entry.name(), error = %e, "retiring timed-out session");
                entry.slot.detach(session).await;
            }
            Err(e) if e.is_session_fatal() => {
                tracing::debug!(server = %entry.name(), error = %e, "discarding session");
                entry.slot.discard(session).await;
            }
            _ => {}
        }
        outcome
    }

    async fn try_call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        let (entry, session) = self.open(server).await?;
        let outcome =
            protocol::invoke_tool(session.as_ref(), tool, arguments, self.timeouts.call).await;
        Self::settle(&entry, &session, outcome).await
    }

    async fn try_list_tools(&self, server: &str) -> Result<Vec<ToolDescriptor>, McpError> {
        let (entry, session) = self.open(server).await?;
        let outcome = protocol::fetch_tools(session.as_ref(), self.timeouts.call).await;
        Self::settle(&entry, &session, outcome).await
    }

    /// `tools/list` within the health timeout. Connecting spends part of the
    /// budget and the listing gets the rest.
    async fn timed_listing(&self, server: &str) -> Result<Vec<ToolDescriptor>, McpError> {
        let deadline = Instant::now() + self.timeouts.health;
        let entry = self.entry(server).await?;

        let session = tokio::time::timeout(
            self.timeouts.health,
            entry
                .slot
                .acquire(self.connector.as_ref(), &entry.config, self.timeouts.connect),
        )
        .await
        .map_err(|_| McpError::ConnectionFailed {
            server: server.to_string(),
            reason: format!(
                "connection not established within {}ms",
                timeout_ms(self.timeouts.health)
            ),
        })??;

        let remaining = deadline.saturating_duration_since(Instant::now());
        let outcome = protocol::fetch_tools(session.as_ref(), remaining).await;
        Self::settle(&entry, &session, outcome).await
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
