//! MCP over Server-Sent Events.
//!
//! The client opens a long-lived `GET` on the server URL. The server first
//! announces a message endpoint (`event: endpoint`), then pushes every
//! JSON-RPC response as an `event: message`. Requests are `POST`ed to the
//! announced endpoint. A background reader task owns the event stream and
//! hands responses to waiters by request id.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::{Event, Eventsource};
use futures::stream::{Stream, StreamExt};
use reqwest::header::ACCEPT;
use reqwest::{Client as HttpClient, Url};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::errors::McpError;
use super::transport::{extract_result, next_request_id, timeout_ms, Connector, Session};
use super::types::{JsonRpcRequest, JsonRpcResponse, ServerConfig};

// ─── Constants ───────────────────────────────────────────────────────────────

/// MCP protocol revision announced during `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

// ─── SSE event stream ────────────────────────────────────────────────────────

type EventStream = Pin<Box<dyn Stream<Item = Result<Event, String>> + Send>>;

/// Decode a response body into SSE events.
///
/// Bytes are buffered until an event is complete, so events (and UTF-8
/// sequences) split across network chunks arrive intact.
fn event_stream<S, B>(body: S) -> EventStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    Box::pin(
        body.eventsource()
            .map(|event| event.map_err(|e| format!("stream read error: {e}"))),
    )
}

/// Events without an explicit type are `message` events.
fn is_message(event: &Event) -> bool {
    event.event.is_empty() || event.event == "message"
}

// ─── Pending requests ────────────────────────────────────────────────────────

type PendingMap = HashMap<u64, oneshot::Sender<JsonRpcResponse>>;

fn lock_pending(pending: &Mutex<PendingMap>) -> MutexGuard<'_, PendingMap> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes a request's waiter when the request future completes or is dropped.
struct PendingGuard<'a> {
    pending: &'a Mutex<PendingMap>,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock_pending(self.pending).remove(&self.id);
    }
}

/// Route one `message` event to the request waiting for it.
fn dispatch(server: &str, pending: &Mutex<PendingMap>, data: &str) {
    let message: serde_json::Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(server, error = %e, "skipping non-JSON SSE message");
            return;
        }
    };

    if let Some(method) = message.get("method") {
        tracing::debug!(server, %method, "ignoring server-initiated message");
        return;
    }

    let response: JsonRpcResponse = match serde_json::from_value(message) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(server, error = %e, "skipping malformed JSON-RPC response");
            return;
        }
    };

    let id = response.id;
    let waiter = lock_pending(pending).remove(&id);
    match waiter {
        Some(tx) => {
            // The receiver is gone if the caller was cancelled in the meantime.
            let _ = tx.send(response);
        }
        None => tracing::debug!(server, id, "response arrived with no waiter"),
    }
}

/// Reader task: drains the event stream until it ends.
async fn read_events(
    server: String,
    mut events: EventStream,
    pending: Arc<Mutex<PendingMap>>,
    alive: Arc<AtomicBool>,
) {
    while let Some(event) = events.next().await {
        match event {
            Ok(event) if is_message(&event) => dispatch(&server, &pending, &event.data),
            Ok(event) => {
                tracing::debug!(server = %server, event = %event.event, "ignoring SSE event");
            }
            Err(reason) => {
                tracing::warn!(server = %server, reason = %reason, "SSE stream failed");
                break;
            }
        }
    }

    alive.store(false, Ordering::SeqCst);
    // Dropping the senders wakes every waiter with a closed-channel error.
    lock_pending(&pending).clear();
    tracing::info!(server = %server, "SSE stream closed");
}

async fn wait_for_endpoint(events: &mut EventStream) -> Result<String, String> {
    while let Some(event) = events.next().await {
        let event = event?;
        if event.event == "endpoint" {
            return Ok(event.data);
        }
    }
    Err("event stream closed before the message endpoint was announced".into())
}

// ─── SseSession ──────────────────────────────────────────────────────────────

/// An initialized MCP session over SSE.
pub struct SseSession {
    server_name: String,
    address: String,
    endpoint: Url,
    http: HttpClient,
    pending: Arc<Mutex<PendingMap>>,
    alive: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl SseSession {
    /// Open the event stream, learn the message endpoint, and run the
    /// `initialize` handshake. Every failure is a `ConnectionFailed`.
    pub async fn connect(
        http: HttpClient,
        config: &ServerConfig,
        handshake_timeout: Duration,
    ) -> Result<Self, McpError> {
        let connection_failed = |reason: String| McpError::ConnectionFailed {
            server: config.name.clone(),
            reason,
        };

        let base = Url::parse(&config.url)
            .map_err(|e| connection_failed(format!("invalid address '{}': {e}", config.url)))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(connection_failed(format!(
                "unsupported scheme '{}' in '{}'",
                base.scheme(),
                config.url
            )));
        }

        let response = http
            .get(base.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| connection_failed(format!("{e}")))?;

        if !response.status().is_success() {
            return Err(connection_failed(format!("HTTP {}", response.status())));
        }

        let mut events = event_stream(response.bytes_stream());
        let announced = tokio::time::timeout(handshake_timeout, wait_for_endpoint(&mut events))
            .await
            .map_err(|_| {
                connection_failed(format!(
                    "no endpoint announced within {}ms",
                    timeout_ms(handshake_timeout)
                ))
            })?
            .map_err(connection_failed)?;

        let endpoint = base
            .join(announced.trim())
            .map_err(|e| connection_failed(format!("invalid endpoint '{announced}': {e}")))?;

        let pending: Arc<Mutex<PendingMap>> = Arc::default();
        let alive = Arc::new(AtomicBool::new(true));
        let reader = tokio::spawn(read_events(
            config.name.clone(),
            events,
            Arc::clone(&pending),
            Arc::clone(&alive),
        ));

        // From here on, dropping `session` on an early return aborts the reader.
        let session = Self {
            server_name: config.name.clone(),
            address: config.url.clone(),
            endpoint,
            http,
            pending,
            alive,
            reader: Mutex::new(Some(reader)),
        };

        session
            .initialize(handshake_timeout)
            .await
            .map_err(|e| connection_failed(format!("initialization failed: {e}")))?;

        tracing::info!(
            server = %session.server_name,
            endpoint = %session.endpoint,
            "MCP session established"
        );

        Ok(session)
    }

    async fn initialize(&self, timeout: Duration) -> Result<(), McpError> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
        });

        let result = self.request("initialize", Some(params), timeout).await?;
        tracing::debug!(
            server = %self.server_name,
            server_info = %result.get("serverInfo").cloned().unwrap_or_default(),
            "initialize handshake complete"
        );

        tokio::time::timeout(timeout, self.notify("notifications/initialized"))
            .await
            .map_err(|_| McpError::Timeout {
                server: self.server_name.clone(),
                operation: "notifications/initialized".into(),
                timeout_ms: timeout_ms(timeout),
            })?
    }

    /// Send a JSON-RPC notification (no response expected).
    async fn notify(&self, method: &str) -> Result<(), McpError> {
        let notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
        });
        self.post(&notification).await
    }

    async fn post<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), McpError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(message)
            .send()
            .await
            .map_err(|e| McpError::TransportClosed {
                server: self.server_name.clone(),
                reason: format!("failed to send message: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(McpError::TransportClosed {
                server: self.server_name.clone(),
                reason: format!("message endpoint answered HTTP {}", response.status()),
            });
        }

        Ok(())
    }

    fn abort_reader(&self) {
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = reader {
            handle.abort();
        }
    }
}

#[async_trait]
impl Session for SseSession {
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

        let id = next_request_id();
        let (tx, rx) = oneshot::channel();
        lock_pending(&self.pending).insert(id, tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };

        let request = JsonRpcRequest::new(id, method, params);
        let exchange = async {
            self.post(&request).await?;
            rx.await.map_err(|_| McpError::TransportClosed {
                server: self.server_name.clone(),
                reason: "event stream closed before the response arrived".into(),
            })
        };

        let response = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| McpError::Timeout {
                server: self.server_name.clone(),
                operation: method.to_string(),
                timeout_ms: timeout_ms(timeout),
            })??;

        extract_result(response)
    }

    async fn close(&self) {
        let was_alive = self.alive.swap(false, Ordering::SeqCst);
        self.abort_reader();
        lock_pending(&self.pending).clear();
        if was_alive {
            tracing::debug!(server = %self.server_name, "SSE session closed");
        }
    }
}

impl Drop for SseSession {
    fn drop(&mut self) {
        self.abort_reader();
    }
}

// ─── SseConnector ────────────────────────────────────────────────────────────

/// Production [`Connector`]: opens an [`SseSession`] per server.
pub struct SseConnector {
    http: HttpClient,
    handshake_timeout: Duration,
}

impl SseConnector {
    /// Build a connector. The HTTP client only bounds TCP connect time, since
    /// the event stream must stay open indefinitely.
    pub fn new(connect_timeout: Duration, handshake_timeout: Duration) -> Result<Self, McpError> {
        let http = HttpClient::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| McpError::ConnectionFailed {
                server: "*".into(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            handshake_timeout,
        })
    }
}

#[async_trait]
impl Connector for SseConnector {
    async fn open(&self, config: &ServerConfig) -> Result<Arc<dyn Session>, McpError> {
        let session = SseSession::connect(self.http.clone(), config, self.handshake_timeout).await?;
        Ok(Arc::new(session))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
