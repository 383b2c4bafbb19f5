//! Session lifecycle management.
//!
//! Each registered server owns one [`SessionSlot`]: sessions are opened
//! lazily, reused while alive, and discarded after any failure that leaves
//! the connection in an unknown state. No broken session is ever reused.
//!
//! Retry is not part of the slot. [`RetryPolicy`] is applied by callers that
//! explicitly opt into it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use super::errors::{FailureKind, McpError};
use super::transport::{timeout_ms, Connector, Session};
use super::types::ServerConfig;

// ─── SessionSlot ─────────────────────────────────────────────────────────────

/// Holds at most one open session for a server.
///
/// The slot's lock is held while a session is being opened, so concurrent
/// first calls to the same server share one connection attempt. Other
/// servers are unaffected.
#[derive(Default)]
pub struct SessionSlot {
    session: Mutex<Option<Arc<dyn Session>>>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the live session, opening a fresh one if needed.
    ///
    /// Opening is bounded by `connect_timeout`; exceeding it is reported as a
    /// connection failure.
    pub async fn acquire(
        &self,
        connector: &dyn Connector,
        config: &ServerConfig,
        connect_timeout: Duration,
    ) -> Result<Arc<dyn Session>, McpError> {
        let mut slot = self.session.lock().await;

        if let Some(existing) = slot.as_ref() {
            if existing.is_alive() {
                return Ok(Arc::clone(existing));
            }
            tracing::debug!(server = %config.name, "discarding dead session");
            existing.close().await;
            *slot = None;
        }

        let opened = tokio::time::timeout(connect_timeout, connector.open(config))
            .await
            .map_err(|_| McpError::ConnectionFailed {
                server: config.name.clone(),
                reason: format!(
                    "connection not established within {}ms",
                    timeout_ms(connect_timeout)
                ),
            })??;

        tracing::debug!(server = %config.name, address = %config.url, "session opened");
        *slot = Some(Arc::clone(&opened));
        Ok(opened)
    }

    /// Close `failed` and forget it, unless the slot already moved on to a
    /// newer session.
    pub async fn discard(&self, failed: &Arc<dyn Session>) {
        failed.close().await;
        let mut slot = self.session.lock().await;
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, failed)) {
            *slot = None;
        }
    }

    /// Stop handing out `stale` without closing it, so requests already in
    /// flight on it can finish. Returns `false` if the slot holds another
    /// session.
    pub async fn detach(&self, stale: &Arc<dyn Session>) -> bool {
        let mut slot = self.session.lock().await;
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, stale)) {
            *slot = None;
            true
        } else {
            false
        }
    }

    /// Close whatever session is held.
    pub async fn close(&self) {
        let taken = self.session.lock().await.take();
        if let Some(session) = taken {
            session.close().await;
        }
    }

    /// Whether a live session is currently held.
    pub async fn is_connected(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| s.is_alive())
    }
}

// ─── RetryPolicy ─────────────────────────────────────────────────────────────

/// Bounded exponential backoff for transient failures.
///
/// Only [`FailureKind::is_transient`] failures are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. `1` disables retry.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    /// A single attempt.
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            ..Self::none()
        }
    }

    /// Delay before retry number `retry` (0-based): `base * 2^retry`, capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Whether another attempt should follow attempt number `attempt` (1-based).
    pub fn should_retry(&self, attempt: u32, kind: FailureKind) -> bool {
        attempt < self.max_attempts && kind.is_transient()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp_client::testing::{Behavior, MockConnector};

    #[test]
    fn test_default_policy_never_retries() {
        let policy = RetryPolicy::default();
        assert!(!policy.should_retry(1, FailureKind::ConnectionFailure));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::exponential(5, Duration::from_secs(1));
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(10), Duration::from_secs(8));
        assert_eq!(policy.delay_for(40), Duration::from_secs(8));
    }

    #[test]
    fn test_only_transient_failures_retry() {
        let policy = RetryPolicy::exponential(3, Duration::from_millis(10));
        assert!(policy.should_retry(1, FailureKind::Timeout));
        assert!(policy.should_retry(2, FailureKind::ConnectionFailure));
        assert!(!policy.should_retry(3, FailureKind::ConnectionFailure));
        assert!(!policy.should_retry(1, FailureKind::ToolError));
    }

    #[test]
    fn test_exponential_clamps_zero_attempts() {
        assert_eq!(RetryPolicy::exponential(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_acquire_reuses_live_session() {
        let connector = MockConnector::new().with("http://a/sse", Behavior::reachable(&["ping"]));
        let config = ServerConfig::new("A", "http://a/sse");
        let slot = SessionSlot::new();

        let first = slot.acquire(&connector, &config, Duration::from_secs(1)).await.unwrap();
        let second = slot.acquire(&connector, &config, Duration::from_secs(1)).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(connector.opens("http://a/sse"), 1);
        assert!(slot.is_connected().await);
    }

    #[tokio::test]
    async fn test_discard_forces_reopen() {
        let connector = MockConnector::new().with("http://a/sse", Behavior::reachable(&["ping"]));
        let config = ServerConfig::new("A", "http://a/sse");
        let slot = SessionSlot::new();

        let first = slot.acquire(&connector, &config, Duration::from_secs(1)).await.unwrap();
        slot.discard(&first).await;
        assert!(!first.is_alive());
        assert!(!slot.is_connected().await);

        let second = slot.acquire(&connector, &config, Duration::from_secs(1)).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(connector.opens("http://a/sse"), 2);
    }

    #[tokio::test]
    async fn test_detach_keeps_session_open_for_holders() {
        let connector = MockConnector::new().with("http://a/sse", Behavior::reachable(&["ping"]));
        let config = ServerConfig::new("A", "http://a/sse");
        let slot = SessionSlot::new();

        let first = slot.acquire(&connector, &config, Duration::from_secs(1)).await.unwrap();
        assert!(slot.detach(&first).await);
        assert!(first.is_alive());
        assert!(!slot.is_connected().await);

        let second = slot.acquire(&connector, &config, Duration::from_secs(1)).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        // A stale handle no longer matches the slot.
        assert!(!slot.detach(&first).await);
        assert!(slot.is_connected().await);
    }

    #[tokio::test]
    async fn test_slow_open_is_connection_failure() {
        let connector = MockConnector::new().with(
            "http://slow/sse",
            Behavior::SlowOpen(Duration::from_secs(5)),
        );
        let config = ServerConfig::new("Slow", "http://slow/sse");
        let slot = SessionSlot::new();

        let err = slot
            .acquire(&connector, &config, Duration::from_millis(50))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), FailureKind::ConnectionFailure);
        assert!(!slot.is_connected().await);
    }
}
