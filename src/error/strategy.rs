/// Recovery strategies keyed by failure kind
///
/// A strategy is an asynchronous predicate: given the failure and its context
/// label, attempt a local fix and report whether it worked. At most one
/// strategy runs per failure. The built-ins are one-shot backoff policies,
/// not general retry loops.
use crate::AppError;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait RecoveryStrategy: Send + Sync {
    /// Attempt to resolve the failure. Returns true if recovered.
    async fn attempt(&self, error: &AppError, context: &str) -> bool;
}

/// Transient "resource busy" I/O failures: wait briefly, then treat the
/// resource as released. One shot, optimistic.
pub struct ResourceBusyRetry {
    delay: Duration,
}

impl ResourceBusyRetry {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for ResourceBusyRetry {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

#[async_trait]
impl RecoveryStrategy for ResourceBusyRetry {
    async fn attempt(&self, error: &AppError, context: &str) -> bool {
        tracing::debug!(
            context = context,
            error = %error,
            delay_ms = self.delay.as_millis() as u64,
            "Resource busy, waiting before declaring recovery"
        );
        tokio::time::sleep(self.delay).await;
        true
    }
}

/// Network timeouts: wait longer than the busy-retry delay, then assume the
/// remote side caught up. One shot, optimistic.
pub struct NetworkTimeoutRetry {
    delay: Duration,
}

impl NetworkTimeoutRetry {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for NetworkTimeoutRetry {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

#[async_trait]
impl RecoveryStrategy for NetworkTimeoutRetry {
    async fn attempt(&self, error: &AppError, context: &str) -> bool {
        tracing::debug!(
            context = context,
            error = %error,
            delay_ms = self.delay.as_millis() as u64,
            "Network timeout, backing off before declaring recovery"
        );
        tokio::time::sleep(self.delay).await;
        true
    }
}
