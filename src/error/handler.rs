/// Recovery-and-dispatch core
///
/// `ErrorHandler` wraps risky operations, classifies failures by severity,
/// attempts local recovery through the strategy registry, keeps statistics,
/// and broadcasts a `FailureEvent` per handled failure. Subscribers (the
/// failure coordinator, the UI bridge) attach explicitly at startup via
/// `subscribe()`.
use super::classification::{FailureEvent, FailureKind};
use super::severity::Severity;
use super::statistics::{ErrorStatistics, StatisticsTracker};
use super::strategy::{NetworkTimeoutRetry, RecoveryStrategy, ResourceBusyRetry};
use crate::logging::LogSink;
use crate::{AppError, AppResult};
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const LOG_CATEGORY: &str = "error-handler";

/// Side-effect hook run after every classification of a given severity
pub type DefaultHandler = Arc<dyn Fn(&FailureEvent) + Send + Sync>;

pub struct ErrorHandler {
    sink: LogSink,
    tracker: StatisticsTracker,
    strategies: RwLock<HashMap<FailureKind, Arc<dyn RecoveryStrategy>>>,
    default_handlers: RwLock<HashMap<Severity, DefaultHandler>>,
    events: broadcast::Sender<FailureEvent>,
}

impl ErrorHandler {
    /// Create a handler with the built-in one-shot backoff strategies and an
    /// Info-level no-op default handler installed
    pub fn new(sink: LogSink) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let handler = Self {
            sink,
            tracker: StatisticsTracker::new(),
            strategies: RwLock::new(HashMap::new()),
            default_handlers: RwLock::new(HashMap::new()),
            events,
        };

        handler.register_recovery_strategy(
            FailureKind::ResourceBusy,
            Arc::new(ResourceBusyRetry::default()),
        );
        handler.register_recovery_strategy(
            FailureKind::NetworkTimeout,
            Arc::new(NetworkTimeoutRetry::default()),
        );
        // Info-level failures need no side effects beyond logging; the
        // Warning/Error/Critical dialogs are wired externally through the
        // FailureEvent subscription.
        handler.set_default_handler(Severity::Info, Arc::new(|_| {}));

        handler
    }

    /// Subscribe to the failure event stream; call once at startup
    pub fn subscribe(&self) -> broadcast::Receiver<FailureEvent> {
        self.events.subscribe()
    }

    /// Upsert the strategy registered for a failure kind
    pub fn register_recovery_strategy(&self, kind: FailureKind, strategy: Arc<dyn RecoveryStrategy>) {
        self.strategies.write().unwrap().insert(kind, strategy);
    }

    /// Upsert the per-severity side-effect hook
    pub fn set_default_handler(&self, severity: Severity, handler: DefaultHandler) {
        self.default_handlers.write().unwrap().insert(severity, handler);
    }

    pub fn statistics(&self) -> ErrorStatistics {
        self.tracker.snapshot()
    }

    /// Clear statistics and the bounded failure history
    pub fn reset_statistics(&self) {
        self.tracker.reset();
    }

    /// Most recent handled failures, newest last
    pub fn recent_failures(&self, limit: usize) -> Vec<FailureEvent> {
        self.tracker.recent_failures(limit)
    }

    /// Run `operation`, recording timing through the log sink; on failure,
    /// classify and handle it, then return a zero-value result for
    /// severities below Critical or propagate the original failure at
    /// Critical and above.
    pub async fn safe_execute<T, F, Fut>(
        &self,
        operation: F,
        operation_name: &str,
        severity: Severity,
    ) -> AppResult<T>
    where
        T: Default,
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        self.sink.log(
            Severity::Info,
            format!("{} started", operation_name),
            LOG_CATEGORY,
        );
        let started = Instant::now();

        match operation().await {
            Ok(value) => {
                self.sink.log(
                    Severity::Info,
                    format!(
                        "{} completed in {}",
                        operation_name,
                        humantime::format_duration(round_to_millis(started.elapsed()))
                    ),
                    LOG_CATEGORY,
                );
                Ok(value)
            }
            Err(error) => {
                self.handle_error(error.clone(), operation_name, severity).await;
                if severity >= Severity::Critical {
                    Err(error)
                } else {
                    Ok(T::default())
                }
            }
        }
    }

    /// Blocking bridge for callers that cannot suspend
    ///
    /// Performs the same classification as `safe_execute`. Takes an explicit
    /// runtime handle and must only be called from threads outside that
    /// runtime; calling it from a runtime worker thread will panic.
    pub fn safe_execute_blocking<T, F, Fut>(
        &self,
        handle: &tokio::runtime::Handle,
        operation: F,
        operation_name: &str,
        severity: Severity,
    ) -> AppResult<T>
    where
        T: Default,
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        handle.block_on(self.safe_execute(operation, operation_name, severity))
    }

    /// Handle one failure: log, update statistics, attempt recovery, emit
    /// the event, run the per-severity hook. Never fails back into the
    /// caller; internal faults go to the last-resort debug channel only.
    pub async fn handle_error(&self, error: AppError, context: &str, severity: Severity) {
        self.sink.log_failure(
            severity,
            format!("{}: {}", context, error),
            LOG_CATEGORY,
            &error,
        );

        // TotalErrors moves exactly once per invocation, before any
        // recovery attempt.
        self.tracker.record_failure(error.kind(), severity);

        let recovered = self.try_recover(&error, context).await;

        let event = FailureEvent::new(error, context, severity, recovered);
        self.tracker.push_event(event.clone());

        // No receivers is fine; subscribers attach explicitly.
        let _ = self.events.send(event.clone());

        let hook = self.default_handlers.read().unwrap().get(&severity).cloned();
        if let Some(hook) = hook {
            if std::panic::catch_unwind(AssertUnwindSafe(|| hook(&event))).is_err() {
                tracing::debug!(severity = %severity, "default handler panicked, ignored");
            }
        }
    }

    /// Look up a strategy by the failure's exact kind, then walk the kind's
    /// ancestor chain until one matches. At most one strategy executes.
    pub async fn try_recover(&self, error: &AppError, context: &str) -> bool {
        let kind = error.kind();
        let matched = {
            let strategies = self.strategies.read().unwrap();
            strategies.get(&kind).cloned().map(|s| (kind, s)).or_else(|| {
                kind.ancestors()
                    .find_map(|ancestor| strategies.get(&ancestor).cloned().map(|s| (ancestor, s)))
            })
        };

        let Some((matched_kind, strategy)) = matched else {
            self.sink.log(
                Severity::Warning,
                format!("no recovery strategy for {} in {}", kind, context),
                LOG_CATEGORY,
            );
            return false;
        };

        let recovered = strategy.attempt(error, context).await;
        if recovered {
            self.tracker.record_recovery();
            self.sink.log(
                Severity::Info,
                format!("recovered from {} via {} strategy in {}", kind, matched_kind, context),
                LOG_CATEGORY,
            );
        } else {
            self.sink.log(
                Severity::Warning,
                format!("{} strategy did not recover {} in {}", matched_kind, kind, context),
                LOG_CATEGORY,
            );
        }
        recovered
    }
}

/// Sub-millisecond noise makes duration logs unreadable
fn round_to_millis(duration: std::time::Duration) -> std::time::Duration {
    std::time::Duration::from_millis(duration.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use tempfile::TempDir;

    struct FixedOutcome {
        recovered: bool,
        calls: AtomicU32,
    }

    impl FixedOutcome {
        fn new(recovered: bool) -> Arc<Self> {
            Arc::new(Self {
                recovered,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl RecoveryStrategy for FixedOutcome {
        async fn attempt(&self, _error: &AppError, _context: &str) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.recovered
        }
    }

    fn test_handler() -> (ErrorHandler, TempDir) {
        let temp = TempDir::new().unwrap();
        let config = LogConfig {
            console_enabled: false,
            ..LogConfig::default()
        };
        let sink = LogSink::spawn(config, temp.path());
        (ErrorHandler::new(sink), temp)
    }

    #[tokio::test]
    async fn test_handle_error_increments_total_once() {
        let (handler, _temp) = test_handler();

        // Recovered failure (built-in resource-busy strategy)
        handler
            .handle_error(
                AppError::ResourceBusy("lock".to_string()),
                "ctx",
                Severity::Error,
            )
            .await;
        // Unrecovered failure (no strategy anywhere)
        handler
            .handle_error(
                AppError::Internal("bug".to_string()),
                "ctx",
                Severity::Error,
            )
            .await;

        let stats = handler.statistics();
        assert_eq!(stats.total_errors, 2);
        assert_eq!(stats.recovered_count, 1);
    }

    #[tokio::test]
    async fn test_try_recover_exact_kind() {
        let (handler, _temp) = test_handler();
        let error = AppError::ResourceBusy("ModsConfig.xml".to_string());

        assert!(handler.try_recover(&error, "save").await);
        assert_eq!(handler.statistics().recovered_count, 1);
    }

    #[tokio::test]
    async fn test_try_recover_dispatches_to_ancestor() {
        let (handler, _temp) = test_handler();

        // NotFound has no strategy of its own; register one for its
        // ancestor Io and verify the walk reaches it.
        let strategy = FixedOutcome::new(true);
        handler.register_recovery_strategy(FailureKind::Io, strategy.clone());

        let error = AppError::NotFound("Mods/".to_string());
        assert!(handler.try_recover(&error, "scan").await);
        assert_eq!(strategy.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_try_recover_no_match_returns_false() {
        let (handler, _temp) = test_handler();
        let error = AppError::Internal("bug".to_string());

        assert!(!handler.try_recover(&error, "anything").await);
        assert_eq!(handler.statistics().recovered_count, 0);
    }

    #[tokio::test]
    async fn test_register_strategy_is_upsert() {
        let (handler, _temp) = test_handler();

        let first = FixedOutcome::new(false);
        let second = FixedOutcome::new(true);
        handler.register_recovery_strategy(FailureKind::Config, first.clone());
        handler.register_recovery_strategy(FailureKind::Config, second.clone());

        let error = AppError::Config("bad".to_string());
        assert!(handler.try_recover(&error, "load").await);
        assert_eq!(first.calls.load(Ordering::SeqCst), 0);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_at_most_one_strategy_runs() {
        let (handler, _temp) = test_handler();

        let exact = FixedOutcome::new(false);
        let ancestor = FixedOutcome::new(true);
        handler.register_recovery_strategy(FailureKind::NotFound, exact.clone());
        handler.register_recovery_strategy(FailureKind::Io, ancestor.clone());

        // Exact match wins even when it fails; the ancestor must not run.
        let error = AppError::NotFound("Mods/".to_string());
        assert!(!handler.try_recover(&error, "scan").await);
        assert_eq!(exact.calls.load(Ordering::SeqCst), 1);
        assert_eq!(ancestor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_safe_execute_success_passes_value() {
        let (handler, _temp) = test_handler();

        let result: AppResult<u32> = handler
            .safe_execute(|| async { Ok(7) }, "fetch", Severity::Error)
            .await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_safe_execute_below_critical_returns_default() {
        let (handler, _temp) = test_handler();

        let result: AppResult<u32> = handler
            .safe_execute(
                || async { Err(AppError::Internal("boom".to_string())) },
                "fetch",
                Severity::Error,
            )
            .await;
        assert_eq!(result.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_safe_execute_critical_propagates() {
        let (handler, _temp) = test_handler();

        let result: AppResult<u32> = handler
            .safe_execute(
                || async { Err(AppError::Internal("boom".to_string())) },
                "fetch",
                Severity::Critical,
            )
            .await;
        assert!(matches!(result, Err(AppError::Internal(_))));
        assert_eq!(handler.statistics().critical_count, 1);
    }

    #[tokio::test]
    async fn test_failure_event_reaches_subscriber() {
        let (handler, _temp) = test_handler();
        let mut rx = handler.subscribe();

        handler
            .handle_error(
                AppError::Internal("bug".to_string()),
                "scan",
                Severity::Critical,
            )
            .await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.severity, Severity::Critical);
        assert_eq!(event.context, "scan");
        assert!(!event.recovered);
    }

    #[tokio::test]
    async fn test_recovered_event_carries_flag() {
        let (handler, _temp) = test_handler();
        let mut rx = handler.subscribe();

        handler
            .handle_error(
                AppError::ResourceBusy("lock".to_string()),
                "save",
                Severity::Error,
            )
            .await;

        let event = rx.recv().await.unwrap();
        assert!(event.recovered);
    }

    #[tokio::test]
    async fn test_default_handler_runs_after_classification() {
        let (handler, _temp) = test_handler();

        let seen = Arc::new(AtomicBool::new(false));
        let seen_clone = Arc::clone(&seen);
        handler.set_default_handler(
            Severity::Warning,
            Arc::new(move |event| {
                assert_eq!(event.severity, Severity::Warning);
                seen_clone.store(true, Ordering::SeqCst);
            }),
        );

        handler
            .handle_error(
                AppError::Internal("odd".to_string()),
                "scan",
                Severity::Warning,
            )
            .await;
        assert!(seen.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_panicking_default_handler_is_contained() {
        let (handler, _temp) = test_handler();
        handler.set_default_handler(Severity::Error, Arc::new(|_| panic!("hook bug")));

        handler
            .handle_error(AppError::Internal("x".to_string()), "ctx", Severity::Error)
            .await;

        // Handler survived; statistics still recorded.
        assert_eq!(handler.statistics().total_errors, 1);
    }

    #[tokio::test]
    async fn test_reset_statistics_clears_history() {
        let (handler, _temp) = test_handler();
        handler
            .handle_error(AppError::Internal("x".to_string()), "ctx", Severity::Error)
            .await;
        assert_eq!(handler.recent_failures(10).len(), 1);

        handler.reset_statistics();
        assert_eq!(handler.statistics().total_errors, 0);
        assert!(handler.recent_failures(10).is_empty());
    }

    #[test]
    fn test_safe_execute_blocking_from_outside_runtime() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (handler, _temp) = {
            let _guard = runtime.enter();
            let temp = TempDir::new().unwrap();
            let config = LogConfig {
                console_enabled: false,
                ..LogConfig::default()
            };
            let sink = LogSink::spawn(config, temp.path());
            (ErrorHandler::new(sink), temp)
        };

        let result: AppResult<u32> = handler.safe_execute_blocking(
            runtime.handle(),
            || async { Err(AppError::Internal("boom".to_string())) },
            "startup",
            Severity::Error,
        );
        assert_eq!(result.unwrap(), 0);
    }
}
