/// Failure coordinator: the last tier of the failure cascade
///
/// Subscribes to the error handler's event stream and, for unrecovered
/// failures at Critical or above, runs the emergency sequence: write a
/// diagnostic snapshot first (so one exists even if saving then fails),
/// then ask the save orchestrator to persist everything. The sequence
/// itself has no further escalation tier; an internal failure there is
/// logged critically and swallowed.
use crate::error::{FailureEvent, Severity};
use crate::logging::LogSink;
use crate::report::CrashReporter;
use crate::save::SaveOrchestrator;
use crate::AppError;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const LOG_CATEGORY: &str = "coordinator";

/// Record of the most recent escalated failure
#[derive(Debug, Clone)]
pub struct Incident {
    pub at: DateTime<Utc>,
    pub source: String,
    pub message: String,
}

/// Clears the in-flight flag when the sequence ends, however it ends; a
/// panic mid-sequence must not leave later triggers locked out.
struct SequenceGuard<'a>(&'a AtomicBool);

impl Drop for SequenceGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct FailureCoordinator {
    reporter: Arc<CrashReporter>,
    orchestrator: Arc<SaveOrchestrator>,
    sink: LogSink,
    /// Sticky: entered once, never exited. The surrounding application is
    /// expected to terminate after the emergency sequence.
    emergency_mode: AtomicBool,
    /// Guards against two overlapping emergency sequences: a trigger that
    /// arrives while one is in flight is ignored.
    sequence_active: AtomicBool,
    last_incident: Mutex<Option<Incident>>,
    auto_send: bool,
}

impl FailureCoordinator {
    pub fn new(
        reporter: Arc<CrashReporter>,
        orchestrator: Arc<SaveOrchestrator>,
        sink: LogSink,
    ) -> Self {
        Self {
            reporter,
            orchestrator,
            sink,
            emergency_mode: AtomicBool::new(false),
            sequence_active: AtomicBool::new(false),
            last_incident: Mutex::new(None),
            auto_send: false,
        }
    }

    /// Also push each written report through the (simulated) upload path
    pub fn with_auto_send(mut self, enabled: bool) -> Self {
        self.auto_send = enabled;
        self
    }

    pub fn in_emergency_mode(&self) -> bool {
        self.emergency_mode.load(Ordering::SeqCst)
    }

    pub fn last_incident(&self) -> Option<Incident> {
        self.last_incident.lock().unwrap().clone()
    }

    /// Entry point for failures nothing else caught
    pub async fn handle_global_exception(&self, error: &AppError, source: &str) {
        self.emergency_mode.store(true, Ordering::SeqCst);
        *self.last_incident.lock().unwrap() = Some(Incident {
            at: Utc::now(),
            source: source.to_string(),
            message: error.to_string(),
        });

        self.sink.log_failure(
            Severity::Critical,
            format!("entering emergency mode, unhandled failure from {}", source),
            LOG_CATEGORY,
            error,
        );

        self.perform_emergency_shutdown(error, source).await;
    }

    /// The emergency sequence: diagnostic snapshot, then save-all
    ///
    /// Every step is best-effort; failures inside this path are logged and
    /// swallowed. This is the terminal failure mode.
    pub async fn perform_emergency_shutdown(&self, error: &AppError, context: &str) {
        if self
            .sequence_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!(context, "emergency sequence already in flight, trigger ignored");
            return;
        }
        let _active = SequenceGuard(&self.sequence_active);

        // Snapshot first so diagnostics exist even if saving fails below.
        let report = self.reporter.generate_report(error, context);
        match self.reporter.save_report(&report).await {
            Ok(path) => {
                self.sink.log(
                    Severity::Info,
                    format!("crash report written to {}", path.display()),
                    LOG_CATEGORY,
                );
                if self.auto_send {
                    if let Err(send_error) = self.reporter.send_report(&report).await {
                        self.sink.log(
                            Severity::Warning,
                            format!("crash report upload failed: {:#}", send_error),
                            LOG_CATEGORY,
                        );
                    }
                }
            }
            Err(report_error) => {
                self.sink.log(
                    Severity::Critical,
                    format!("crash report write failed: {:#}", report_error),
                    LOG_CATEGORY,
                );
            }
        }

        let all_saved = self.orchestrator.save_all().await;
        self.sink.log(
            if all_saved { Severity::Info } else { Severity::Critical },
            format!("emergency save-all finished (all_ok: {})", all_saved),
            LOG_CATEGORY,
        );

        // Bound the data-loss window before the process goes down.
        self.sink.flush().await;
    }

    /// Consume the error handler's event stream; call once at startup.
    /// Unrecovered events at Critical or above trigger the emergency
    /// sequence.
    pub fn spawn_subscription(
        self: &Arc<Self>,
        mut events: broadcast::Receiver<FailureEvent>,
    ) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if event.severity.escalates() && !event.recovered {
                            coordinator
                                .handle_global_exception(&event.error, &event.context)
                                .await;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "failure event subscription lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
