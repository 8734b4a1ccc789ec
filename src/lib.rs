// Allow complex types where needed for comprehensive error handling and configuration
#![allow(clippy::type_complexity)]

pub mod config;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod report;
pub mod save;

pub use config::{AppPaths, ConfigStore, ResilienceConfig};
pub use coordinator::FailureCoordinator;
pub use error::{ErrorHandler, FailureEvent, FailureKind, RecoveryStrategy, Severity};
pub use logging::{LogConfig, LogSink};
pub use report::{ActionTracker, CrashReport, CrashReporter};
pub use save::{Savable, SaveOrchestrator};

use std::sync::Arc;
use thiserror::Error;

/// Application error surface for the failure-handling core
///
/// Classification into the recovery taxonomy lives in
/// `error::classification` (`AppError::kind`).
#[derive(Error, Debug)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Resource busy: {0}")]
    ResourceBusy(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Network timeout: {0}")]
    NetworkTimeout(String),

    #[error("Mod manifest parse error: {0}")]
    ManifestParse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// Manual Clone implementation because std::io::Error doesn't implement Clone
impl Clone for AppError {
    fn clone(&self) -> Self {
        match self {
            AppError::Io(e) => AppError::Io(std::io::Error::new(e.kind(), e.to_string())),
            AppError::ResourceBusy(s) => AppError::ResourceBusy(s.clone()),
            AppError::NotFound(s) => AppError::NotFound(s.clone()),
            AppError::PermissionDenied(s) => AppError::PermissionDenied(s.clone()),
            AppError::Network(s) => AppError::Network(s.clone()),
            AppError::NetworkTimeout(s) => AppError::NetworkTimeout(s.clone()),
            AppError::ManifestParse(s) => AppError::ManifestParse(s.clone()),
            AppError::Config(s) => AppError::Config(s.clone()),
            AppError::Unsupported(s) => AppError::Unsupported(s.clone()),
            AppError::Internal(s) => AppError::Internal(s.clone()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(format!("{:#}", err))
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// The fully wired failure-handling core
///
/// Built explicitly at process start; collaborators receive the pieces they
/// need through constructors rather than global lookup. Dropping this does
/// not stop the background tasks; it is expected to live for the process.
pub struct Resilience {
    pub sink: LogSink,
    pub handler: Arc<ErrorHandler>,
    pub reporter: Arc<CrashReporter>,
    pub orchestrator: Arc<SaveOrchestrator>,
    pub coordinator: Arc<FailureCoordinator>,
    pub actions: Arc<ActionTracker>,
}

impl Resilience {
    /// Wire the whole chain: log sink, error handler, crash reporter, save
    /// orchestrator, and the failure coordinator subscribed to the event
    /// stream. Must run inside a tokio runtime.
    pub fn start(config: &ResilienceConfig, paths: &AppPaths, app_version: &str) -> Self {
        let sink = LogSink::spawn(config.log_config(), &paths.logs_dir);
        let handler = Arc::new(ErrorHandler::new(sink.clone()));
        let actions = Arc::new(ActionTracker::new());
        let reporter = Arc::new(CrashReporter::new(
            &paths.crash_reports_dir,
            "ModForge",
            app_version,
            Arc::clone(&actions),
        ));
        let orchestrator = Arc::new(SaveOrchestrator::new(
            sink.clone(),
            paths
                .crash_reports_dir
                .parent()
                .unwrap_or(paths.crash_reports_dir.as_path()),
        ));
        let coordinator = Arc::new(
            FailureCoordinator::new(
                Arc::clone(&reporter),
                Arc::clone(&orchestrator),
                sink.clone(),
            )
            .with_auto_send(config.auto_send_reports),
        );
        coordinator.spawn_subscription(handler.subscribe());

        sink.log(Severity::Info, "failure-handling core started", "startup");

        Self {
            sink,
            handler,
            reporter,
            orchestrator,
            coordinator,
            actions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_clone_preserves_io_kind() {
        let original = AppError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        let cloned = original.clone();

        match (&original, &cloned) {
            (AppError::Io(a), AppError::Io(b)) => {
                assert_eq!(a.kind(), b.kind());
                assert_eq!(a.to_string(), b.to_string());
            }
            _ => panic!("clone changed variant"),
        }
    }

    #[test]
    fn test_anyhow_conversion() {
        let err: AppError = anyhow::anyhow!("wiring failed").into();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
