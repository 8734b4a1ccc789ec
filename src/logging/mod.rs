/// Structured log sink for the failure-handling core
///
/// Every component logs through `LogSink`: enqueue is non-blocking, a
/// background task drains the queue about once a second and appends to
/// dated files, and Critical-or-above entries force an immediate flush so
/// the data-loss window stays small on fatal paths.
use crate::error::Severity;
use chrono::{DateTime, Utc};

pub mod sink;

pub use sink::LogSink;

/// Log sink configuration knobs exposed to operators
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Entries below this severity are dropped at enqueue time
    pub min_severity: Severity,

    /// Append entries to dated files
    pub file_enabled: bool,

    /// Mirror entries to the tracing console channel
    pub console_enabled: bool,

    /// Files older than this many days are removed by cleanup
    pub retention_days: u32,

    /// Files larger than this are rotated to a timestamped backup
    pub max_file_size: u64,

    /// How often the background loop drains the queue
    pub flush_interval: std::time::Duration,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            min_severity: Severity::Info,
            file_enabled: true,
            console_enabled: true,
            retention_days: 7,
            max_file_size: 10 * 1024 * 1024,
            flush_interval: std::time::Duration::from_secs(1),
        }
    }
}

/// A single log entry; immutable once enqueued
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub category: String,
    pub message: String,
    pub thread: Option<String>,
    /// Full failure chain text, present when the entry carries an error
    pub failure: Option<String>,
}

impl LogEntry {
    pub fn new(severity: Severity, message: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            severity,
            category: category.into(),
            message: message.into(),
            thread: std::thread::current().name().map(String::from),
            failure: None,
        }
    }

    pub fn with_failure(mut self, failure_text: impl Into<String>) -> Self {
        self.failure = Some(failure_text.into());
        self
    }

    /// Render the human-readable line format:
    /// `[timestamp] [LEVEL] [category] message (thread name)` with the
    /// failure chain indented below when present.
    pub fn format_line(&self) -> String {
        let mut line = format!(
            "[{}] [{}] [{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.severity,
            self.category,
            self.message
        );
        if let Some(thread) = &self.thread {
            line.push_str(&format!(" (thread {})", thread));
        }
        if let Some(failure) = &self.failure {
            for failure_line in failure.lines() {
                line.push_str("\n    ");
                line.push_str(failure_line);
            }
        }
        line
    }
}

/// Install a console tracing subscriber honoring `RUST_LOG`
///
/// Call once at process start; repeated calls are ignored.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_line_basic() {
        let mut entry = LogEntry::new(Severity::Warning, "mod list changed on disk", "scanner");
        entry.thread = None;
        let line = entry.format_line();

        assert!(line.contains("[WARN]"));
        assert!(line.contains("[scanner]"));
        assert!(line.ends_with("mod list changed on disk"));
    }

    #[test]
    fn test_format_line_with_failure_chain() {
        let mut entry = LogEntry::new(Severity::Error, "manifest rejected", "scanner")
            .with_failure("parse error\n  caused by: unexpected element");
        entry.thread = Some("worker-1".to_string());
        let line = entry.format_line();

        assert!(line.contains("(thread worker-1)"));
        assert!(line.contains("\n    parse error"));
        assert!(line.contains("\n      caused by: unexpected element"));
    }

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.min_severity, Severity::Info);
        assert!(config.file_enabled);
        assert_eq!(config.retention_days, 7);
    }
}
