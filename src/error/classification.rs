/// Failure taxonomy for recovery strategy dispatch
///
/// Recovery strategies are keyed by `FailureKind` rather than by a live type.
/// The kind hierarchy is explicit: each kind knows its broader category, and
/// `ancestors()` walks from most-derived to least-derived. Strategy lookup
/// tries the exact kind first, then each ancestor in order.
use crate::error::Severity;
use crate::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag identifying a family of failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// Any filesystem or device I/O failure
    Io,

    /// Resource temporarily busy or locked (broader category: Io)
    ResourceBusy,

    /// Missing file or directory (broader category: Io)
    NotFound,

    /// Access denied (broader category: Io)
    PermissionDenied,

    /// Any network failure
    Network,

    /// Network operation exceeded its deadline (broader category: Network)
    NetworkTimeout,

    /// Any content parsing failure
    Parse,

    /// Malformed mod manifest (broader category: Parse)
    ManifestParse,

    /// Bad or missing configuration
    Config,

    /// Operation not supported in this context
    Unsupported,

    /// Invariant violation inside the application itself
    Internal,
}

impl FailureKind {
    /// The broader category this kind belongs to, if any
    pub fn parent(&self) -> Option<FailureKind> {
        match self {
            FailureKind::ResourceBusy => Some(FailureKind::Io),
            FailureKind::NotFound => Some(FailureKind::Io),
            FailureKind::PermissionDenied => Some(FailureKind::Io),
            FailureKind::NetworkTimeout => Some(FailureKind::Network),
            FailureKind::ManifestParse => Some(FailureKind::Parse),
            _ => None,
        }
    }

    /// Walk the ancestor chain, most-derived first, excluding `self`
    pub fn ancestors(&self) -> impl Iterator<Item = FailureKind> {
        std::iter::successors(self.parent(), |kind| kind.parent())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Io => "io",
            FailureKind::ResourceBusy => "resource_busy",
            FailureKind::NotFound => "not_found",
            FailureKind::PermissionDenied => "permission_denied",
            FailureKind::Network => "network",
            FailureKind::NetworkTimeout => "network_timeout",
            FailureKind::Parse => "parse",
            FailureKind::ManifestParse => "manifest_parse",
            FailureKind::Config => "config",
            FailureKind::Unsupported => "unsupported",
            FailureKind::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AppError {
    /// Classify this error into the failure taxonomy
    pub fn kind(&self) -> FailureKind {
        match self {
            AppError::Io(io_err) => classify_io_error(io_err),
            AppError::ResourceBusy(_) => FailureKind::ResourceBusy,
            AppError::NotFound(_) => FailureKind::NotFound,
            AppError::PermissionDenied(_) => FailureKind::PermissionDenied,
            AppError::Network(_) => FailureKind::Network,
            AppError::NetworkTimeout(_) => FailureKind::NetworkTimeout,
            AppError::ManifestParse(_) => FailureKind::ManifestParse,
            AppError::Config(_) => FailureKind::Config,
            AppError::Unsupported(_) => FailureKind::Unsupported,
            AppError::Internal(_) => FailureKind::Internal,
        }
    }

    /// Full cause chain rendered as text, one `caused by:` line per link
    pub fn chain_text(&self) -> String {
        let mut text = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            text.push_str("\n  caused by: ");
            text.push_str(&cause.to_string());
            source = cause.source();
        }
        text
    }
}

/// Refine raw I/O errors into more specific kinds where possible
fn classify_io_error(io_err: &std::io::Error) -> FailureKind {
    use std::io::ErrorKind;

    match io_err.kind() {
        ErrorKind::WouldBlock | ErrorKind::Interrupted => FailureKind::ResourceBusy,
        ErrorKind::NotFound => FailureKind::NotFound,
        ErrorKind::PermissionDenied => FailureKind::PermissionDenied,
        ErrorKind::TimedOut => FailureKind::NetworkTimeout,
        ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset => FailureKind::Network,
        _ => FailureKind::Io,
    }
}

/// Notification emitted once per handled failure
///
/// Consumed by subscribers (the failure coordinator, the UI bridge). The
/// event itself is never persisted; only derived artifacts are.
#[derive(Debug, Clone)]
pub struct FailureEvent {
    /// Originating failure, full cause chain attached
    pub error: AppError,

    /// Free-text context label (usually the operation name)
    pub context: String,

    /// Classification the caller supplied
    pub severity: Severity,

    /// Whether a recovery strategy resolved the failure
    pub recovered: bool,

    /// When the failure was handled
    pub timestamp: DateTime<Utc>,
}

impl FailureEvent {
    pub fn new(
        error: AppError,
        context: impl Into<String>,
        severity: Severity,
        recovered: bool,
    ) -> Self {
        Self {
            error,
            context: context.into(),
            severity,
            recovered,
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for FailureEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} in {}: {} (recovered: {})",
            self.severity,
            self.error.kind(),
            self.context,
            self.error,
            self.recovered
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_chain() {
        assert_eq!(FailureKind::ResourceBusy.parent(), Some(FailureKind::Io));
        assert_eq!(
            FailureKind::NetworkTimeout.parent(),
            Some(FailureKind::Network)
        );
        assert_eq!(FailureKind::ManifestParse.parent(), Some(FailureKind::Parse));
        assert_eq!(FailureKind::Io.parent(), None);
        assert_eq!(FailureKind::Internal.parent(), None);
    }

    #[test]
    fn test_ancestors_most_derived_first() {
        let chain: Vec<_> = FailureKind::ResourceBusy.ancestors().collect();
        assert_eq!(chain, vec![FailureKind::Io]);

        let chain: Vec<_> = FailureKind::Io.ancestors().collect();
        assert!(chain.is_empty());
    }

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(
            AppError::ResourceBusy("locked".to_string()).kind(),
            FailureKind::ResourceBusy
        );
        assert_eq!(
            AppError::NetworkTimeout("steam workshop".to_string()).kind(),
            FailureKind::NetworkTimeout
        );
        assert_eq!(
            AppError::ManifestParse("About.xml".to_string()).kind(),
            FailureKind::ManifestParse
        );
    }

    #[test]
    fn test_io_error_refinement() {
        let busy = AppError::Io(std::io::Error::new(
            std::io::ErrorKind::WouldBlock,
            "resource busy",
        ));
        assert_eq!(busy.kind(), FailureKind::ResourceBusy);

        let missing = AppError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no such file",
        ));
        assert_eq!(missing.kind(), FailureKind::NotFound);

        let generic = AppError::Io(std::io::Error::new(std::io::ErrorKind::WriteZero, "short"));
        assert_eq!(generic.kind(), FailureKind::Io);
    }

    #[test]
    fn test_chain_text_includes_cause() {
        let inner = std::io::Error::new(std::io::ErrorKind::NotFound, "About.xml missing");
        let error = AppError::Io(inner);
        let text = error.chain_text();

        assert!(text.starts_with("I/O error"));
        assert!(text.contains("caused by: About.xml missing"));
    }

    #[test]
    fn test_failure_event_display() {
        let event = FailureEvent::new(
            AppError::Config("bad path".to_string()),
            "load_settings",
            Severity::Error,
            false,
        );
        let rendered = event.to_string();
        assert!(rendered.contains("[ERROR]"));
        assert!(rendered.contains("load_settings"));
        assert!(rendered.contains("recovered: false"));
    }
}
