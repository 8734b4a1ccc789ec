/// Severity taxonomy for failure classification
///
/// Severity drives three things: the log level an entry is written at,
/// whether callers see a blocking notice, and escalation eligibility.
/// Fatal is treated as Critical for escalation purposes.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered classification of a failure's impact
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Log only, no user-visible notice
    Info,

    /// Log plus a non-blocking notice
    Warning,

    /// Log plus a blocking notice
    Error,

    /// Eligible for the emergency sequence when not recovered
    Critical,

    /// Treated as Critical for escalation purposes
    Fatal,
}

impl Severity {
    /// Uppercase name used in log file lines
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARN",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
            Severity::Fatal => "FATAL",
        }
    }

    /// Map to the closest tracing level for the console channel
    pub fn tracing_level(&self) -> tracing::Level {
        match self {
            Severity::Info => tracing::Level::INFO,
            Severity::Warning => tracing::Level::WARN,
            Severity::Error | Severity::Critical | Severity::Fatal => tracing::Level::ERROR,
        }
    }

    /// Whether an unrecovered failure at this severity escalates to the
    /// failure coordinator
    pub fn escalates(&self) -> bool {
        *self >= Severity::Critical
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
