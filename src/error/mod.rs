/// Failure classification and recovery for ModForge
///
/// This module is the recovery-and-dispatch core of the crate:
/// - Severity taxonomy driving logging, notification, and escalation
/// - An explicit failure-kind hierarchy for strategy dispatch
/// - Running statistics backed by a bounded failure history
/// - Pluggable recovery strategies with one-shot backoff built-ins
/// - The `ErrorHandler` wrapper tying it all together
///
/// # Architecture
///
/// ```text
/// ┌──────────────────────────────────────────┐
/// │        ErrorHandler (dispatch)           │
/// └──────┬──────────┬──────────────┬─────────┘
///        │          │              │
///        ↓          ↓              ↓
/// ┌────────────┐ ┌──────────┐ ┌─────────────┐
/// │Classification│ │Statistics│ │ Strategies  │
/// │ & Severity   │ │ + ring   │ │ (registry)  │
/// └────────────┘ └──────────┘ └─────────────┘
///        │
///        ↓ FailureEvent broadcast
/// ┌──────────────────────────────────────────┐
/// │ Subscribers: failure coordinator, UI     │
/// └──────────────────────────────────────────┘
/// ```
pub mod classification;
pub mod handler;
pub mod severity;
pub mod statistics;
pub mod strategy;

pub use classification::{FailureEvent, FailureKind};
pub use handler::{DefaultHandler, ErrorHandler};
pub use severity::Severity;
pub use statistics::{ErrorStatistics, StatisticsTracker, FAILURE_HISTORY_CAP};
pub use strategy::{NetworkTimeoutRetry, RecoveryStrategy, ResourceBusyRetry};
