/// Running failure statistics backed by a bounded event history
///
/// Every handled failure updates the totals and lands in the history ring.
/// All mutation happens under a single mutex so updates stay atomic with
/// respect to each other. Reset is an explicit operator action only.
use super::classification::{FailureEvent, FailureKind};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Hard cap on the failure history ring; inserting past it evicts the oldest
pub const FAILURE_HISTORY_CAP: usize = 1_000;

/// Snapshot of the running totals
#[derive(Debug, Clone, Default)]
pub struct ErrorStatistics {
    /// Total handled failures, incremented exactly once per handled failure
    pub total_errors: u64,

    /// Failures at Critical or Fatal severity
    pub critical_count: u64,

    /// Failures at Warning severity
    pub warning_count: u64,

    /// Failures a recovery strategy resolved
    pub recovered_count: u64,

    /// When the most recent failure was handled
    pub last_error_at: Option<DateTime<Utc>>,

    /// Occurrence count per failure kind
    pub counts_by_kind: HashMap<FailureKind, u64>,

    /// Kind with the highest occurrence count
    pub most_frequent_kind: Option<FailureKind>,
}

struct TrackerInner {
    stats: ErrorStatistics,
    history: VecDeque<FailureEvent>,
}

/// Mutex-guarded statistics store shared by the error handler
pub struct StatisticsTracker {
    inner: Mutex<TrackerInner>,
}

impl StatisticsTracker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TrackerInner {
                stats: ErrorStatistics::default(),
                history: VecDeque::with_capacity(64),
            }),
        }
    }

    /// Record a handled failure before any recovery attempt
    pub fn record_failure(&self, kind: FailureKind, severity: crate::error::Severity) {
        let mut inner = self.inner.lock().unwrap();
        let stats = &mut inner.stats;

        stats.total_errors += 1;
        if severity >= crate::error::Severity::Critical {
            stats.critical_count += 1;
        } else if severity == crate::error::Severity::Warning {
            stats.warning_count += 1;
        }
        stats.last_error_at = Some(Utc::now());

        let count = stats.counts_by_kind.entry(kind).or_insert(0);
        *count += 1;
        let count = *count;

        match stats.most_frequent_kind {
            Some(current) if current != kind => {
                let current_count = stats.counts_by_kind.get(&current).copied().unwrap_or(0);
                if count > current_count {
                    stats.most_frequent_kind = Some(kind);
                }
            }
            None => stats.most_frequent_kind = Some(kind),
            _ => {}
        }
    }

    /// Record a successful recovery
    pub fn record_recovery(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.stats.recovered_count += 1;
    }

    /// Append the final event to the history ring, evicting the oldest entry
    /// once the cap is reached
    pub fn push_event(&self, event: FailureEvent) {
        let mut inner = self.inner.lock().unwrap();
        if inner.history.len() >= FAILURE_HISTORY_CAP {
            inner.history.pop_front();
        }
        inner.history.push_back(event);
    }

    pub fn snapshot(&self) -> ErrorStatistics {
        self.inner.lock().unwrap().stats.clone()
    }

    /// Most recent events, newest last
    pub fn recent_failures(&self, limit: usize) -> Vec<FailureEvent> {
        let inner = self.inner.lock().unwrap();
        let skip = inner.history.len().saturating_sub(limit);
        inner.history.iter().skip(skip).cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.inner.lock().unwrap().history.len()
    }

    /// Clear totals and the history ring
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.stats = ErrorStatistics::default();
        inner.history.clear();
    }
}

impl Default for StatisticsTracker {
    fn default() -> Self {
        Self::new()
    }
}
