/// Best-effort environment snapshots for crash reports
///
/// Collection never fails: anything the host refuses to reveal is recorded
/// as an empty string or zero rather than an error.
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use sysinfo::System;

const RECENT_ACTION_CAP: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os_name: String,
    pub os_version: String,
    pub kernel_version: String,
    pub architecture: String,
    pub host_name: String,
    pub processor_count: usize,
    pub total_memory_bytes: u64,
    pub available_memory_bytes: u64,
    pub locale: String,
}

impl SystemInfo {
    pub fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();

        Self {
            os_name: System::name().unwrap_or_default(),
            os_version: System::os_version().unwrap_or_default(),
            kernel_version: System::kernel_version().unwrap_or_default(),
            architecture: std::env::consts::ARCH.to_string(),
            host_name: System::host_name().unwrap_or_default(),
            processor_count: num_cpus::get(),
            total_memory_bytes: sys.total_memory(),
            available_memory_bytes: sys.available_memory(),
            locale: std::env::var("LANG").unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationInfo {
    pub name: String,
    pub version: String,
    pub debug_build: bool,
    /// Loaded mod/module names, as reported by the scanner at crash time
    pub loaded_modules: Vec<String>,
}

/// What the user was doing when things went wrong
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserActionSnapshot {
    pub last_action: String,
    pub recent_actions: Vec<String>,
    pub active_tab: String,
}

/// Bounded ring of recent user actions, fed by the UI layer
///
/// The UI bridge calls `record_action` per user gesture and `set_active_tab`
/// on navigation; the crash reporter takes a snapshot on demand.
pub struct ActionTracker {
    inner: Mutex<ActionState>,
}

struct ActionState {
    recent: VecDeque<String>,
    active_tab: String,
}

impl ActionTracker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ActionState {
                recent: VecDeque::with_capacity(RECENT_ACTION_CAP),
                active_tab: String::new(),
            }),
        }
    }

    pub fn record_action(&self, action: impl Into<String>) {
        let mut state = self.inner.lock().unwrap();
        if state.recent.len() >= RECENT_ACTION_CAP {
            state.recent.pop_front();
        }
        state.recent.push_back(action.into());
    }

    pub fn set_active_tab(&self, tab: impl Into<String>) {
        self.inner.lock().unwrap().active_tab = tab.into();
    }

    pub fn snapshot(&self) -> UserActionSnapshot {
        let state = self.inner.lock().unwrap();
        UserActionSnapshot {
            last_action: state.recent.back().cloned().unwrap_or_default(),
            recent_actions: state.recent.iter().cloned().collect(),
            active_tab: state.active_tab.clone(),
        }
    }
}

impl Default for ActionTracker {
    fn default() -> Self {
        Self::new()
    }
}
