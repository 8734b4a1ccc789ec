/// Operator-facing configuration for the failure-handling core
///
/// The knobs here are the only ones operators touch: log verbosity and
/// retention, crash-report retention, and the (currently no-op) auto-send
/// toggle. The on-disk settings format of the wider application is out of
/// scope; `ConfigStore` exists to show how a settings holder plugs into the
/// save orchestrator.
use crate::error::Severity;
use crate::logging::LogConfig;
use crate::save::Savable;
use crate::{AppError, AppResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Log entries below this severity are dropped at enqueue time
    pub min_log_severity: Severity,

    pub file_logging: bool,
    pub console_logging: bool,

    /// Log files older than this are removed by retention cleanup
    pub log_retention_days: u32,

    /// Crash reports older than this are removed by retention cleanup
    pub crash_report_retention_days: u32,

    /// Upload crash reports automatically; currently a no-op path
    pub auto_send_reports: bool,

    /// Log files larger than this are rotated to a timestamped backup
    pub max_log_file_size: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            min_log_severity: Severity::Info,
            file_logging: true,
            console_logging: true,
            log_retention_days: 7,
            crash_report_retention_days: 30,
            auto_send_reports: false,
            max_log_file_size: 10 * 1024 * 1024,
        }
    }
}

impl ResilienceConfig {
    /// Load from a JSON file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("serializing config")?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
    }

    /// Derive the log sink configuration from the operator knobs
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            min_severity: self.min_log_severity,
            file_enabled: self.file_logging,
            console_enabled: self.console_logging,
            retention_days: self.log_retention_days,
            max_file_size: self.max_log_file_size,
            ..LogConfig::default()
        }
    }
}

/// Standard application directories for logs, crash reports, and config
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub logs_dir: PathBuf,
    pub crash_reports_dir: PathBuf,
    pub config_file: PathBuf,
}

impl AppPaths {
    /// Platform-appropriate locations under the application data directory
    pub fn resolve() -> Result<Self> {
        let dirs = ProjectDirs::from("com", "ModForge", "ModForge")
            .context("no home directory available")?;
        let data = dirs.data_dir();
        Ok(Self {
            logs_dir: data.join("Logs"),
            crash_reports_dir: data.join("CrashReports"),
            config_file: dirs.config_dir().join("resilience.json"),
        })
    }

    /// Everything rooted under one directory; used by tests
    pub fn under(root: &Path) -> Self {
        Self {
            logs_dir: root.join("Logs"),
            crash_reports_dir: root.join("CrashReports"),
            config_file: root.join("resilience.json"),
        }
    }
}

/// Shared config holder that registers with the save orchestrator as
/// "Settings"
pub struct ConfigStore {
    path: PathBuf,
    config: Mutex<ResilienceConfig>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>, config: ResilienceConfig) -> Self {
        Self {
            path: path.into(),
            config: Mutex::new(config),
        }
    }

    pub fn get(&self) -> ResilienceConfig {
        self.config.lock().unwrap().clone()
    }

    pub fn update(&self, mutate: impl FnOnce(&mut ResilienceConfig)) {
        mutate(&mut self.config.lock().unwrap());
    }
}

#[async_trait]
impl Savable for ConfigStore {
    fn name(&self) -> &str {
        "Settings"
    }

    async fn save(&self) -> AppResult<()> {
        let config = self.get();
        config
            .save(&self.path)
            .map_err(|e| AppError::Config(format!("{:#}", e)))
    }
}
