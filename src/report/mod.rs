/// Diagnostic snapshot writer
///
/// On an unrecovered fatal failure the coordinator asks for a structured
/// snapshot of the world: the failure chain, system and application info,
/// and what the user was last doing. Reports are plain JSON files named by
/// timestamp plus the first 8 characters of the report id; the live error
/// value itself is never serialized, only its textual projection.
use crate::AppError;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

pub mod system_info;

pub use system_info::{ActionTracker, ApplicationInfo, SystemInfo, UserActionSnapshot};

const REPORT_FILE_PREFIX: &str = "CrashReport_";

/// Immutable diagnostic snapshot; written once, never mutated after
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashReport {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub context: String,
    pub error_kind: String,
    pub error_message: String,
    /// Full cause chain rendered as text
    pub error_chain: String,
    pub system: SystemInfo,
    pub application: ApplicationInfo,
    pub user_actions: UserActionSnapshot,
}

pub struct CrashReporter {
    dir: PathBuf,
    app_name: String,
    app_version: String,
    loaded_modules: Mutex<Vec<String>>,
    actions: Arc<ActionTracker>,
}

impl CrashReporter {
    pub fn new(
        dir: impl Into<PathBuf>,
        app_name: impl Into<String>,
        app_version: impl Into<String>,
        actions: Arc<ActionTracker>,
    ) -> Self {
        Self {
            dir: dir.into(),
            app_name: app_name.into(),
            app_version: app_version.into(),
            loaded_modules: Mutex::new(Vec::new()),
            actions,
        }
    }

    /// Record the currently loaded mod list so reports can include it
    pub fn set_loaded_modules(&self, modules: Vec<String>) {
        *self.loaded_modules.lock().unwrap() = modules;
    }

    /// Assemble a report synchronously; never fails, absent data is
    /// recorded as empty rather than as an error
    pub fn generate_report(&self, error: &AppError, context: &str) -> CrashReport {
        CrashReport {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            context: context.to_string(),
            error_kind: error.kind().to_string(),
            error_message: error.to_string(),
            error_chain: error.chain_text(),
            system: SystemInfo::collect(),
            application: ApplicationInfo {
                name: self.app_name.clone(),
                version: self.app_version.clone(),
                debug_build: cfg!(debug_assertions),
                loaded_modules: self.loaded_modules.lock().unwrap().clone(),
            },
            user_actions: self.actions.snapshot(),
        }
    }

    /// Serialize the report to `CrashReport_{yyyyMMdd_HHmmss}_{id8}.json`,
    /// creating the report directory on first use
    pub async fn save_report(&self, report: &CrashReport) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating report directory {}", self.dir.display()))?;

        let path = self.dir.join(report_file_name(report));
        let json = serde_json::to_string_pretty(report).context("serializing crash report")?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("writing crash report {}", path.display()))?;

        tracing::info!(report = %path.display(), "Crash report written");
        Ok(path)
    }

    /// All report files currently on disk, sorted by name (and thus by time)
    pub fn list_reports(&self) -> Result<Vec<PathBuf>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).context("reading crash report directory"),
        };

        let mut reports = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name.starts_with(REPORT_FILE_PREFIX) && name.ends_with(".json") {
                reports.push(path);
            }
        }
        reports.sort();
        Ok(reports)
    }

    /// Delete report files older than `keep_days`, mirroring the log sink's
    /// retention policy
    pub fn cleanup_old_reports(&self, keep_days: u32) -> Result<usize> {
        let cutoff = SystemTime::now() - Duration::from_secs(u64::from(keep_days) * 24 * 60 * 60);
        let mut removed = 0;

        for path in self.list_reports()? {
            let meta = std::fs::metadata(&path)
                .with_context(|| format!("reading metadata for {}", path.display()))?;
            let created = meta.created().or_else(|_| meta.modified())?;
            if created < cutoff {
                std::fs::remove_file(&path)
                    .with_context(|| format!("removing {}", path.display()))?;
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!(removed, keep_days, "Old crash reports removed");
        }
        Ok(removed)
    }

    /// Simulated remote upload; real delivery is out of scope
    pub async fn send_report(&self, report: &CrashReport) -> Result<()> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        tracing::info!(report_id = %report.id, "Crash report upload simulated");
        Ok(())
    }

    pub fn report_dir(&self) -> &Path {
        &self.dir
    }
}

fn report_file_name(report: &CrashReport) -> String {
    let id_segment: String = report.id.chars().take(8).collect();
    format!(
        "{}{}_{}.json",
        REPORT_FILE_PREFIX,
        report.timestamp.format("%Y%m%d_%H%M%S"),
        id_segment
    )
}
