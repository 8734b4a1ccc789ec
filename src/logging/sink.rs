/// Background log sink: non-blocking enqueue, periodic flush to dated files
///
/// A single drain task owns the buffer, so appends within one flush batch
/// keep enqueue order. A shared write lock additionally serializes file
/// writes against retention operations running on caller tasks. A failure
/// to write is reported only on the last-resort debug channel; it never
/// reaches the logging caller.
use super::{LogConfig, LogEntry};
use crate::error::Severity;
use crate::AppError;
use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot, Mutex};

const LOG_FILE_PREFIX: &str = "modforge_";
const LOG_FILE_EXT: &str = "log";

enum SinkCommand {
    Entry(LogEntry),
    Flush(oneshot::Sender<()>),
}

/// Cheap cloneable handle to the log sink
#[derive(Clone)]
pub struct LogSink {
    tx: mpsc::UnboundedSender<SinkCommand>,
    min_severity: Severity,
    console_enabled: bool,
    dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl LogSink {
    /// Start the background drain task and return a handle to it
    pub fn spawn(config: LogConfig, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let write_lock = Arc::new(Mutex::new(()));

        tokio::spawn(run_loop(rx, config.clone(), dir.clone(), Arc::clone(&write_lock)));

        Self {
            tx,
            min_severity: config.min_severity,
            console_enabled: config.console_enabled,
            dir,
            write_lock,
        }
    }

    /// Enqueue an entry without blocking on I/O
    ///
    /// Entries below the configured minimum severity are dropped here.
    /// Critical-or-above entries make the drain task flush immediately.
    pub fn log(&self, severity: Severity, message: impl Into<String>, category: &str) {
        self.enqueue(LogEntry::new(severity, message, category));
    }

    /// Enqueue an entry carrying the full failure chain text
    pub fn log_failure(
        &self,
        severity: Severity,
        message: impl Into<String>,
        category: &str,
        error: &AppError,
    ) {
        self.enqueue(LogEntry::new(severity, message, category).with_failure(error.chain_text()));
    }

    fn enqueue(&self, entry: LogEntry) {
        if entry.severity < self.min_severity {
            return;
        }

        if self.console_enabled {
            emit_console(&entry);
        }

        if self.tx.send(SinkCommand::Entry(entry)).is_err() {
            tracing::debug!("log sink channel closed, entry dropped");
        }
    }

    /// Awaitable barrier: resolves once everything enqueued before the call
    /// has been written out
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(SinkCommand::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Delete log files whose creation time is older than `days`
    pub async fn cleanup_old_logs(&self, days: u32) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let cutoff = SystemTime::now() - Duration::from_secs(u64::from(days) * 24 * 60 * 60);
        let mut removed = 0;

        for path in log_files(&self.dir)? {
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
            tracing::info!(removed, days, "Old log files removed");
        }
        Ok(removed)
    }

    /// Delete every log file unconditionally
    pub async fn clear_all_logs(&self) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut removed = 0;
        for path in log_files(&self.dir)? {
            std::fs::remove_file(&path).with_context(|| format!("removing {}", path.display()))?;
            removed += 1;
        }
        Ok(removed)
    }

    pub fn log_dir(&self) -> &Path {
        &self.dir
    }
}

/// Mirror an entry to the tracing console channel at the matching level
fn emit_console(entry: &LogEntry) {
    match entry.severity {
        Severity::Info => {
            tracing::info!(category = %entry.category, "{}", entry.message)
        }
        Severity::Warning => {
            tracing::warn!(category = %entry.category, "{}", entry.message)
        }
        Severity::Error | Severity::Critical | Severity::Fatal => {
            tracing::error!(
                category = %entry.category,
                severity = %entry.severity,
                "{}", entry.message
            )
        }
    }
}

async fn run_loop(
    mut rx: mpsc::UnboundedReceiver<SinkCommand>,
    config: LogConfig,
    dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
) {
    let mut buffer: Vec<LogEntry> = Vec::new();
    let mut interval = tokio::time::interval(config.flush_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(SinkCommand::Entry(entry)) => {
                    let urgent = entry.severity >= Severity::Critical;
                    buffer.push(entry);
                    if urgent {
                        flush_buffer(&mut buffer, &config, &dir, &write_lock).await;
                    }
                }
                Some(SinkCommand::Flush(ack)) => {
                    flush_buffer(&mut buffer, &config, &dir, &write_lock).await;
                    let _ = ack.send(());
                }
                None => {
                    flush_buffer(&mut buffer, &config, &dir, &write_lock).await;
                    break;
                }
            },
            _ = interval.tick() => {
                if !buffer.is_empty() {
                    flush_buffer(&mut buffer, &config, &dir, &write_lock).await;
                }
            }
        }
    }
}

/// Write out the buffer, grouped by calendar date, preserving enqueue order
/// within each group
async fn flush_buffer(
    buffer: &mut Vec<LogEntry>,
    config: &LogConfig,
    dir: &Path,
    write_lock: &Mutex<()>,
) {
    if buffer.is_empty() {
        return;
    }
    if !config.file_enabled {
        buffer.clear();
        return;
    }

    let _guard = write_lock.lock().await;

    let mut by_date: BTreeMap<NaiveDate, String> = BTreeMap::new();
    for entry in buffer.drain(..) {
        let date = entry.timestamp.date_naive();
        let lines = by_date.entry(date).or_default();
        lines.push_str(&entry.format_line());
        lines.push('\n');
    }

    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        tracing::debug!(error = %e, "log directory creation failed, batch dropped");
        return;
    }

    for (date, content) in by_date {
        let path = dir.join(format!("{}{}.{}", LOG_FILE_PREFIX, date, LOG_FILE_EXT));

        rotate_if_oversized(&path, config.max_file_size, date).await;

        let open = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .await;
        match open {
            Ok(mut file) => {
                // write_all alone may leave the bytes in tokio's internal
                // buffer; the barrier must not ack until they hit the file.
                if let Err(e) = file.write_all(content.as_bytes()).await {
                    tracing::debug!(file = %path.display(), error = %e, "log append failed");
                } else if let Err(e) = file.flush().await {
                    tracing::debug!(file = %path.display(), error = %e, "log flush failed");
                }
            }
            Err(e) => {
                tracing::debug!(file = %path.display(), error = %e, "log file open failed");
            }
        }
    }
}

/// Rename an oversized log file to `modforge_{date}.{HHMMSS}.log` (with a
/// counter suffix if that name is taken) before the next append; simple
/// rotation, not compaction
async fn rotate_if_oversized(path: &Path, max_size: u64, date: NaiveDate) {
    let Ok(meta) = tokio::fs::metadata(path).await else {
        return;
    };
    if meta.len() <= max_size {
        return;
    }

    let stamp = Local::now().format("%H%M%S");
    let mut backup =
        path.with_file_name(format!("{}{}.{}.{}", LOG_FILE_PREFIX, date, stamp, LOG_FILE_EXT));
    // Two rotations within the same second must not overwrite each other.
    let mut attempt = 1u32;
    while tokio::fs::try_exists(&backup).await.unwrap_or(false) {
        backup = path.with_file_name(format!(
            "{}{}.{}-{}.{}",
            LOG_FILE_PREFIX, date, stamp, attempt, LOG_FILE_EXT
        ));
        attempt += 1;
    }
    if let Err(e) = tokio::fs::rename(path, &backup).await {
        tracing::debug!(file = %path.display(), error = %e, "log rotation failed");
    } else {
        tracing::info!(backup = %backup.display(), "Log file rotated");
    }
}

fn log_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(e) => return Err(e).context("reading log directory"),
    };

    for entry in entries {
        let path = entry?.path();
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        let is_log = name.starts_with(LOG_FILE_PREFIX)
            && path.extension().and_then(|e| e.to_str()) == Some(LOG_FILE_EXT);
        if is_log {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config() -> LogConfig {
        LogConfig {
            console_enabled: false,
            ..LogConfig::default()
        }
    }

    #[tokio::test]
    async fn test_log_and_flush_writes_dated_file() {
        let temp = TempDir::new().unwrap();
        let sink = LogSink::spawn(test_config(), temp.path());

        // The barrier must make earlier entries readable every single time,
        // not just once the drain task's file handle happens to sync.
        for round in 0..50u32 {
            sink.log(Severity::Info, format!("scan started {}", round), "scanner");
            sink.log(Severity::Error, format!("scan failed {}", round), "scanner");
            sink.flush().await;

            let files = log_files(temp.path()).unwrap();
            assert_eq!(files.len(), 1);

            let content = std::fs::read_to_string(&files[0]).unwrap();
            let scan_started = content
                .find(&format!("scan started {}", round))
                .unwrap_or_else(|| panic!("round {} missing after flush", round));
            let scan_failed = content
                .find(&format!("scan failed {}", round))
                .unwrap_or_else(|| panic!("round {} missing after flush", round));
            // Enqueue order preserved within the batch
            assert!(scan_started < scan_failed);
        }
    }

    #[tokio::test]
    async fn test_entries_below_min_severity_dropped() {
        let temp = TempDir::new().unwrap();
        let config = LogConfig {
            min_severity: Severity::Warning,
            ..test_config()
        };
        let sink = LogSink::spawn(config, temp.path());

        sink.log(Severity::Info, "noise", "scanner");
        sink.log(Severity::Warning, "kept", "scanner");
        sink.flush().await;

        let files = log_files(temp.path()).unwrap();
        let content = std::fs::read_to_string(&files[0]).unwrap();
        assert!(!content.contains("noise"));
        assert!(content.contains("kept"));
    }

    #[tokio::test]
    async fn test_critical_entry_flushes_immediately() {
        let temp = TempDir::new().unwrap();
        let config = LogConfig {
            // Long interval so only the fast-flush path can write in time
            flush_interval: Duration::from_secs(3600),
            ..test_config()
        };
        let sink = LogSink::spawn(config, temp.path());

        sink.log(Severity::Critical, "unhandled failure", "handler");

        // Give the drain task a moment, without a flush barrier
        tokio::time::sleep(Duration::from_millis(200)).await;

        let files = log_files(temp.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(std::fs::read_to_string(&files[0])
            .unwrap()
            .contains("unhandled failure"));
    }

    #[tokio::test]
    async fn test_rotation_renames_oversized_file() {
        let temp = TempDir::new().unwrap();
        let config = LogConfig {
            max_file_size: 64,
            ..test_config()
        };
        let sink = LogSink::spawn(config, temp.path());

        sink.log(Severity::Info, "x".repeat(200), "scanner");
        sink.flush().await;
        sink.log(Severity::Info, "after rotation", "scanner");
        sink.flush().await;

        let files = log_files(temp.path()).unwrap();
        assert_eq!(files.len(), 2, "expected current file plus rotated backup");
    }

    #[tokio::test]
    async fn test_repeated_rotation_keeps_every_backup() {
        let temp = TempDir::new().unwrap();
        let config = LogConfig {
            max_file_size: 64,
            ..test_config()
        };
        let sink = LogSink::spawn(config, temp.path());

        // Back-to-back rotations land within the same second; each backup
        // must still get its own name.
        for round in 0..3u32 {
            sink.log(Severity::Info, format!("batch {} {}", round, "x".repeat(200)), "scanner");
            sink.flush().await;
        }
        sink.log(Severity::Info, "tail entry", "scanner");
        sink.flush().await;

        let files = log_files(temp.path()).unwrap();
        assert_eq!(files.len(), 4, "expected three backups plus current file");

        let mut all = String::new();
        for file in &files {
            all.push_str(&std::fs::read_to_string(file).unwrap());
        }
        for round in 0..3u32 {
            assert!(all.contains(&format!("batch {}", round)));
        }
        assert!(all.contains("tail entry"));
    }

    #[tokio::test]
    async fn test_clear_all_logs() {
        let temp = TempDir::new().unwrap();
        let sink = LogSink::spawn(test_config(), temp.path());

        sink.log(Severity::Info, "entry", "scanner");
        sink.flush().await;

        let removed = sink.clear_all_logs().await.unwrap();
        assert_eq!(removed, 1);
        assert!(log_files(temp.path()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_keeps_recent_files() {
        let temp = TempDir::new().unwrap();
        let sink = LogSink::spawn(test_config(), temp.path());

        sink.log(Severity::Info, "entry", "scanner");
        sink.flush().await;

        // Freshly created files survive any positive threshold
        let removed = sink.cleanup_old_logs(1).await.unwrap();
        assert_eq!(removed, 0);
        assert_eq!(log_files(temp.path()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_log_failure_appends_chain() {
        let temp = TempDir::new().unwrap();
        let sink = LogSink::spawn(test_config(), temp.path());

        let error = AppError::ManifestParse("unexpected element <modz>".to_string());
        sink.log_failure(Severity::Error, "manifest rejected", "scanner", &error);
        sink.flush().await;

        let files = log_files(temp.path()).unwrap();
        let content = std::fs::read_to_string(&files[0]).unwrap();
        assert!(content.contains("manifest rejected"));
        assert!(content.contains("unexpected element <modz>"));
    }
}
