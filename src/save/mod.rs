/// Save orchestrator: registry of savable components plus best-effort
/// concurrent save-all
///
/// Any subsystem holding durable state registers itself under a unique name
/// at startup and unregisters at teardown; the orchestrator holds only a
/// live reference for the duration of registration. `save_all` fans every
/// save out concurrently and one component's failure (or panic) never
/// blocks the others.
use crate::error::Severity;
use crate::logging::LogSink;
use crate::{AppError, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

const LOG_CATEGORY: &str = "save";

/// Capability contract for anything that can persist its own state on demand
#[async_trait]
pub trait Savable: Send + Sync {
    /// Unique registry key
    fn name(&self) -> &str;

    /// Persist current state now
    async fn save(&self) -> AppResult<()>;
}

/// Point-in-time view of the orchestrator's save bookkeeping
#[derive(Debug, Clone)]
pub struct EmergencySaveStatus {
    pub last_save_at: Option<DateTime<Utc>>,
    pub save_count: u64,
    pub in_progress: bool,
    pub target_dir: PathBuf,
}

#[derive(Default)]
struct SaveBookkeeping {
    last_save_at: Option<DateTime<Utc>>,
    save_count: u64,
}

pub struct SaveOrchestrator {
    components: RwLock<HashMap<String, Arc<dyn Savable>>>,
    bookkeeping: Mutex<SaveBookkeeping>,
    in_progress: AtomicBool,
    sink: LogSink,
    target_dir: PathBuf,
}

impl SaveOrchestrator {
    pub fn new(sink: LogSink, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            components: RwLock::new(HashMap::new()),
            bookkeeping: Mutex::new(SaveBookkeeping::default()),
            in_progress: AtomicBool::new(false),
            sink,
            target_dir: target_dir.into(),
        }
    }

    /// Register a component; the last registration under a name wins
    pub fn register(&self, component: Arc<dyn Savable>) {
        let name = component.name().to_string();
        let replaced = self
            .components
            .write()
            .unwrap()
            .insert(name.clone(), component)
            .is_some();
        if replaced {
            self.sink.log(
                Severity::Info,
                format!("savable component {} re-registered", name),
                LOG_CATEGORY,
            );
        }
    }

    /// Remove a component; returns whether it was registered
    pub fn unregister(&self, name: &str) -> bool {
        self.components.write().unwrap().remove(name).is_some()
    }

    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.components.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    /// Coarse signal: true whenever at least one component is registered.
    /// This is deliberately not dirty-tracking; a registered component with
    /// nothing new to write still counts.
    pub fn has_unsaved_data(&self) -> bool {
        !self.components.read().unwrap().is_empty()
    }

    /// Launch every registered component's save concurrently, wait for all,
    /// and return the logical AND of the individual outcomes
    ///
    /// Each outcome is logged independently; a panic inside one save is
    /// isolated by its task and counted as a failure.
    pub async fn save_all(&self) -> bool {
        let components: Vec<(String, Arc<dyn Savable>)> = self
            .components
            .read()
            .unwrap()
            .iter()
            .map(|(name, component)| (name.clone(), Arc::clone(component)))
            .collect();

        self.in_progress.store(true, Ordering::SeqCst);
        self.sink.log(
            Severity::Info,
            format!("emergency save started for {} components", components.len()),
            LOG_CATEGORY,
        );

        let tasks: Vec<_> = components
            .into_iter()
            .map(|(name, component)| {
                let handle = tokio::spawn(async move { component.save().await });
                (name, handle)
            })
            .collect();

        let mut all_ok = true;
        let results = join_all(tasks.into_iter().map(|(name, handle)| async move {
            (name, handle.await)
        }))
        .await;

        for (name, joined) in results {
            match joined {
                Ok(Ok(())) => {
                    self.sink
                        .log(Severity::Info, format!("{} saved", name), LOG_CATEGORY);
                }
                Ok(Err(error)) => {
                    all_ok = false;
                    self.sink.log_failure(
                        Severity::Error,
                        format!("{} failed to save", name),
                        LOG_CATEGORY,
                        &error,
                    );
                }
                Err(join_error) => {
                    all_ok = false;
                    self.sink.log(
                        Severity::Error,
                        format!("{} save task aborted: {}", name, join_error),
                        LOG_CATEGORY,
                    );
                }
            }
        }

        {
            let mut bookkeeping = self.bookkeeping.lock().unwrap();
            bookkeeping.last_save_at = Some(Utc::now());
            bookkeeping.save_count += 1;
        }
        self.in_progress.store(false, Ordering::SeqCst);

        self.sink.log(
            if all_ok { Severity::Info } else { Severity::Warning },
            format!("emergency save finished (all_ok: {})", all_ok),
            LOG_CATEGORY,
        );
        all_ok
    }

    /// Targeted save outside the emergency path
    pub async fn save_by_name(&self, name: &str) -> AppResult<()> {
        let component = self
            .components
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("savable component {}", name)))?;

        component.save().await
    }

    pub fn status(&self) -> EmergencySaveStatus {
        let bookkeeping = self.bookkeeping.lock().unwrap();
        EmergencySaveStatus {
            last_save_at: bookkeeping.last_save_at,
            save_count: bookkeeping.save_count,
            in_progress: self.in_progress.load(Ordering::SeqCst),
            target_dir: self.target_dir.clone(),
        }
    }
}
