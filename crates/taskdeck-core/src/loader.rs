use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::persist::{BACKUP_KEY, STORAGE_KEY, SnapshotError, decode_snapshot_report};
use crate::storage::KeyValueStorage;
use crate::store::SharedStore;
use crate::task::Task;

/// Informational text shown in place of the list when nothing could be loaded.
pub const NO_TASKS_MESSAGE: &str = "No tasks added yet...";

#[derive(Debug, Error)]
pub enum LoadFailure {
    #[error("no snapshot stored")]
    Absent,
    #[error("snapshot holds no tasks")]
    Empty,
    #[error("snapshot unreadable: {0}")]
    Malformed(String),
}

impl LoadFailure {
    /// Every failure is presented the same way; the variant is kept for logs.
    pub fn user_message(&self) -> &'static str {
        NO_TASKS_MESSAGE
    }
}

#[derive(Debug)]
pub enum LoadReport {
    Loaded(usize),
    Failed(LoadFailure),
    /// Another run was still in flight.
    Skipped,
}

/// Reads the persisted snapshot, after an optional artificial delay.
#[tracing::instrument(skip(storage))]
pub async fn fetch_tasks(
    storage: &dyn KeyValueStorage,
    delay: Duration,
) -> Result<Vec<Task>, LoadFailure> {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let raw = match storage.get(STORAGE_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Err(LoadFailure::Absent),
        Err(err) => return Err(LoadFailure::Malformed(format!("{err:#}"))),
    };

    let decoded = match decode_snapshot_report(&raw) {
        Ok(decoded) => decoded,
        Err(err) => {
            keep_backup(storage, &raw);
            return Err(match err {
                SnapshotError::MissingTasks => LoadFailure::Empty,
                other => LoadFailure::Malformed(other.to_string()),
            });
        }
    };
    if decoded.skipped > 0 {
        warn!(
            skipped = decoded.skipped,
            kept = decoded.tasks.len(),
            "some stored tasks could not be read"
        );
        keep_backup(storage, &raw);
    }
    let tasks = decoded.tasks;

    if tasks.is_empty() {
        return Err(LoadFailure::Empty);
    }

    debug!(count = tasks.len(), "fetched tasks");
    Ok(tasks)
}

/// Copies a snapshot that did not fully decode to `BACKUP_KEY` before the
/// next write replaces it.
fn keep_backup(storage: &dyn KeyValueStorage, raw: &str) {
    match storage.set(BACKUP_KEY, raw) {
        Ok(()) => info!(key = BACKUP_KEY, "kept a copy of the unreadable snapshot"),
        Err(err) => warn!(error = %format!("{err:#}"), "could not back up unreadable snapshot"),
    }
}

pub struct LoadPipeline {
    storage: Arc<dyn KeyValueStorage>,
    delay: Duration,
    in_flight: AtomicBool,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl LoadPipeline {
    pub fn new(storage: Arc<dyn KeyValueStorage>, delay: Duration) -> Self {
        Self {
            storage,
            delay,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    #[tracing::instrument(skip_all, fields(delay_ms = self.delay.as_millis() as u64))]
    pub async fn run(&self, store: &SharedStore) -> LoadReport {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            warn!("load already in flight; ignoring duplicate trigger");
            return LoadReport::Skipped;
        }
        let _flight = InFlight(&self.in_flight);

        store.lock().begin_load();
        let result = fetch_tasks(&*self.storage, self.delay).await;

        let mut guard = store.lock();
        match result {
            Ok(tasks) => {
                let count = tasks.len();
                guard.load_succeeded(tasks);
                info!(count, "loaded tasks");
                LoadReport::Loaded(count)
            }
            Err(failure) => {
                info!(reason = %failure, "no tasks to load");
                guard.load_failed(failure.user_message());
                LoadReport::Failed(failure)
            }
        }
    }
}
