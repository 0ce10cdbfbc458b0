use std::sync::Arc;

use parking_lot::Mutex;
use serde::{
  Deserialize,
  Serialize
};
use serde_json::Value;
use thiserror::Error;
use tracing::{
  debug,
  error,
  info,
  warn
};

use crate::storage::KeyValueStorage;
use crate::store::{
  StoreChange,
  StoreObserver
};
use crate::task::Task;

/// Slot holding the task snapshot.
pub const STORAGE_KEY: &str =
  "persist:root";
/// Where an unreadable snapshot is copied
/// before anything overwrites it.
pub const BACKUP_KEY: &str =
  "persist:root.bak";
pub const SNAPSHOT_VERSION: u64 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
  #[error("snapshot is malformed: {0}")]
  Malformed(#[from] serde_json::Error),
  #[error(
    "snapshot holds no task collection"
  )]
  MissingTasks,
  #[error(
    "unsupported snapshot version {0}"
  )]
  UnsupportedVersion(u64)
}

#[derive(Serialize)]
struct SnapshotOut<'a> {
  version: u64,
  tasks:   &'a [Task]
}

/// Records that failed to parse are left
/// out and counted in `skipped`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSnapshot {
  pub tasks:   Vec<Task>,
  pub skipped: usize
}

pub fn encode_snapshot(
  tasks: &[Task]
) -> serde_json::Result<String> {
  serde_json::to_string(&SnapshotOut {
    version: SNAPSHOT_VERSION,
    tasks
  })
}

pub fn decode_snapshot(
  raw: &str
) -> Result<Vec<Task>, SnapshotError> {
  decode_snapshot_report(raw)
    .map(|decoded| decoded.tasks)
}

/// Accepts the versioned layout and the
/// legacy double-encoded one, where
/// `tasks` is itself a JSON string.
pub fn decode_snapshot_report(
  raw: &str
) -> Result<DecodedSnapshot, SnapshotError> {
  let root: Value =
    serde_json::from_str(raw)?;

  if let Some(version) =
    root.get("version")
  {
    let version = version
      .as_u64()
      .ok_or(SnapshotError::MissingTasks)?;
    if version > SNAPSHOT_VERSION {
      return Err(
        SnapshotError::UnsupportedVersion(
          version
        )
      );
    }
    return match root.get("tasks") {
      | Some(Value::Array(records)) => {
        Ok(decode_records(records))
      }
      | _ => Err(SnapshotError::MissingTasks)
    };
  }

  match root.get("tasks") {
    | Some(Value::String(inner)) => {
      debug!(
        "decoding legacy double-encoded \
         snapshot"
      );
      let inner: Value =
        serde_json::from_str(inner)?;
      match inner.get("tasks") {
        | Some(Value::Array(records)) => {
          Ok(decode_records(records))
        }
        | _ => {
          Err(SnapshotError::MissingTasks)
        }
      }
    }
    | Some(Value::Array(records)) => {
      Ok(decode_records(records))
    }
    | _ => Err(SnapshotError::MissingTasks)
  }
}

fn decode_records(
  records: &[Value]
) -> DecodedSnapshot {
  let mut tasks =
    Vec::with_capacity(records.len());
  let mut skipped = 0;
  for (index, record) in
    records.iter().enumerate()
  {
    match Task::deserialize(record) {
      | Ok(task) => tasks.push(task),
      | Err(err) => {
        warn!(
          index,
          error = %err,
          "skipping unreadable task record"
        );
        skipped += 1;
      }
    }
  }
  DecodedSnapshot {
    tasks,
    skipped
  }
}

/// Last snapshot write that failed, shared
/// between the bridge and whoever
/// dispatched the action.
#[derive(Debug, Clone, Default)]
pub struct WriteFailures {
  last: Arc<Mutex<Option<String>>>
}

impl WriteFailures {
  fn record(&self, message: String) {
    *self.last.lock() = Some(message);
  }

  pub fn take(&self) -> Option<String> {
    self.last.lock().take()
  }
}

/// Mirrors the task collection into
/// storage whenever it changes.
pub struct PersistenceBridge {
  storage:  Arc<dyn KeyValueStorage>,
  key:      String,
  failures: WriteFailures
}

impl PersistenceBridge {
  pub fn new(
    storage: Arc<dyn KeyValueStorage>
  ) -> Self {
    Self {
      storage,
      key: STORAGE_KEY.to_string(),
      failures: WriteFailures::default()
    }
  }

  pub fn failures(
    &self
  ) -> WriteFailures {
    self.failures.clone()
  }

  #[tracing::instrument(skip(
    self, tasks
  ), fields(key = %self.key, count = tasks.len()))]
  pub fn write(
    &self,
    tasks: &[Task]
  ) -> anyhow::Result<()> {
    let payload =
      encode_snapshot(tasks)?;
    self.storage.set(&self.key, &payload)?;
    debug!("wrote task snapshot");
    Ok(())
  }
}

impl StoreObserver
  for PersistenceBridge
{
  fn on_change(
    &mut self,
    change: &StoreChange<'_>
  ) {
    if !change.tasks_changed {
      return;
    }

    if let Err(err) =
      self.write(change.tasks)
    {
      let message = format!("{err:#}");
      error!(
        error = %message,
        action = change.action.name(),
        "failed to persist tasks"
      );
      self.failures.record(message);
    } else if matches!(
      change.action,
      crate::store::TaskAction::LoadSucceeded(_)
    ) {
      info!(
        count = change.tasks.len(),
        "snapshot rewritten after load"
      );
    }
  }
}
