use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::task::{Status, Task};

pub type SharedStore = Arc<Mutex<TaskStore>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum LoadStatus {
    #[default]
    Idle,
    Loading,
    Loaded,
    Errored(String),
}

impl LoadStatus {
    pub fn is_loading(&self) -> bool {
        matches!(self, LoadStatus::Loading)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            LoadStatus::Errored(message) => Some(message),
            _ => None,
        }
    }
}

/// Every mutation the store accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum TaskAction {
    Add(Task),
    Update(Task),
    Delete(String),
    BulkLoad(Vec<Task>),
    BeginLoad,
    LoadSucceeded(Vec<Task>),
    LoadFailed(String),
}

impl TaskAction {
    pub fn name(&self) -> &'static str {
        match self {
            TaskAction::Add(_) => "tasks/add",
            TaskAction::Update(_) => "tasks/update",
            TaskAction::Delete(_) => "tasks/delete",
            TaskAction::BulkLoad(_) => "tasks/bulkLoad",
            TaskAction::BeginLoad => "tasks/fetch/pending",
            TaskAction::LoadSucceeded(_) => "tasks/fetch/fulfilled",
            TaskAction::LoadFailed(_) => "tasks/fetch/rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    Applied,
    /// The action targeted an id the collection does not hold. State is untouched.
    NotFound(String),
}

impl Dispatched {
    pub fn is_applied(&self) -> bool {
        matches!(self, Dispatched::Applied)
    }
}

/// What observers see after each dispatched action.
#[derive(Debug)]
pub struct StoreChange<'a> {
    pub action: &'a TaskAction,
    pub tasks: &'a [Task],
    pub status: &'a LoadStatus,
    pub tasks_changed: bool,
}

pub trait StoreObserver: Send {
    fn on_change(&mut self, change: &StoreChange<'_>);
}

#[derive(Default)]
pub struct TaskStore {
    tasks: Vec<Task>,
    status: LoadStatus,
    observers: Vec<Box<dyn StoreObserver>>,
}

impl fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskStore")
            .field("tasks", &self.tasks)
            .field("status", &self.status)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    pub fn subscribe(&mut self, observer: Box<dyn StoreObserver>) {
        self.observers.push(observer);
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn status(&self) -> &LoadStatus {
        &self.status
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn add(&mut self, task: Task) -> Dispatched {
        self.dispatch(TaskAction::Add(task))
    }

    pub fn update(&mut self, task: Task) -> Dispatched {
        self.dispatch(TaskAction::Update(task))
    }

    pub fn delete(&mut self, id: impl Into<String>) -> Dispatched {
        self.dispatch(TaskAction::Delete(id.into()))
    }

    pub fn bulk_load(&mut self, tasks: Vec<Task>) -> Dispatched {
        self.dispatch(TaskAction::BulkLoad(tasks))
    }

    pub fn begin_load(&mut self) -> Dispatched {
        self.dispatch(TaskAction::BeginLoad)
    }

    pub fn load_succeeded(&mut self, tasks: Vec<Task>) -> Dispatched {
        self.dispatch(TaskAction::LoadSucceeded(tasks))
    }

    pub fn load_failed(&mut self, message: impl Into<String>) -> Dispatched {
        self.dispatch(TaskAction::LoadFailed(message.into()))
    }

    /// Changes only the status of an existing task, keeping its position.
    pub fn set_status(&mut self, id: &str, status: Status) -> Dispatched {
        let Some(mut task) = self.get(id).cloned() else {
            debug!(%id, "status change for unknown task ignored");
            return Dispatched::NotFound(id.to_string());
        };
        task.status = status;
        self.update(task)
    }

    #[tracing::instrument(skip_all, fields(action = action.name()))]
    pub fn dispatch(&mut self, action: TaskAction) -> Dispatched {
        let (outcome, tasks_changed) = self.reduce(&action);

        debug!(
            tasks_changed,
            count = self.tasks.len(),
            status = ?self.status,
            "dispatched action"
        );

        let change = StoreChange {
            action: &action,
            tasks: &self.tasks,
            status: &self.status,
            tasks_changed,
        };
        for observer in &mut self.observers {
            observer.on_change(&change);
        }

        outcome
    }

    fn reduce(&mut self, action: &TaskAction) -> (Dispatched, bool) {
        match action {
            TaskAction::Add(task) => {
                if matches!(self.status, LoadStatus::Loading | LoadStatus::Errored(_)) {
                    self.status = LoadStatus::Loaded;
                }
                if let Some(slot) = self.tasks.iter_mut().find(|t| t.id == task.id) {
                    warn!(id = %task.id, "add reused an existing id; replacing in place");
                    *slot = task.clone();
                } else {
                    self.tasks.push(task.clone());
                }
                (Dispatched::Applied, true)
            }
            TaskAction::Update(task) => {
                match self.tasks.iter_mut().find(|t| t.id == task.id) {
                    Some(slot) => {
                        *slot = task.clone();
                        (Dispatched::Applied, true)
                    }
                    None => {
                        debug!(id = %task.id, "update target not found");
                        (Dispatched::NotFound(task.id.clone()), false)
                    }
                }
            }
            TaskAction::Delete(id) => {
                let before = self.tasks.len();
                self.tasks.retain(|task| &task.id != id);
                if self.tasks.len() == before {
                    debug!(%id, "delete target not found");
                    (Dispatched::NotFound(id.clone()), false)
                } else {
                    (Dispatched::Applied, true)
                }
            }
            TaskAction::BulkLoad(tasks) => {
                self.tasks = dedup_by_id(tasks);
                (Dispatched::Applied, true)
            }
            TaskAction::BeginLoad => {
                self.status = LoadStatus::Loading;
                (Dispatched::Applied, false)
            }
            TaskAction::LoadSucceeded(tasks) => {
                self.status = LoadStatus::Loaded;
                self.tasks = dedup_by_id(tasks);
                (Dispatched::Applied, true)
            }
            TaskAction::LoadFailed(message) => {
                self.status = LoadStatus::Errored(message.clone());
                (Dispatched::Applied, false)
            }
        }
    }
}

fn dedup_by_id(tasks: &[Task]) -> Vec<Task> {
    let mut out: Vec<Task> = Vec::with_capacity(tasks.len());
    for task in tasks {
        if out.iter().any(|kept| kept.id == task.id) {
            warn!(id = %task.id, "dropping task with duplicate id");
            continue;
        }
        out.push(task.clone());
    }
    out
}
