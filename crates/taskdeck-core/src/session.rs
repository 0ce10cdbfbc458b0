use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use chrono::{NaiveDate, Weekday};
use chrono_tz::Tz;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::loader::{LoadPipeline, LoadReport};
use crate::modal::ModalController;
use crate::persist::{PersistenceBridge, WriteFailures};
use crate::storage::KeyValueStorage;
use crate::store::{Dispatched, LoadStatus, SharedStore, TaskStore};
use crate::task::{DraftError, Status, Task, TaskDraft};
use crate::view::{
    Calendar, FilterCriteria, SortCriteria, SortField, ViewNotice, view_notice, visible_tasks,
};

/// A mutation was refused, or applied in memory without reaching storage.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    Draft(#[from] DraftError),
    #[error("change was not saved: {0}")]
    Persist(String),
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub load_delay: Duration,
    pub week_start: Weekday,
    pub timezone: Option<Tz>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            load_delay: Duration::ZERO,
            week_start: Weekday::Sun,
            timezone: None,
        }
    }
}

impl SessionOptions {
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            load_delay: cfg.load_delay()?,
            week_start: cfg.week_start()?,
            timezone: cfg.timezone()?,
        })
    }
}

/// Everything the presentation layer talks to: the store, the UI-local
/// filter and sort state, and the creation dialog.
pub struct TaskSession {
    store: SharedStore,
    pipeline: LoadPipeline,
    modal: ModalController,
    filter: FilterCriteria,
    sort: SortCriteria,
    options: SessionOptions,
    pinned_today: Option<NaiveDate>,
    write_failures: WriteFailures,
}

impl TaskSession {
    pub fn new(storage: Arc<dyn KeyValueStorage>, options: SessionOptions) -> Self {
        let mut store = TaskStore::new();
        let bridge = PersistenceBridge::new(storage.clone());
        let write_failures = bridge.failures();
        store.subscribe(Box::new(bridge));

        Self {
            store: store.shared(),
            pipeline: LoadPipeline::new(storage, options.load_delay),
            modal: ModalController::default(),
            filter: FilterCriteria::default(),
            sort: SortCriteria::default(),
            options,
            pinned_today: None,
            write_failures,
        }
    }

    /// Fixes "today" instead of reading the clock.
    pub fn pin_today(&mut self, today: NaiveDate) {
        self.pinned_today = Some(today);
    }

    pub fn calendar(&self) -> Calendar {
        match self.pinned_today {
            Some(today) => Calendar::new(today, self.options.week_start),
            None => Calendar::local(self.options.week_start, self.options.timezone),
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    #[instrument(skip(self))]
    pub async fn bootstrap(&self) -> LoadReport {
        let report = self.pipeline.run(&self.store).await;
        if let Some(reason) = self.write_failures.take() {
            warn!(%reason, "loaded snapshot could not be rewritten");
        }
        debug!(?report, "bootstrap finished");
        report
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.store.lock().tasks().to_vec()
    }

    pub fn load_status(&self) -> LoadStatus {
        self.store.lock().status().clone()
    }

    pub fn task(&self, id: &str) -> Option<Task> {
        self.store.lock().get(id).cloned()
    }

    /// Exact id, or a prefix matching exactly one task.
    pub fn resolve_id(&self, needle: &str) -> anyhow::Result<String> {
        let store = self.store.lock();
        if store.get(needle).is_some() {
            return Ok(needle.to_string());
        }

        let mut matches = store
            .tasks()
            .iter()
            .filter(|task| task.id.starts_with(needle));
        let first = matches
            .next()
            .ok_or_else(|| anyhow!("no task matches id {needle}"))?;
        if matches.next().is_some() {
            return Err(anyhow!("id prefix {needle} is ambiguous"));
        }
        Ok(first.id.clone())
    }

    pub fn modal(&self) -> &ModalController {
        &self.modal
    }

    pub fn open_modal(&mut self) {
        self.modal.open();
    }

    pub fn close_modal(&mut self) {
        self.modal.close();
    }

    /// Accepts a submitted draft: assigns an id, adds it, closes the dialog.
    /// A rejected draft leaves the dialog as it was.
    #[instrument(skip(self, draft), fields(title = %draft.title))]
    pub fn create_task(&mut self, draft: TaskDraft) -> Result<Task, SessionError> {
        draft.validate()?;
        let task = Task::from_draft(draft);
        self.store.lock().add(task.clone());
        self.modal.close();
        self.saved()?;
        info!(id = %task.id, "created task");
        Ok(task)
    }

    pub fn update_task(&self, task: Task) -> Result<Dispatched, SessionError> {
        let outcome = self.store.lock().update(task);
        self.saved()?;
        Ok(outcome)
    }

    pub fn set_task_status(&self, id: &str, status: Status) -> Result<Dispatched, SessionError> {
        let outcome = self.store.lock().set_status(id, status);
        self.saved()?;
        Ok(outcome)
    }

    pub fn delete_task(&self, id: &str) -> Result<Dispatched, SessionError> {
        let outcome = self.store.lock().delete(id);
        self.saved()?;
        Ok(outcome)
    }

    /// Surfaces a snapshot write that failed during the last dispatch.
    fn saved(&self) -> Result<(), SessionError> {
        match self.write_failures.take() {
            Some(reason) => Err(SessionError::Persist(reason)),
            None => Ok(()),
        }
    }

    pub fn filter(&self) -> &FilterCriteria {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: FilterCriteria) {
        self.filter = filter;
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        self.filter.search = search.into();
    }

    pub fn sort(&self) -> SortCriteria {
        self.sort
    }

    pub fn set_sort(&mut self, sort: SortCriteria) {
        self.sort = sort;
    }

    pub fn sort_by(&mut self, field: SortField) {
        self.sort.toggle(field);
        debug!(sort = ?self.sort, "sort toggled");
    }

    pub fn visible_tasks(&self) -> Vec<Task> {
        let calendar = self.calendar();
        let store = self.store.lock();
        visible_tasks(store.tasks(), &self.filter, &self.sort, &calendar)
    }

    pub fn notice(&self) -> Option<ViewNotice> {
        let visible = self.visible_tasks();
        let store = self.store.lock();
        view_notice(store.tasks(), &visible, store.status())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;

    use super::{SessionError, SessionOptions, TaskSession};
    use crate::loader::NO_TASKS_MESSAGE;
    use crate::persist::{STORAGE_KEY, decode_snapshot};
    use crate::storage::{KeyValueStorage, MemoryStorage};
    use crate::store::{Dispatched, LoadStatus};
    use crate::task::{DraftError, Status, TaskDraft};
    use crate::view::ViewNotice;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).expect("valid date")
    }

    fn session(storage: Arc<MemoryStorage>) -> TaskSession {
        let mut session = TaskSession::new(storage, SessionOptions::default());
        session.pin_today(today());
        session
    }

    #[tokio::test]
    async fn create_after_empty_bootstrap_persists_and_closes_modal() {
        let storage = Arc::new(MemoryStorage::new());
        let mut session = session(storage.clone());

        session.bootstrap().await;
        assert_eq!(
            session.load_status(),
            LoadStatus::Errored(NO_TASKS_MESSAGE.to_string())
        );
        assert_eq!(session.notice(), Some(ViewNotice::Error(NO_TASKS_MESSAGE.to_string())));

        session.open_modal();
        let task = session
            .create_task(TaskDraft::new("Buy milk", "semi-skimmed", today()))
            .expect("valid draft");
        assert!(!session.modal().is_visible());
        assert_eq!(session.load_status(), LoadStatus::Loaded);
        assert_eq!(session.notice(), None);

        let raw = storage
            .get(STORAGE_KEY)
            .expect("get")
            .expect("snapshot written");
        assert_eq!(decode_snapshot(&raw).expect("decode"), vec![task]);
    }

    #[test]
    fn rejected_draft_keeps_modal_open() {
        let mut session = session(Arc::new(MemoryStorage::new()));
        session.open_modal();
        let err = session
            .create_task(TaskDraft::new("", "desc", today()))
            .expect_err("blank title");
        assert_eq!(err, SessionError::Draft(DraftError::MissingTitle));
        assert!(session.modal().is_visible());
        assert!(session.tasks().is_empty());
    }

    #[test]
    fn status_change_and_delete_go_through_store() {
        let mut session = session(Arc::new(MemoryStorage::new()));
        let task = session
            .create_task(TaskDraft::new("Walk dog", "evening", today()))
            .expect("valid draft");

        assert_eq!(
            session.set_task_status(&task.id, Status::InProgress),
            Ok(Dispatched::Applied)
        );
        assert_eq!(
            session.task(&task.id).map(|t| t.status),
            Some(Status::InProgress)
        );

        assert_eq!(session.delete_task(&task.id), Ok(Dispatched::Applied));
        assert_eq!(
            session.delete_task(&task.id),
            Ok(Dispatched::NotFound(task.id.clone()))
        );
        assert_eq!(session.notice(), Some(ViewNotice::NoTasks));
    }

    #[test]
    fn resolve_id_accepts_unique_prefix() {
        let mut session = session(Arc::new(MemoryStorage::new()));
        let task = session
            .create_task(TaskDraft::new("a", "b", today()))
            .expect("valid draft");

        assert_eq!(session.resolve_id(&task.id).expect("exact"), task.id);
        assert_eq!(session.resolve_id(&task.id[..8]).expect("prefix"), task.id);
        assert!(session.resolve_id("not-an-id").is_err());
    }

    #[test]
    fn search_hides_everything_yields_no_matches_notice() {
        let mut session = session(Arc::new(MemoryStorage::new()));
        session
            .create_task(TaskDraft::new("Buy milk", "dairy", today()))
            .expect("valid draft");
        session.set_search("laundry");
        assert!(session.visible_tasks().is_empty());
        assert_eq!(session.notice(), Some(ViewNotice::NoMatches));
    }

    struct ReadOnlyStorage;

    impl KeyValueStorage for ReadOnlyStorage {
        fn get(&self, _key: &str) -> anyhow::Result<Option<String>> {
            Ok(None)
        }

        fn set(&self, _key: &str, _value: &str) -> anyhow::Result<()> {
            anyhow::bail!("disk is read-only")
        }
    }

    #[test]
    fn unsaved_changes_are_reported_to_the_caller() {
        let mut session = TaskSession::new(Arc::new(ReadOnlyStorage), SessionOptions::default());
        session.pin_today(today());

        let err = session
            .create_task(TaskDraft::new("Buy milk", "dairy", today()))
            .expect_err("write fails");
        assert!(matches!(err, SessionError::Persist(ref reason) if reason.contains("read-only")));
        assert!(!session.modal().is_visible());

        let id = session.tasks()[0].id.clone();
        assert!(matches!(
            session.set_task_status(&id, Status::Done),
            Err(SessionError::Persist(_))
        ));
        // no-op dispatch writes nothing
        assert_eq!(
            session.delete_task("missing"),
            Ok(Dispatched::NotFound("missing".to_string()))
        );
    }
}
