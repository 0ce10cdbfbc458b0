use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

pub const STORAGE_FILE_NAME: &str = "storage.json";
pub const STORAGE_BACKUP_EXTENSION: &str = "json.bak";

/// Minimal durable key-value contract the persistence layer depends on.
pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    slots: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, value: &str) -> Self {
        let storage = Self::default();
        storage.slots.lock().insert(key.to_string(), value.to_string());
        storage
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.slots.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.slots.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// All slots live in one JSON object file, rewritten atomically on each `set`.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStorage {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;
        let path = data_dir.join(STORAGE_FILE_NAME);
        info!(file = %path.display(), "opened storage");
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        self.path.with_extension(STORAGE_BACKUP_EXTENSION)
    }

    /// Moves an unreadable storage file aside so writes can start over.
    fn quarantine(&self, reason: &anyhow::Error) -> anyhow::Result<()> {
        let backup = self.backup_path();
        warn!(
            file = %self.path.display(),
            backup = %backup.display(),
            error = %format!("{reason:#}"),
            "storage file unreadable; moving it aside"
        );
        fs::rename(&self.path, &backup).with_context(|| {
            format!(
                "failed to move {} to {}",
                self.path.display(),
                backup.display()
            )
        })
    }

    fn read_slots(&self) -> anyhow::Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            debug!(file = %self.path.display(), "storage file absent");
            return Ok(BTreeMap::new());
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed reading {}", self.path.display()))?;
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).with_context(|| format!("failed parsing {}", self.path.display()))
    }
}

impl KeyValueStorage for FileStorage {
    #[tracing::instrument(skip(self))]
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut slots = self.read_slots()?;
        Ok(slots.remove(key))
    }

    #[tracing::instrument(skip(self, value), fields(bytes = value.len()))]
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock();
        let mut slots = match self.read_slots() {
            Ok(slots) => slots,
            Err(err) => {
                self.quarantine(&err)?;
                BTreeMap::new()
            }
        };
        slots.insert(key.to_string(), value.to_string());
        save_json_atomic(&self.path, &slots)
    }
}

fn save_json_atomic(path: &Path, slots: &BTreeMap<String, String>) -> anyhow::Result<()> {
    debug!(file = %path.display(), slots = slots.len(), "saving storage atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut temp, slots)?;
    writeln!(temp)?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
