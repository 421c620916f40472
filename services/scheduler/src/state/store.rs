//! File-backed state store.
//!
//! Every write replaces the whole document: the new content goes to a temp
//! file, is flushed to disk, and is renamed over the old one.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use corral_proto::{FrameworkInfo, TaskStatus};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub const FRAMEWORK_FILE: &str = "framework.json";
pub const TASKS_FILE: &str = "tasks.json";

/// Last known status per task id.
pub type TaskTable = BTreeMap<String, TaskStatus>;

/// Errors from state store operations.
#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid state document {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// JSON state store rooted at a directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    /// Create a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn framework_path(&self) -> PathBuf {
        self.dir.join(FRAMEWORK_FILE)
    }

    pub fn tasks_path(&self) -> PathBuf {
        self.dir.join(TASKS_FILE)
    }

    /// Load the persisted framework info, if any.
    pub fn load_framework(&self) -> Result<Option<FrameworkInfo>, StateStoreError> {
        let framework: Option<FrameworkInfo> = read_json(&self.framework_path())?;
        if let Some(framework) = &framework {
            info!(
                framework_id = framework.id.as_ref().map(|id| id.value()).unwrap_or(""),
                name = %framework.name,
                "Loaded framework info from disk"
            );
        }
        Ok(framework)
    }

    /// Persist the framework info.
    pub fn save_framework(&self, framework: &FrameworkInfo) -> Result<(), StateStoreError> {
        write_json(&self.framework_path(), framework)
    }

    /// Load the persisted task table. A missing document is an empty table.
    pub fn load_tasks(&self) -> Result<TaskTable, StateStoreError> {
        let tasks: TaskTable = read_json(&self.tasks_path())?.unwrap_or_default();
        info!(task_count = tasks.len(), "Loaded task table from disk");
        Ok(tasks)
    }

    /// Persist the whole task table.
    pub fn save_tasks(&self, tasks: &TaskTable) -> Result<(), StateStoreError> {
        write_json(&self.tasks_path(), tasks)?;
        debug!(task_count = tasks.len(), "Saved task table");
        Ok(())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StateStoreError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No state file, starting fresh");
            return Ok(None);
        }
        Err(source) => {
            return Err(StateStoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| StateStoreError::Json {
            path: path.to_path_buf(),
            source,
        })
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StateStoreError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| StateStoreError::Io { path, source }
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }

    let content = serde_json::to_vec_pretty(value).map_err(|source| StateStoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let tmp_path = path.with_extension("json.tmp");
    let mut file = File::create(&tmp_path).map_err(io_err(&tmp_path))?;
    file.write_all(&content).map_err(io_err(&tmp_path))?;
    file.sync_all().map_err(io_err(&tmp_path))?;
    drop(file);

    fs::rename(&tmp_path, path).map_err(io_err(path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_proto::{AgentId, FrameworkId, TaskId, TaskState};
    use tempfile::TempDir;

    fn framework() -> FrameworkInfo {
        FrameworkInfo {
            user: "root".to_string(),
            name: "simple_framework".to_string(),
            id: Some(FrameworkId::new("fw-1")),
            failover_timeout: Some(3600.0),
            checkpoint: Some(true),
            hostname: Some("node-a".to_string()),
            webui_url: None,
        }
    }

    #[test]
    fn test_missing_documents_load_as_defaults() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("state"));

        assert!(store.load_framework().unwrap().is_none());
        assert!(store.load_tasks().unwrap().is_empty());
    }

    #[test]
    fn test_framework_survives_reload() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("state"));

        store.save_framework(&framework()).unwrap();

        let reopened = StateStore::new(dir.path().join("state"));
        assert_eq!(reopened.load_framework().unwrap(), Some(framework()));
    }

    #[test]
    fn test_task_table_is_overwritten_whole() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());

        let mut tasks = TaskTable::new();
        tasks.insert(
            "1".to_string(),
            TaskStatus::staging(TaskId::new("1"), AgentId::new("agent-1")),
        );
        store.save_tasks(&tasks).unwrap();

        let mut running = TaskStatus::staging(TaskId::new("2"), AgentId::new("agent-2"));
        running.state = TaskState::TaskRunning;
        let mut replacement = TaskTable::new();
        replacement.insert("2".to_string(), running);
        store.save_tasks(&replacement).unwrap();

        let loaded = store.load_tasks().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["2"].state, TaskState::TaskRunning);
        assert!(!store.tasks_path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_corrupt_document_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        fs::write(store.tasks_path(), "{not json").unwrap();

        let err = store.load_tasks().unwrap_err();
        assert!(matches!(err, StateStoreError::Json { .. }));
    }

    #[test]
    fn test_write_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        // A regular file where the state directory should be.
        let blocked = dir.path().join("blocked");
        fs::write(&blocked, "x").unwrap();

        let store = StateStore::new(&blocked);
        let err = store.save_tasks(&TaskTable::new()).unwrap_err();
        assert!(matches!(err, StateStoreError::Io { .. }));
    }
}
