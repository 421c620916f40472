//! Scheduler engine aggregate.
//!
//! Owns the state shared between the event loop and the admin interface:
//! - the framework registration info
//! - the current session token (`Mesos-Stream-Id`) and heartbeat interval
//! - the task table
//! - the task id allocator
//!
//! The event loop is the only writer of the task table. Readers take short
//! read locks and never hold them across network I/O.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use corral_proto::{Call, FrameworkId, FrameworkInfo, TaskId, TaskStatus};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::client::{CallError, CallSender};
use crate::state::{StateStore, StateStoreError, TaskTable};

// =============================================================================
// Task Id Allocator
// =============================================================================

/// Hands out numeric task ids.
///
/// Ids are the decimal rendering of a counter that only ever moves forward.
#[derive(Debug, Default)]
pub struct TaskIdAllocator {
    last: AtomicU64,
}

impl TaskIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next task id. The first id handed out is `1`.
    pub fn next(&self) -> TaskId {
        let id = self.last.fetch_add(1, Ordering::SeqCst) + 1;
        TaskId::new(id.to_string())
    }

    /// Moves the counter up to the largest numeric id in `ids`.
    ///
    /// Non-numeric ids are ignored. The counter never moves backwards.
    pub fn restore_from<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> u64 {
        let highest = ids
            .into_iter()
            .filter_map(|id| id.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        let previous = self.last.fetch_max(highest, Ordering::SeqCst);
        previous.max(highest)
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Errors from killing a task.
#[derive(Debug, Error)]
pub enum KillError {
    #[error("unknown task: {0}")]
    UnknownTask(String),

    #[error(transparent)]
    Call(#[from] CallError),
}

// =============================================================================
// Engine
// =============================================================================

/// Shared scheduler state.
pub struct Engine {
    store: StateStore,
    framework: RwLock<FrameworkInfo>,
    stream_id: RwLock<Option<String>>,
    heartbeat_interval: RwLock<Option<Duration>>,
    tasks: RwLock<TaskTable>,
    task_ids: TaskIdAllocator,
}

impl Engine {
    /// Builds an engine from already loaded state.
    pub fn new(store: StateStore, framework: FrameworkInfo, tasks: TaskTable) -> Self {
        Self {
            store,
            framework: RwLock::new(framework),
            stream_id: RwLock::new(None),
            heartbeat_interval: RwLock::new(None),
            tasks: RwLock::new(tasks),
            task_ids: TaskIdAllocator::new(),
        }
    }

    /// Loads persisted state from `store`.
    ///
    /// A persisted framework info wins over `defaults`, so a restarted
    /// scheduler re-registers under the same framework id.
    pub fn load(store: StateStore, defaults: FrameworkInfo) -> Result<Self, StateStoreError> {
        let framework = match store.load_framework()? {
            Some(framework) => framework,
            None => {
                info!(name = %defaults.name, "No persisted framework, registering fresh");
                defaults
            }
        };
        let tasks = store.load_tasks()?;
        Ok(Self::new(store, framework, tasks))
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn task_ids(&self) -> &TaskIdAllocator {
        &self.task_ids
    }

    // -------------------------------------------------------------------------
    // Framework
    // -------------------------------------------------------------------------

    pub async fn framework_info(&self) -> FrameworkInfo {
        self.framework.read().await.clone()
    }

    pub async fn framework_id(&self) -> Option<FrameworkId> {
        self.framework.read().await.id.clone()
    }

    /// Records the id assigned by the resource manager and returns the
    /// updated framework info.
    pub async fn assign_framework_id(&self, id: FrameworkId) -> FrameworkInfo {
        let mut framework = self.framework.write().await;
        if framework.id.as_ref() != Some(&id) {
            info!(framework_id = %id, "Framework id assigned");
            framework.id = Some(id);
        }
        framework.clone()
    }

    /// Writes the current framework info to disk.
    pub async fn persist_framework(&self) -> Result<(), StateStoreError> {
        let framework = self.framework_info().await;
        self.store.save_framework(&framework)
    }

    // -------------------------------------------------------------------------
    // Session
    // -------------------------------------------------------------------------

    pub async fn stream_id(&self) -> Option<String> {
        self.stream_id.read().await.clone()
    }

    pub async fn set_stream_id(&self, stream_id: Option<String>) {
        *self.stream_id.write().await = stream_id;
    }

    pub async fn clear_stream_id(&self) {
        self.set_stream_id(None).await;
    }

    /// Heartbeat interval announced for the current session.
    pub async fn heartbeat_interval(&self) -> Option<Duration> {
        *self.heartbeat_interval.read().await
    }

    pub async fn set_heartbeat_interval(&self, interval: Option<Duration>) {
        *self.heartbeat_interval.write().await = interval;
    }

    // -------------------------------------------------------------------------
    // Tasks
    // -------------------------------------------------------------------------

    pub async fn task(&self, task_id: &str) -> Option<TaskStatus> {
        self.tasks.read().await.get(task_id).cloned()
    }

    pub async fn tasks_snapshot(&self) -> TaskTable {
        self.tasks.read().await.clone()
    }

    /// Replaces the record for the status's task and returns the table as it
    /// stands after the change.
    pub async fn record_status(&self, status: TaskStatus) -> TaskTable {
        let mut tasks = self.tasks.write().await;
        debug!(
            task_id = %status.task_id,
            state = %status.state,
            "Recording task status"
        );
        tasks.insert(status.task_id.value().to_string(), status);
        tasks.clone()
    }

    /// Writes the task table to disk.
    pub async fn persist_tasks(&self) -> Result<(), StateStoreError> {
        let tasks = self.tasks_snapshot().await;
        self.store.save_tasks(&tasks)
    }

    /// Sends a KILL for a known task.
    pub async fn kill_task(
        &self,
        sender: &dyn CallSender,
        task_id: &str,
    ) -> Result<TaskStatus, KillError> {
        let status = self
            .task(task_id)
            .await
            .ok_or_else(|| KillError::UnknownTask(task_id.to_string()))?;

        sender
            .send(Call::kill(status.task_id.clone(), status.agent_id.clone()))
            .await?;

        info!(task_id = %status.task_id, "Kill requested");
        Ok(status)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("store", &self.store)
            .field("task_ids", &self.task_ids)
            .finish_non_exhaustive()
    }
}
