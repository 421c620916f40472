//! Task reconciliation.
//!
//! After every (re)subscription the scheduler asks the resource manager for
//! the current status of every task it knows about. The answers arrive later
//! as ordinary UPDATE events.

use std::sync::Arc;

use corral_proto::{Call, ReconcileTask};
use tracing::info;

use crate::client::{CallError, CallSender};
use crate::engine::Engine;

/// Issues RECONCILE calls for the task table.
pub struct Reconciler {
    engine: Arc<Engine>,
    sender: Arc<dyn CallSender>,
}

impl Reconciler {
    pub fn new(engine: Arc<Engine>, sender: Arc<dyn CallSender>) -> Self {
        Self { engine, sender }
    }

    /// Sends one RECONCILE covering every known task, whatever its state.
    ///
    /// Also moves the task id counter past every id in the table. With no
    /// known tasks the call goes out with an empty list, which asks for
    /// implicit reconciliation. Returns the number of tasks listed.
    pub async fn reconcile(&self) -> Result<usize, CallError> {
        let tasks = self.engine.tasks_snapshot().await;

        let highest = self
            .engine
            .task_ids()
            .restore_from(tasks.keys().map(String::as_str));

        let entries: Vec<ReconcileTask> = tasks
            .values()
            .map(|status| ReconcileTask {
                task_id: status.task_id.clone(),
                agent_id: status.agent_id.clone(),
            })
            .collect();
        let count = entries.len();

        self.sender.send(Call::reconcile(entries)).await?;

        info!(task_count = count, last_task_id = highest, "Reconciliation requested");
        Ok(count)
    }
}
