//! Offer arbitration.
//!
//! Each OFFERS batch launches at most one pending command, on the first
//! offer of the batch. Every other offer id of the batch is declined in the
//! same cycle, so no offer is left hanging.

use corral_proto::{
    Call, CommandInfo, Filters, Offer, OfferId, Operation, Resource, TaskId, TaskInfo, TaskStatus,
};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::client::{CallError, CallSender};
use crate::engine::Engine;
use crate::queue::CommandReceiver;

/// Resources requested for every task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskResources {
    pub cpus: f64,
    pub mem_mb: f64,
}

impl Default for TaskResources {
    fn default() -> Self {
        Self {
            cpus: 0.1,
            mem_mb: 32.0,
        }
    }
}

impl TaskResources {
    pub fn to_resources(&self) -> Vec<Resource> {
        vec![
            Resource::scalar("cpus", self.cpus),
            Resource::scalar("mem", self.mem_mb),
        ]
    }
}

/// What happened to an offer batch.
#[derive(Debug, Clone, PartialEq)]
pub enum OfferOutcome {
    /// The batch held no offers.
    Empty,

    /// Nothing to launch; every offer was declined.
    Declined { offers: usize },

    /// One command was launched and the remaining offers declined.
    Launched {
        task_id: TaskId,
        offer_id: OfferId,
        declined: usize,
    },
}

/// Errors from handling an offer batch. None of them are fatal.
#[derive(Debug, Error)]
pub enum OfferError {
    #[error("failed to launch task {task_id}: {source}")]
    Launch {
        task_id: TaskId,
        #[source]
        source: CallError,
    },

    #[error("failed to decline offers: {0}")]
    Decline(#[source] CallError),
}

/// Decides what to do with each offer batch.
pub struct OfferPolicy {
    commands: CommandReceiver,
    /// A command whose launch failed, retried on the next batch.
    held: Option<String>,
    resources: TaskResources,
    decline_filters: Option<Filters>,
}

impl OfferPolicy {
    pub fn new(commands: CommandReceiver, resources: TaskResources) -> Self {
        Self {
            commands,
            held: None,
            resources,
            decline_filters: None,
        }
    }

    /// Attach a `refuse_seconds` filter to every decline.
    #[must_use]
    pub fn with_refuse_seconds(mut self, refuse_seconds: Option<f64>) -> Self {
        self.decline_filters = refuse_seconds.map(|secs| Filters {
            refuse_seconds: Some(secs),
        });
        self
    }

    /// The command waiting for a retry, if a launch failed.
    pub fn held_command(&self) -> Option<&str> {
        self.held.as_deref()
    }

    /// Disposes of every offer in `offers`.
    pub async fn handle(
        &mut self,
        offers: &[Offer],
        engine: &Engine,
        sender: &dyn CallSender,
    ) -> Result<OfferOutcome, OfferError> {
        let Some(first) = offers.first() else {
            return Ok(OfferOutcome::Empty);
        };

        let Some(command) = self.held.take().or_else(|| self.commands.try_dequeue()) else {
            self.decline(offers, sender).await?;
            return Ok(OfferOutcome::Declined {
                offers: offers.len(),
            });
        };

        let task_id = engine.task_ids().next();
        let task = TaskInfo {
            name: command.clone(),
            task_id: task_id.clone(),
            agent_id: first.agent_id.clone(),
            resources: self.resources.to_resources(),
            command: Some(CommandInfo::shell(command.clone())),
        };

        let accept = Call::accept(vec![first.id.clone()], vec![Operation::launch(vec![task])]);
        if let Err(source) = sender.send(accept).await {
            warn!(task_id = %task_id, command = %command, "Launch failed, holding command");
            self.held = Some(command);
            if let Err(e) = self.decline(offers, sender).await {
                error!(error = %e, "Failed to decline offers after failed launch");
            }
            return Err(OfferError::Launch { task_id, source });
        }

        info!(
            task_id = %task_id,
            offer_id = %first.id,
            agent_id = %first.agent_id,
            hostname = %first.hostname,
            command = %command,
            queued = self.commands.pending(),
            "Task launched"
        );

        engine
            .record_status(TaskStatus::staging(task_id.clone(), first.agent_id.clone()))
            .await;
        if let Err(e) = engine.persist_tasks().await {
            error!(error = %e, task_id = %task_id, "Failed to persist task table");
        }

        let rest = &offers[1..];
        if !rest.is_empty() {
            self.decline(rest, sender).await?;
        }

        Ok(OfferOutcome::Launched {
            task_id,
            offer_id: first.id.clone(),
            declined: rest.len(),
        })
    }

    async fn decline(&self, offers: &[Offer], sender: &dyn CallSender) -> Result<(), OfferError> {
        let ids: Vec<OfferId> = offers.iter().map(|o| o.id.clone()).collect();
        sender
            .send(Call::decline(ids, self.decline_filters.clone()))
            .await
            .map_err(OfferError::Decline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_resources() {
        let resources = TaskResources::default().to_resources();
        assert_eq!(resources[0].name, "cpus");
        assert_eq!(resources[0].scalar.as_ref().unwrap().value, 0.1);
        assert_eq!(resources[1].name, "mem");
        assert_eq!(resources[1].scalar.as_ref().unwrap().value, 32.0);
    }
}
