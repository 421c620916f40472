//! Bounded queue of shell commands waiting for an offer.
//!
//! Producers are admin API requests; the single consumer is the offer
//! policy, which takes at most one command per offer batch. Enqueueing waits
//! while the queue is full.

use thiserror::Error;
use tokio::sync::mpsc;

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// The consuming side was dropped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("command queue is closed")]
pub struct QueueClosed;

/// Creates a command queue. A capacity of zero is treated as one.
pub fn command_queue(capacity: usize) -> (CommandSender, CommandReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (CommandSender { tx }, CommandReceiver { rx })
}

/// Producer handle. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<String>,
}

impl CommandSender {
    /// Appends a command, waiting for room if the queue is full.
    pub async fn enqueue(&self, command: impl Into<String>) -> Result<(), QueueClosed> {
        self.tx.send(command.into()).await.map_err(|_| QueueClosed)
    }
}

/// Consumer handle.
#[derive(Debug)]
pub struct CommandReceiver {
    rx: mpsc::Receiver<String>,
}

impl CommandReceiver {
    /// Takes the oldest command without waiting.
    pub fn try_dequeue(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }

    /// Commands currently queued.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}
