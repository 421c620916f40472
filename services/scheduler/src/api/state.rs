//! Shared state for the admin API handlers.

use std::sync::Arc;

use crate::client::CallSender;
use crate::engine::Engine;
use crate::queue::CommandSender;

/// Handler state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    engine: Arc<Engine>,
    commands: CommandSender,
    sender: Arc<dyn CallSender>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, commands: CommandSender, sender: Arc<dyn CallSender>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                engine,
                commands,
                sender,
            }),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.inner.engine
    }

    pub fn commands(&self) -> &CommandSender {
        &self.inner.commands
    }

    pub fn sender(&self) -> &dyn CallSender {
        self.inner.sender.as_ref()
    }
}
