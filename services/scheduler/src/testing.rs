//! Test doubles.
//!
//! [`RecordingSender`] stands in for the scheduler API: it records every
//! call instead of sending it and can be told to reject calls of given types.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use corral_proto::{Call, CallType};

use crate::client::{CallError, CallSender};

type Observer = Box<dyn Fn(&Call) + Send + Sync>;

/// A [`CallSender`] that records calls.
#[derive(Default)]
pub struct RecordingSender {
    calls: Mutex<Vec<Call>>,
    failing: Mutex<HashSet<CallType>>,
    observer: Option<Observer>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `observer` on every call as it is sent, before it is recorded.
    pub fn with_observer(observer: impl Fn(&Call) + Send + Sync + 'static) -> Self {
        Self {
            observer: Some(Box::new(observer)),
            ..Self::default()
        }
    }

    /// Rejects calls of `call_type` with status 400 from now on.
    pub fn fail(&self, call_type: CallType) {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(call_type);
    }

    /// Accepts calls of `call_type` again.
    pub fn recover(&self, call_type: CallType) {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&call_type);
    }

    /// Every call seen so far, including rejected ones.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// The types of every call seen so far, in order.
    pub fn call_types(&self) -> Vec<CallType> {
        self.calls().iter().map(Call::call_type).collect()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[async_trait]
impl CallSender for RecordingSender {
    async fn send(&self, call: Call) -> Result<(), CallError> {
        if let Some(observer) = &self.observer {
            observer(&call);
        }

        let call_type = call.call_type();
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);

        let failing = self
            .failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&call_type);
        if failing {
            return Err(CallError::Rejected {
                call_type,
                status: 400,
                body: "rejected by test".to_string(),
            });
        }

        Ok(())
    }
}
