//! Durable scheduler state.
//!
//! Two JSON documents live in the state directory:
//! - `framework.json`: the framework registration info, written once the
//!   resource manager assigns an id
//! - `tasks.json`: the last known status of every task, written after every
//!   status update
//!
//! Both are loaded once at startup, before subscribing.

mod store;

pub use store::{StateStore, StateStoreError, TaskTable, FRAMEWORK_FILE, TASKS_FILE};
