//! corral scheduler library
//!
//! A scheduler framework for Mesos-compatible resource managers. It
//! registers over the v1 streaming scheduler API, launches queued shell
//! commands on offered resources, and keeps its task table consistent across
//! restarts and dropped connections.
//!
//! ## Architecture
//!
//! ```text
//! Scheduler (session driver)
//! ├── SchedulerClient   (SUBSCRIBE stream + call sender)
//! └── Dispatcher        (event loop state machine)
//!     ├── Reconciler    (RECONCILE after every subscription)
//!     └── OfferPolicy   (ACCEPT / DECLINE per offer batch)
//!
//! Engine (shared): framework info, session token, task table, task ids
//! StateStore: framework.json + tasks.json
//! Admin API: healthz, task listing, command submission, kill
//! ```
//!
//! ## Modules
//!
//! - `client`: HTTP call sender and subscription
//! - `stream`: RecordIO frame reader over the response body
//! - `dispatcher`: event routing and session state
//! - `state`: durable JSON state

pub mod api;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod offers;
pub mod queue;
pub mod reconciler;
pub mod scheduler;
pub mod state;
pub mod stream;

// Test doubles, exposed for integration tests
pub mod testing;
