//! # corral-proto
//!
//! Message types and stream framing for the v1 scheduler HTTP API.
//!
//! ## Encoding
//!
//! Messages use the canonical JSON encoding of the scheduler protobuf schema:
//! protocol field names (`framework_id`, `offer_ids`, ...), enum values as
//! their upper-case names (`"SUBSCRIBE"`, `"TASK_RUNNING"`), and identifiers
//! wrapped as `{"value": "..."}`.
//!
//! A call or event is a tagged variant: the `type` field names the kind and
//! the payload sits under the lower-cased kind name (`"accept": {...}`).
//!
//! ## Framing
//!
//! The subscription response body is a RecordIO stream; see [`recordio`].

#[macro_use]
mod macros;

mod call;
mod error;
mod event;
pub mod recordio;
mod types;

pub use call::*;
pub use error::ProtoError;
pub use event::*;
pub use types::*;
