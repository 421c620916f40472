//! Error types for message encoding.

use thiserror::Error;

/// Errors that can occur when encoding or decoding scheduler messages.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// The `type` field names a kind this crate does not model.
    #[error("unknown {kind} type: {value}")]
    UnknownType { kind: &'static str, value: String },

    /// The `type` field is set but its payload field is absent.
    #[error("{kind} of type {value} is missing its `{field}` payload")]
    MissingPayload {
        kind: &'static str,
        value: String,
        field: &'static str,
    },

    /// JSON serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
