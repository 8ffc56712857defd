//! Error types for 0k-Gate wire types.

use thiserror::Error;

/// Errors that can occur while encoding or decoding 0k-Gate messages.
#[derive(Debug, Error)]
pub enum GateError {
    /// JSON serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// JSON deserialization failed (missing or malformed field)
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// Tenant id is not a well-formed derived identifier
    #[error("invalid tenant id: {0}")]
    InvalidTenantId(String),

    /// Invalid data format
    #[error("invalid data: {0}")]
    InvalidData(String),
}
