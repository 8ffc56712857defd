//! Error types for gate-authz.

use zerok_gate_client::{ClientError, CryptoError};

pub use crate::config::ConfigError;

/// Main error type for gate-authz startup and plumbing.
///
/// Nothing here reaches a proxy waiting on a check: every failure on the
/// check path becomes a [`Verdict::Denied`](zerok_gate_types::Verdict) instead.
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Relay link error.
    #[error("relay link error: {0}")]
    Client(#[from] ClientError),

    /// Key generation or encryption error.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for gate-authz operations.
pub type Result<T> = std::result::Result<T, AuthzError>;
