//! Client errors.

use thiserror::Error;
use zerok_gate_types::GateError;

use crate::crypto::CryptoError;
use crate::transport::TransportError;

/// Errors from a relay participant.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Crypto error.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Plaintext could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] GateError),

    /// Not connected to relay.
    #[error("not connected")]
    NotConnected,

    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
}
