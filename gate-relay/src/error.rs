//! Error types for gate-relay.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::limits::RateLimitError;

/// Main error type for gate-relay operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// The path does not carry a well-formed tenant id.
    #[error("invalid tenant id: {0}")]
    InvalidTenant(String),

    /// Rate limit exceeded.
    #[error("rate limit exceeded: {0}")]
    RateLimited(#[from] RateLimitError),

    /// A relay route was hit without a WebSocket upgrade.
    #[error("websocket upgrade required")]
    UpgradeRequired,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// HTTP status for errors raised before an upgrade.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidTenant(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::UpgradeRequired => StatusCode::UPGRADE_REQUIRED,
            Self::Config(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
