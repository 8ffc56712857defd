//! Transport abstraction for 0k-Gate.
//!
//! This module provides a pluggable transport layer between a relay
//! participant and the relay (WebSocket in production, mock for testing).
//!
//! # Design
//!
//! The transport trait is async and connection-oriented:
//! - `connect()` opens a connection to a relay route
//! - `send()` transmits one encrypted frame
//! - `recv()` receives one encrypted frame
//! - `close()` gracefully terminates
//!
//! `send()` and `recv()` must not block each other: a reader task sits in
//! `recv()` for the whole life of a connection while checks are sent.
//!
//! # Example
//!
//! ```ignore
//! let transport = WebSocketTransport::new();
//! transport.connect("ws://localhost:9090/ws/server/<tenant>").await?;
//! transport.send(&frame).await?;
//! let reply = transport.recv().await?;
//! ```

mod mock;
mod websocket;

pub use mock::MockTransport;
pub use websocket::WebSocketTransport;

use async_trait::async_trait;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Connection timeout.
    #[error("connection timeout")]
    Timeout,
}

/// Transport trait for exchanging encrypted frames with the relay.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to the relay route at the given address.
    async fn connect(&self, address: &str) -> Result<(), TransportError>;

    /// Send one frame over the connection.
    async fn send(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Receive one frame from the connection.
    ///
    /// Blocks until data is available or connection closes.
    async fn recv(&self) -> Result<Vec<u8>, TransportError>;

    /// Check if currently connected.
    fn is_connected(&self) -> bool;

    /// Close the connection gracefully.
    async fn close(&self) -> Result<(), TransportError>;
}
