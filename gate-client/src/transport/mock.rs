//! Mock transport for testing.
//!
//! Frames queued with [`MockTransport::queue_frame`] are handed out by
//! `recv()`. Unlike a canned-response mock, `recv()` waits for frames the
//! way a socket does, and only reports the connection closed after
//! [`MockTransport::hang_up`] or `close()`. Reader loops can therefore be
//! driven from a test exactly as they run in production.

use super::{Transport, TransportError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

/// Mock transport for testing.
///
/// Clones share state, so a test can keep one handle while the code under
/// test owns another.
#[derive(Debug, Default, Clone)]
pub struct MockTransport {
    shared: Arc<Shared>,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<MockState>,
    arrivals: Notify,
}

#[derive(Debug, Default)]
struct MockState {
    connected: bool,
    connect_count: usize,
    connected_address: Option<String>,
    sent_frames: Vec<Vec<u8>>,
    receive_queue: VecDeque<Vec<u8>>,
    hung_up: bool,
    fail_next_connect: Option<String>,
    fail_next_send: Option<String>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a frame for `recv()` and wake any waiting reader.
    pub fn queue_frame(&self, data: Vec<u8>) {
        self.state().receive_queue.push_back(data);
        self.shared.arrivals.notify_waiters();
    }

    /// Simulate the relay dropping the connection.
    ///
    /// Frames already queued are still delivered, then `recv()` reports
    /// [`TransportError::ConnectionClosed`].
    pub fn hang_up(&self) {
        {
            let mut state = self.state();
            state.hung_up = true;
            state.connected = false;
        }
        self.shared.arrivals.notify_waiters();
    }

    /// Get all frames that were sent.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.state().sent_frames.clone()
    }

    /// Get the last frame that was sent.
    pub fn last_sent(&self) -> Option<Vec<u8>> {
        self.state().sent_frames.last().cloned()
    }

    /// Get the address that was last connected to.
    pub fn connected_address(&self) -> Option<String> {
        self.state().connected_address.clone()
    }

    /// Number of successful `connect()` calls.
    pub fn connect_count(&self) -> usize {
        self.state().connect_count
    }

    /// Cause the next connect() to fail with the given error.
    pub fn fail_next_connect(&self, error: &str) {
        self.state().fail_next_connect = Some(error.to_string());
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        self.state().fail_next_send = Some(error.to_string());
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, address: &str) -> Result<(), TransportError> {
        let mut state = self.state();

        if let Some(error) = state.fail_next_connect.take() {
            return Err(TransportError::ConnectionFailed(error));
        }

        state.connected = true;
        state.hung_up = false;
        state.connect_count += 1;
        state.connected_address = Some(address.to_string());
        Ok(())
    }

    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state();

        if !state.connected {
            return Err(TransportError::NotConnected);
        }

        if let Some(error) = state.fail_next_send.take() {
            return Err(TransportError::SendFailed(error));
        }

        state.sent_frames.push(data.to_vec());
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>, TransportError> {
        loop {
            // Register before checking so a frame queued in between is not missed.
            let arrival = self.shared.arrivals.notified();
            {
                let mut state = self.state();
                if let Some(frame) = state.receive_queue.pop_front() {
                    return Ok(frame);
                }
                if state.hung_up {
                    return Err(TransportError::ConnectionClosed);
                }
                if !state.connected {
                    return Err(TransportError::NotConnected);
                }
            }
            arrival.await;
        }
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.hang_up();
        Ok(())
    }
}
