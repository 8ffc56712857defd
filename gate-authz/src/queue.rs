//! Bounded FIFO of checks waiting to go out on the relay link.
//!
//! [`OutboundQueue`] is the producer half held by the correlator; it never
//! waits, so a full queue becomes an immediate backpressure denial. The
//! single [`QueueConsumer`] drains it in order and hands each check to a
//! [`CheckDispatch`], which seals and sends it.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use zerok_gate_client::{ClientError, RelayLink, Transport};
use zerok_gate_types::{CheckRequest, DenyReason};

use crate::correlator::RequestCorrelator;

/// Something that can deliver a check to the remote device.
#[async_trait]
pub trait CheckDispatch: Send + Sync {
    /// Encode, encrypt and send one check. No retries.
    async fn dispatch(&self, check: &CheckRequest) -> Result<(), ClientError>;

    /// Whether a send would currently have somewhere to go.
    fn is_connected(&self) -> bool;
}

#[async_trait]
impl<T: Transport> CheckDispatch for RelayLink<T> {
    async fn dispatch(&self, check: &CheckRequest) -> Result<(), ClientError> {
        self.send_check(check).await
    }

    fn is_connected(&self) -> bool {
        RelayLink::is_connected(self)
    }
}

/// Why a check could not be enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// Every slot is taken.
    #[error("outbound queue full")]
    Full,
    /// The consumer has stopped.
    #[error("outbound queue closed")]
    Closed,
}

/// Producer half of the outbound queue.
#[derive(Debug, Clone)]
pub struct OutboundQueue {
    tx: mpsc::Sender<CheckRequest>,
    depth: usize,
}

/// Consumer half of the outbound queue.
#[derive(Debug)]
pub struct QueueConsumer {
    rx: mpsc::Receiver<CheckRequest>,
}

impl OutboundQueue {
    /// Create a queue holding at most `depth` checks.
    pub fn new(depth: usize) -> (Self, QueueConsumer) {
        let depth = depth.max(1);
        let (tx, rx) = mpsc::channel(depth);
        (Self { tx, depth }, QueueConsumer { rx })
    }

    /// Add a check without waiting.
    pub fn enqueue(&self, check: CheckRequest) -> Result<(), QueueError> {
        self.tx.try_send(check).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    /// Checks currently waiting.
    pub fn len(&self) -> usize {
        self.depth.saturating_sub(self.tx.capacity())
    }

    /// Whether nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of waiting checks.
    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl QueueConsumer {
    /// Spawn the consumer task.
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn(
        self,
        correlator: Arc<RequestCorrelator>,
        dispatch: Arc<dyn CheckDispatch>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(correlator, dispatch))
    }

    /// Drain the queue until every producer is gone.
    pub async fn run(mut self, correlator: Arc<RequestCorrelator>, dispatch: Arc<dyn CheckDispatch>) {
        while let Some(check) = self.rx.recv().await {
            // Timed out or cancelled while waiting its turn
            if !correlator.is_pending(&check.id) {
                tracing::debug!(check_id = %check.id, "skipping resolved check");
                continue;
            }

            match dispatch.dispatch(&check).await {
                Ok(()) => correlator.mark_sent(&check.id),
                Err(e) => {
                    tracing::warn!(check_id = %check.id, error = %e, "failed to send check to relay");
                    correlator.fail(&check.id, DenyReason::RelayUnavailable);
                }
            }
        }
        tracing::debug!("outbound queue closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn check() -> CheckRequest {
        CheckRequest::new("GET", "/", BTreeMap::new(), "127.0.0.1")
    }

    #[test]
    fn full_queue_refuses_without_waiting() {
        let (queue, _consumer) = OutboundQueue::new(2);
        queue.enqueue(check()).unwrap();
        queue.enqueue(check()).unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.enqueue(check()), Err(QueueError::Full));
    }

    #[test]
    fn closed_queue_is_reported() {
        let (queue, consumer) = OutboundQueue::new(2);
        drop(consumer);
        assert_eq!(queue.enqueue(check()), Err(QueueError::Closed));
    }

    #[tokio::test]
    async fn consumer_preserves_fifo_order() {
        let (queue, mut consumer) = OutboundQueue::new(4);
        let ids: Vec<_> = (0..3)
            .map(|_| {
                let check = check();
                let id = check.id;
                queue.enqueue(check).unwrap();
                id
            })
            .collect();

        for id in ids {
            assert_eq!(consumer.rx.recv().await.unwrap().id, id);
        }
        assert!(queue.is_empty());
    }
}
