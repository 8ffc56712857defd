//! Pairs each synchronous check with the asynchronous decision that
//! answers it.
//!
//! A check is registered by id in a concurrent index, handed to the
//! [`OutboundQueue`], and its caller waits on a single-assignment outcome
//! slot. Whichever comes first wins:
//!
//! - a decision from the remote device ([`RequestCorrelator::resolve`])
//! - a send failure reported by the queue consumer
//! - the deadline
//! - the caller withdrawing
//!
//! Anything written to the slot afterwards is discarded and counted as an
//! anomaly. The entry leaves the index exactly once, when the waiting
//! caller finishes or its future is dropped.

use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use zerok_gate_client::DecisionHandler;
use zerok_gate_core::{CheckEvent, CheckState};
use zerok_gate_types::{CheckId, CheckRequest, Decision, DenyReason, Verdict};

use crate::queue::{OutboundQueue, QueueError};

/// Stand-in deadline for timeouts too large to add to an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365);

/// Check outcome counters.
///
/// All counters are monotonically increasing (reset only on restart).
#[derive(Debug, Default)]
pub struct CorrelatorMetrics {
    /// Checks accepted by `submit`.
    pub submitted: AtomicU64,
    /// Checks the owner approved.
    pub approved: AtomicU64,
    /// Checks the owner rejected.
    pub denied: AtomicU64,
    /// Checks with no decision before the deadline.
    pub timed_out: AtomicU64,
    /// Checks withdrawn by their caller.
    pub cancelled: AtomicU64,
    /// Checks refused because the outbound queue was full.
    pub backpressure: AtomicU64,
    /// Checks that could not be sent to the relay.
    pub relay_failures: AtomicU64,
    /// Decisions for checks that were unknown or already finished.
    pub late_decisions: AtomicU64,
    /// Outcomes written to a slot that was already written or closed.
    pub anomalies: AtomicU64,
}

impl CorrelatorMetrics {
    fn record(&self, verdict: Verdict) {
        let counter = match verdict {
            Verdict::Approved => &self.approved,
            Verdict::Denied(DenyReason::Rejected) => &self.denied,
            Verdict::Denied(DenyReason::Timeout) => &self.timed_out,
            Verdict::Denied(DenyReason::Cancelled) => &self.cancelled,
            Verdict::Denied(DenyReason::Backpressure) => &self.backpressure,
            Verdict::Denied(DenyReason::RelayUnavailable) => &self.relay_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

struct Slot {
    outcome: Option<oneshot::Sender<Verdict>>,
    state: CheckState,
}

/// One in-flight check.
struct PendingCheck {
    slot: Mutex<Slot>,
    created_at: Instant,
}

impl PendingCheck {
    fn new(outcome: oneshot::Sender<Verdict>) -> Self {
        Self {
            slot: Mutex::new(Slot {
                outcome: Some(outcome),
                state: CheckState::new(),
            }),
            created_at: Instant::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn state(&self) -> CheckState {
        self.lock().state
    }

    fn record(&self, event: CheckEvent) {
        let mut slot = self.lock();
        slot.state = slot.state.on_event(event);
    }

    /// Write an outcome. Returns `false` if the slot was already used.
    fn complete(&self, verdict: Verdict, event: CheckEvent) -> bool {
        let mut slot = self.lock();
        let Some(outcome) = slot.outcome.take() else {
            return false;
        };
        slot.state = slot.state.on_event(event);
        outcome.send(verdict).is_ok()
    }

    /// Close the slot for the waiter's own outcome. Returns `false` if an
    /// outcome was written first.
    fn close(&self, event: CheckEvent) -> bool {
        let mut slot = self.lock();
        if slot.outcome.take().is_none() {
            return false;
        }
        slot.state = slot.state.on_event(event);
        true
    }
}

/// What ended the wait.
enum Wake {
    Outcome(Result<Verdict, oneshot::error::RecvError>),
    Deadline,
    Cancelled,
}

/// Correlates checks with decisions.
pub struct RequestCorrelator {
    pending: DashMap<CheckId, Arc<PendingCheck>>,
    queue: OutboundQueue,
    timeout: Duration,
    metrics: CorrelatorMetrics,
}

impl std::fmt::Debug for RequestCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCorrelator")
            .field("pending_count", &self.pending.len())
            .field("queue", &self.queue)
            .field("timeout", &self.timeout)
            .field("metrics", &self.metrics)
            .finish()
    }
}

impl RequestCorrelator {
    /// Create a correlator feeding `queue`, denying checks that get no
    /// decision within `timeout`.
    pub fn new(queue: OutboundQueue, timeout: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            queue,
            timeout,
            metrics: CorrelatorMetrics::default(),
        }
    }

    /// Get access to the outcome counters.
    pub fn metrics(&self) -> &CorrelatorMetrics {
        &self.metrics
    }

    /// Get the outbound queue.
    pub fn queue(&self) -> &OutboundQueue {
        &self.queue
    }

    /// How long a check waits for a decision.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Checks currently waiting for an outcome.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Submit a check and wait for its verdict.
    ///
    /// Dropping the returned future withdraws the check.
    pub async fn submit(&self, check: CheckRequest) -> Verdict {
        self.submit_with_cancel(check, std::future::pending()).await
    }

    /// Submit a check, giving up with `Denied(Cancelled)` once `cancel`
    /// completes.
    pub async fn submit_with_cancel<C>(&self, check: CheckRequest, cancel: C) -> Verdict
    where
        C: Future<Output = ()>,
    {
        let id = check.id;
        let (tx, mut rx) = oneshot::channel();
        let entry = Arc::new(PendingCheck::new(tx));
        self.pending.insert(id, Arc::clone(&entry));
        let mut guard = PendingGuard {
            correlator: self,
            id,
            entry: Arc::clone(&entry),
            settled: false,
        };
        self.metrics.submitted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(check_id = %id, method = %check.method, "check submitted");

        let verdict = match self.queue.enqueue(check) {
            Ok(()) => {
                entry.record(CheckEvent::Enqueued);
                self.wait(&entry, &mut rx, cancel).await
            }
            Err(QueueError::Full) => {
                entry.close(CheckEvent::QueueFull);
                tracing::warn!(check_id = %id, depth = self.queue.depth(), "outbound queue full");
                Verdict::Denied(DenyReason::Backpressure)
            }
            Err(QueueError::Closed) => {
                entry.close(CheckEvent::SendFailed);
                tracing::error!(check_id = %id, "outbound queue closed");
                Verdict::Denied(DenyReason::RelayUnavailable)
            }
        };

        guard.settled = true;
        self.metrics.record(verdict);
        tracing::info!(
            check_id = %id,
            %verdict,
            elapsed_ms = entry.created_at.elapsed().as_millis() as u64,
            "check finished"
        );
        verdict
    }

    async fn wait<C>(
        &self,
        entry: &PendingCheck,
        rx: &mut oneshot::Receiver<Verdict>,
        cancel: C,
    ) -> Verdict
    where
        C: Future<Output = ()>,
    {
        tokio::pin!(cancel);
        let deadline = match entry.created_at.checked_add(self.timeout) {
            Some(at) => tokio::time::sleep_until(at),
            // Beyond what Instant can represent; only cancel or a decision ends it
            None => tokio::time::sleep(FAR_FUTURE),
        };

        let wake = tokio::select! {
            biased;
            outcome = &mut *rx => Wake::Outcome(outcome),
            () = deadline => Wake::Deadline,
            () = &mut cancel => Wake::Cancelled,
        };

        match wake {
            Wake::Outcome(outcome) => outcome.unwrap_or(Verdict::Denied(DenyReason::RelayUnavailable)),
            Wake::Deadline => Self::settle(
                entry,
                rx,
                CheckEvent::DeadlineElapsed,
                Verdict::Denied(DenyReason::Timeout),
            ),
            Wake::Cancelled => Self::settle(
                entry,
                rx,
                CheckEvent::CallerCancelled,
                Verdict::Denied(DenyReason::Cancelled),
            ),
        }
    }

    /// Close the slot with the waiter's own outcome, unless an outcome
    /// slipped in first; that one wins.
    fn settle(
        entry: &PendingCheck,
        rx: &mut oneshot::Receiver<Verdict>,
        event: CheckEvent,
        fallback: Verdict,
    ) -> Verdict {
        if entry.close(event) {
            return fallback;
        }
        rx.try_recv().unwrap_or(fallback)
    }

    /// Deliver the remote device's decision for a check.
    ///
    /// Decisions for unknown or finished checks are dropped.
    pub fn resolve(&self, id: &CheckId, approved: bool) {
        let Some(entry) = self.lookup(id) else {
            self.metrics.late_decisions.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(check_id = %id, "decision for unknown or finished check");
            return;
        };
        if !entry.complete(
            Verdict::from_approval(approved),
            CheckEvent::DecisionReceived { approved },
        ) {
            self.anomaly(id, "decision");
        }
    }

    /// Deny a check that could not be delivered.
    pub fn fail(&self, id: &CheckId, reason: DenyReason) {
        let Some(entry) = self.lookup(id) else {
            tracing::debug!(check_id = %id, %reason, "failure for unknown or finished check");
            return;
        };
        if !entry.complete(Verdict::Denied(reason), CheckEvent::SendFailed) {
            self.anomaly(id, "failure");
        }
    }

    /// Whether a check is still waiting for an outcome.
    pub fn is_pending(&self, id: &CheckId) -> bool {
        self.lookup(id).is_some_and(|entry| entry.state().is_live())
    }

    /// Record that a check was handed to the relay.
    pub fn mark_sent(&self, id: &CheckId) {
        if let Some(entry) = self.lookup(id) {
            entry.record(CheckEvent::Sent);
        }
    }

    /// The recorded lifecycle state of a check still in the index.
    pub fn state(&self, id: &CheckId) -> Option<CheckState> {
        self.lookup(id).map(|entry| entry.state())
    }

    fn lookup(&self, id: &CheckId) -> Option<Arc<PendingCheck>> {
        self.pending.get(id).map(|entry| Arc::clone(entry.value()))
    }

    fn anomaly(&self, id: &CheckId, what: &str) {
        self.metrics.anomalies.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(check_id = %id, what, "outcome slot already used, discarding");
    }
}

impl DecisionHandler for RequestCorrelator {
    fn on_decision(&self, decision: Decision) {
        self.resolve(&decision.request_id, decision.approved);
    }
}

/// Removes a check from the index when its waiter finishes or is dropped.
struct PendingGuard<'a> {
    correlator: &'a RequestCorrelator,
    id: CheckId,
    entry: Arc<PendingCheck>,
    settled: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if !self.settled && self.entry.close(CheckEvent::CallerCancelled) {
            self.correlator.metrics.record(Verdict::Denied(DenyReason::Cancelled));
            tracing::debug!(check_id = %self.id, "caller went away, check withdrawn");
        }
        self.entry.record(CheckEvent::Removed);
        self.correlator.pending.remove(&self.id);
    }
}
