//! Lifecycle state machine for a single authorization check.
//!
//! Pure, side-effect-free: the decision service records what happened to a
//! check by feeding events through [`CheckState::on_event`]. The state is
//! advisory. Delivery of an outcome is keyed by check id, never by the state
//! recorded here, so a decision may legitimately race ahead of `Sent`.
//!
//! ```text
//! Created ─► Queued ─► Sent ─┬─► Decided ───┐
//!    │          │            ├─► TimedOut ──┤
//!    │          │            └─► Cancelled ─┼─► Removed
//!    └──────────┴──────────────► Failed ────┘
//! ```

use zerok_gate_types::{DenyReason, Verdict};

/// Where a check is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    /// Registered in the pending index, not yet handed to the queue.
    Created,
    /// Waiting in the outbound queue.
    Queued,
    /// Handed to the relay connection.
    Sent,
    /// The remote device answered.
    Decided {
        /// The device's answer.
        approved: bool,
    },
    /// The deadline elapsed first.
    TimedOut,
    /// The caller withdrew first.
    Cancelled,
    /// The check never reached the device.
    Failed {
        /// Why it failed.
        reason: DenyReason,
    },
    /// Removed from the pending index after its outcome was consumed.
    Removed,
}

/// Things that can happen to a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckEvent {
    /// Accepted by the outbound queue.
    Enqueued,
    /// Outbound queue was full.
    QueueFull,
    /// Queue consumer handed the encrypted check to the relay.
    Sent,
    /// Queue consumer could not send the check.
    SendFailed,
    /// A decision for this check arrived.
    DecisionReceived {
        /// The device's answer.
        approved: bool,
    },
    /// The deadline elapsed.
    DeadlineElapsed,
    /// The caller withdrew.
    CallerCancelled,
    /// The outcome was consumed and the entry dropped from the index.
    Removed,
}

impl CheckState {
    /// Create a state machine for a freshly registered check.
    pub fn new() -> Self {
        Self::Created
    }

    /// Process an event and return the new state.
    ///
    /// Events that make no sense in the current state leave it unchanged;
    /// in particular nothing moves a check out of a terminal state except
    /// [`CheckEvent::Removed`].
    pub fn on_event(self, event: CheckEvent) -> Self {
        match (self, event) {
            (Self::Created, CheckEvent::Enqueued) => Self::Queued,
            (Self::Created, CheckEvent::QueueFull) => Self::Failed {
                reason: DenyReason::Backpressure,
            },

            (Self::Queued, CheckEvent::Sent) => Self::Sent,
            (Self::Queued, CheckEvent::SendFailed) => Self::Failed {
                reason: DenyReason::RelayUnavailable,
            },

            // Outcome events win from any live state; `Sent` is not a gate.
            (Self::Created | Self::Queued | Self::Sent, CheckEvent::DecisionReceived { approved }) => {
                Self::Decided { approved }
            }
            (Self::Created | Self::Queued | Self::Sent, CheckEvent::DeadlineElapsed) => {
                Self::TimedOut
            }
            (Self::Created | Self::Queued | Self::Sent, CheckEvent::CallerCancelled) => {
                Self::Cancelled
            }

            (state, CheckEvent::Removed) if state.is_terminal() => Self::Removed,

            (state, _) => state,
        }
    }

    /// Whether an outcome has been recorded.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Decided { .. } | Self::TimedOut | Self::Cancelled | Self::Failed { .. }
        )
    }

    /// Whether the check is still waiting for an outcome.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Created | Self::Queued | Self::Sent)
    }

    /// The verdict implied by a terminal state.
    pub fn verdict(&self) -> Option<Verdict> {
        match self {
            Self::Decided { approved } => Some(Verdict::from_approval(*approved)),
            Self::TimedOut => Some(Verdict::Denied(DenyReason::Timeout)),
            Self::Cancelled => Some(Verdict::Denied(DenyReason::Cancelled)),
            Self::Failed { reason } => Some(Verdict::Denied(*reason)),
            _ => None,
        }
    }
}

impl Default for CheckState {
    fn default() -> Self {
        Self::new()
    }
}
