//! The outcome of an authorization check.

use std::fmt;

/// Why a check was denied.
///
/// Every failure mode resolves to a denial with one of these reasons; none
/// of them propagate as errors to the caller waiting on a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
    /// The resource owner rejected the request.
    Rejected,
    /// No decision arrived before the deadline.
    Timeout,
    /// The caller withdrew before a decision arrived.
    Cancelled,
    /// The outbound queue was full.
    Backpressure,
    /// The check could not be sent to the relay.
    RelayUnavailable,
}

impl DenyReason {
    /// Short machine-readable reason, used in `{"error": "<reason>"}` bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rejected => "denied",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Backpressure => "backpressure",
            Self::RelayUnavailable => "relay unavailable",
        }
    }

    /// HTTP status the proxy should return to the downstream client.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Rejected | Self::Timeout | Self::Cancelled => 403,
            Self::Backpressure => 429,
            Self::RelayUnavailable => 503,
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final answer for one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// Let the request through.
    Approved,
    /// Block the request.
    Denied(DenyReason),
}

impl Verdict {
    /// Map a device decision onto a verdict.
    pub fn from_approval(approved: bool) -> Self {
        if approved {
            Self::Approved
        } else {
            Self::Denied(DenyReason::Rejected)
        }
    }

    /// Whether the request may proceed.
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approved => f.write_str("approved"),
            Self::Denied(reason) => write!(f, "denied ({reason})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_strings_are_stable() {
        assert_eq!(DenyReason::Timeout.as_str(), "timeout");
        assert_eq!(DenyReason::Cancelled.as_str(), "cancelled");
        assert_eq!(DenyReason::Backpressure.as_str(), "backpressure");
        assert_eq!(DenyReason::RelayUnavailable.as_str(), "relay unavailable");
    }

    #[test]
    fn approval_maps_to_verdict() {
        assert_eq!(Verdict::from_approval(true), Verdict::Approved);
        assert_eq!(
            Verdict::from_approval(false),
            Verdict::Denied(DenyReason::Rejected)
        );
        assert!(Verdict::Approved.is_approved());
        assert!(!Verdict::Denied(DenyReason::Timeout).is_approved());
    }

    #[test]
    fn transient_failures_are_not_forbidden() {
        assert_eq!(DenyReason::Rejected.http_status(), 403);
        assert_eq!(DenyReason::Backpressure.http_status(), 429);
        assert_eq!(DenyReason::RelayUnavailable.http_status(), 503);
    }
}
