//! # gate-core
//!
//! Pure logic for 0k-Gate (no I/O, instant tests).
//!
//! This crate implements the state machines and encodings used by the
//! decision service and the remote device without any network or disk I/O.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (relay connections, HTTP) is performed by `gate-client`,
//! `gate-authz` and `gate-relay`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backoff;
pub mod check;
pub mod onboarding;

pub use backoff::{reconnect_delay, MAX_BACKOFF};
pub use check::{CheckEvent, CheckState};
pub use onboarding::{decode_key, encode_key, OnboardingError, OnboardingLink, DEVICE_PATH, KEY_LEN};
