//! # gate-types
//!
//! Wire format types for the 0k-Gate human-in-the-loop authorization protocol.
//!
//! This crate provides the foundational types used across all 0k-Gate crates:
//! - [`TenantId`], [`CheckId`] - Routing and correlation identifiers
//! - [`CheckRequest`], [`Decision`] - Plaintext protocol messages (JSON)
//! - [`Verdict`], [`DenyReason`] - Check outcomes
//! - [`GateError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod messages;
pub mod routes;
mod verdict;

pub use error::GateError;
pub use ids::{CheckId, TenantId, TENANT_ID_ENCODED_LEN, TENANT_ID_LEN};
pub use messages::{CheckRequest, Decision};
pub use verdict::{DenyReason, Verdict};
