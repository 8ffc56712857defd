//! # gate-relay
//!
//! Zero-knowledge pairing relay for 0k-Gate.
//!
//! This crate implements a relay server that:
//! - Accepts WebSocket connections from decision services and remote devices
//! - Pairs exactly one of each per tenant id
//! - Forwards opaque frames between the pair, in order, per direction
//! - Never sees plaintext (relay is a "dumb pipe")
//!
//! ## Architecture
//!
//! ```text
//! Decision service ──┐                  ┌── Remote device
//!                    │   WebSocket      │
//!   /ws/server/:t    ├─────────────────►│  /ws/client/:t
//!                    │                  │
//!        ┌───────────┴──────────────────┴───┐
//!        │            gate-relay            │
//!        │  DashMap<TenantId, TenantSession>│
//!        └──────────────────────────────────┘
//! ```
//!
//! Attaching a side replaces whatever held that side before; frames sent
//! while the other side is absent are dropped.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cleanup;
pub mod config;
pub mod error;
pub mod http;
pub mod limits;
pub mod server;
pub mod session;

pub use config::Config;
pub use error::RelayError;
pub use server::GateRelay;
