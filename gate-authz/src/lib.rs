//! # gate-authz
//!
//! Human-in-the-loop authorization decision service for 0k-Gate.
//!
//! A reverse proxy asks "may this request proceed?" over Envoy's HTTP
//! ext_authz protocol. Each check is sealed under the tenant key and sent
//! through the relay to the resource owner's device; the proxy's call
//! blocks until the owner decides or the deadline passes.
//!
//! ## Architecture
//!
//! ```text
//! proxy ─► http::check ─► RequestCorrelator ─► OutboundQueue ─► RelayLink ─► relay
//!                               ▲                                              │
//!                               └──────── supervisor (reader loop) ◄───────────┘
//! ```
//!
//! ## Modules
//!
//! - [`correlator`]: Pending check index and single-assignment outcomes
//! - [`queue`]: Bounded outbound queue and its consumer
//! - [`supervisor`]: Relay link reconnection and decision reading
//! - [`server`]: Shared service state
//! - [`http`]: Check and admin listeners
//! - [`config`]: Configuration loading

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod correlator;
pub mod error;
pub mod http;
pub mod queue;
pub mod server;
pub mod supervisor;

pub use config::Config;
pub use correlator::RequestCorrelator;
pub use error::AuthzError;
pub use queue::{CheckDispatch, OutboundQueue};
pub use server::GateAuthz;
