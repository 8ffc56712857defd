//! # gate-client
//!
//! Relay participants for the 0k-Gate human-in-the-loop authorization
//! protocol.
//!
//! ## Features
//!
//! - **E2E Encryption**: XChaCha20-Poly1305 with 192-bit nonces under the tenant key
//! - **Relay Link**: [`RelayLink`] sends checks and reads decisions for a decision service
//! - **Device Link**: [`DeviceLink`] answers checks on behalf of the resource owner
//! - **Transport Abstraction**: Pluggable transport layer (WebSocket, mock)
//!
//! ## Example
//!
//! ```ignore
//! use zerok_gate_client::{RelayLink, TenantKey, WebSocketTransport};
//!
//! let key = TenantKey::generate()?;
//! let link = RelayLink::new("ws://localhost:9090", key, WebSocketTransport::new());
//!
//! link.connect().await?;
//! link.send_check(&check).await?;
//! link.run_reader(&correlator).await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod crypto;
pub mod device;
mod error;
pub mod link;
pub mod transport;

pub use crypto::{CryptoError, TenantKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use device::DeviceLink;
pub use error::ClientError;
pub use link::{DecisionHandler, RelayLink};
pub use transport::{MockTransport, Transport, TransportError, WebSocketTransport};
