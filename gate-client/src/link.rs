//! The decision service's end of a tenant's relay route.
//!
//! [`RelayLink`] seals outgoing [`CheckRequest`]s and opens incoming
//! [`Decision`]s. It does not keep any per-check state: decisions are handed
//! to a [`DecisionHandler`], which owns correlation.
//!
//! ```text
//! correlator ─► queue ─► RelayLink::send_check ─► Transport ─► relay
//!     ▲                                                          │
//!     └──── DecisionHandler ◄── RelayLink::run_reader ◄──────────┘
//! ```

use zerok_gate_types::routes::SERVICE_ROUTE;
use zerok_gate_types::{CheckRequest, Decision, TenantId};

use crate::crypto::TenantKey;
use crate::error::ClientError;
use crate::transport::{Transport, TransportError};

/// Receives decisions read off the relay link.
///
/// Called from the reader loop, so implementations must not block.
pub trait DecisionHandler: Send + Sync {
    /// A decision was decrypted and decoded.
    fn on_decision(&self, decision: Decision);
}

/// Build the relay URL for one side of a tenant.
pub(crate) fn route_url(relay_url: &str, route: &str, tenant_id: &TenantId) -> String {
    format!("{}{}/{}", relay_url.trim_end_matches('/'), route, tenant_id)
}

/// Encrypted connection from the decision service to the relay.
pub struct RelayLink<T: Transport> {
    transport: T,
    key: TenantKey,
    tenant_id: TenantId,
    relay_url: String,
}

impl<T: Transport> RelayLink<T> {
    /// Create a link for the tenant owning `key`.
    pub fn new(relay_url: &str, key: TenantKey, transport: T) -> Self {
        let tenant_id = key.tenant_id();
        Self {
            transport,
            key,
            tenant_id,
            relay_url: relay_url.to_string(),
        }
    }

    /// The tenant this link serves.
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// The relay route this link connects to.
    pub fn service_url(&self) -> String {
        route_url(&self.relay_url, SERVICE_ROUTE, &self.tenant_id)
    }

    /// Get the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Whether the transport is currently up.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Open the service side of the tenant's route.
    ///
    /// Connecting again while a previous connection is registered at the
    /// relay replaces it there.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let url = self.service_url();
        self.transport
            .connect(&url)
            .await
            .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;
        tracing::info!(tenant = %self.tenant_id, "connected to relay");
        Ok(())
    }

    /// Encode, seal and send one check.
    pub async fn send_check(&self, check: &CheckRequest) -> Result<(), ClientError> {
        if !self.transport.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let plaintext = check.to_bytes()?;
        let frame = self.key.encrypt(&plaintext)?;
        self.transport.send(&frame).await?;
        tracing::debug!(check_id = %check.id, bytes = frame.len(), "check sent");
        Ok(())
    }

    /// Open one frame received from the relay.
    pub fn open_decision(&self, frame: &[u8]) -> Result<Decision, ClientError> {
        let plaintext = self.key.decrypt(frame)?;
        Ok(Decision::from_bytes(&plaintext)?)
    }

    /// Read decisions until the connection ends.
    ///
    /// Frames that fail to decrypt or decode are logged and skipped; a
    /// single bad frame never tears down the link. Returns the transport
    /// error that ended the loop.
    pub async fn run_reader<H: DecisionHandler + ?Sized>(&self, handler: &H) -> TransportError {
        loop {
            let frame = match self.transport.recv().await {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::info!(tenant = %self.tenant_id, error = %e, "relay link closed");
                    return e;
                }
            };
            match self.open_decision(&frame) {
                Ok(decision) => handler.on_decision(decision),
                Err(e) => {
                    tracing::warn!(tenant = %self.tenant_id, error = %e, "dropping undecodable frame")
                }
            }
        }
    }

    /// Close the connection gracefully.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.transport.close().await?;
        Ok(())
    }
}

impl<T: Transport> std::fmt::Debug for RelayLink<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayLink")
            .field("tenant_id", &self.tenant_id)
            .field("relay_url", &self.relay_url)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use zerok_gate_types::CheckId;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Decision>>);

    impl DecisionHandler for Recorder {
        fn on_decision(&self, decision: Decision) {
            self.0.lock().unwrap().push(decision);
        }
    }

    fn check() -> CheckRequest {
        CheckRequest::new(
            "DELETE",
            "/api/v1/users/7",
            BTreeMap::from([("host".to_string(), "api.internal".to_string())]),
            "10.0.0.9",
        )
    }

    fn link() -> (RelayLink<MockTransport>, MockTransport, TenantKey) {
        let transport = MockTransport::new();
        let key = TenantKey::from_bytes([9u8; 32]);
        let link = RelayLink::new("ws://relay:9090/", key.clone(), transport.clone());
        (link, transport, key)
    }

    // ===========================================
    // Connection Tests
    // ===========================================

    #[tokio::test]
    async fn connects_to_service_route() {
        let (link, transport, key) = link();
        link.connect().await.unwrap();

        assert_eq!(
            transport.connected_address(),
            Some(format!("ws://relay:9090/ws/server/{}", key.tenant_id()))
        );
        assert!(link.is_connected());
    }

    #[tokio::test]
    async fn connect_failure_is_reported() {
        let (link, transport, _) = link();
        transport.fail_next_connect("refused");
        assert!(matches!(
            link.connect().await,
            Err(ClientError::ConnectionFailed(_))
        ));
    }

    // ===========================================
    // Send Tests
    // ===========================================

    #[tokio::test]
    async fn send_check_requires_connection() {
        let (link, _, _) = link();
        assert!(matches!(
            link.send_check(&check()).await,
            Err(ClientError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn sent_frame_is_sealed_check() {
        let (link, transport, key) = link();
        link.connect().await.unwrap();
        let check = check();

        link.send_check(&check).await.unwrap();

        let frame = transport.last_sent().unwrap();
        assert!(!frame.windows(4).any(|w| w == b"DELE"), "plaintext leaked");
        let opened = CheckRequest::from_bytes(&key.decrypt(&frame).unwrap()).unwrap();
        assert_eq!(opened, check);
    }

    #[tokio::test]
    async fn send_failure_propagates() {
        let (link, transport, _) = link();
        link.connect().await.unwrap();
        transport.fail_next_send("broken pipe");
        assert!(matches!(
            link.send_check(&check()).await,
            Err(ClientError::Transport(TransportError::SendFailed(_)))
        ));
    }

    // ===========================================
    // Reader Tests
    // ===========================================

    #[tokio::test]
    async fn reader_dispatches_decisions_and_skips_garbage() {
        let (link, transport, key) = link();
        link.connect().await.unwrap();

        let id = CheckId::new();
        let decision = Decision {
            request_id: id,
            approved: true,
        };
        let stranger = TenantKey::from_bytes([1u8; 32]);

        transport.queue_frame(b"not even a frame".to_vec());
        transport.queue_frame(stranger.encrypt(&decision.to_bytes().unwrap()).unwrap());
        transport.queue_frame(key.encrypt(b"{\"approved\":true}").unwrap());
        transport.queue_frame(key.encrypt(&decision.to_bytes().unwrap()).unwrap());
        transport.hang_up();

        let recorder = Recorder::default();
        let ended = link.run_reader(&recorder).await;

        assert!(matches!(ended, TransportError::ConnectionClosed));
        let seen = recorder.0.lock().unwrap();
        assert_eq!(seen.as_slice(), &[decision]);
    }

    #[test]
    fn debug_is_redacted() {
        let (link, _, key) = link();
        let debug = format!("{:?}", link);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains(&key.encode()));
    }
}
