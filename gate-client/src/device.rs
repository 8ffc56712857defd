//! The remote device's end of a tenant's relay route.
//!
//! A headless counterpart of the browser page the resource owner opens
//! from the onboarding link: it receives sealed checks and answers with
//! sealed decisions. Useful for scripted approvals and for exercising a
//! decision service end to end.

use zerok_gate_core::OnboardingLink;
use zerok_gate_types::routes::DEVICE_ROUTE;
use zerok_gate_types::{CheckId, CheckRequest, Decision, TenantId};

use crate::crypto::TenantKey;
use crate::error::ClientError;
use crate::link::route_url;
use crate::transport::Transport;

/// Encrypted connection from a remote device to the relay.
pub struct DeviceLink<T: Transport> {
    transport: T,
    key: TenantKey,
    tenant_id: TenantId,
    relay_url: String,
}

impl<T: Transport> DeviceLink<T> {
    /// Create a device link holding `key`.
    pub fn new(relay_url: &str, key: TenantKey, transport: T) -> Self {
        let tenant_id = key.tenant_id();
        Self {
            transport,
            key,
            tenant_id,
            relay_url: relay_url.to_string(),
        }
    }

    /// Create a device link from a parsed onboarding link.
    pub fn from_onboarding(link: &OnboardingLink, relay_url: &str, transport: T) -> Self {
        Self::new(relay_url, TenantKey::from_onboarding(link), transport)
    }

    /// The tenant this device belongs to.
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// The relay route this device connects to.
    pub fn device_url(&self) -> String {
        route_url(&self.relay_url, DEVICE_ROUTE, &self.tenant_id)
    }

    /// Open the device side of the tenant's route, replacing any device
    /// already registered there.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.transport
            .connect(&self.device_url())
            .await
            .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;
        tracing::info!(tenant = %self.tenant_id, "device connected to relay");
        Ok(())
    }

    /// Wait for the next check addressed to this device.
    ///
    /// Frames that fail to decrypt or decode are skipped.
    pub async fn next_check(&self) -> Result<CheckRequest, ClientError> {
        loop {
            let frame = self.transport.recv().await?;
            let opened = self
                .key
                .decrypt(&frame)
                .map_err(ClientError::from)
                .and_then(|plaintext| CheckRequest::from_bytes(&plaintext).map_err(ClientError::from));
            match opened {
                Ok(check) => return Ok(check),
                Err(e) => tracing::warn!(tenant = %self.tenant_id, error = %e, "dropping undecodable frame"),
            }
        }
    }

    /// Answer a check.
    pub async fn decide(&self, request_id: CheckId, approved: bool) -> Result<(), ClientError> {
        if !self.transport.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let decision = Decision {
            request_id,
            approved,
        };
        let frame = self.key.encrypt(&decision.to_bytes()?)?;
        self.transport.send(&frame).await?;
        Ok(())
    }

    /// Close the connection gracefully.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.transport.close().await?;
        Ok(())
    }
}

impl<T: Transport> std::fmt::Debug for DeviceLink<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLink")
            .field("tenant_id", &self.tenant_id)
            .field("relay_url", &self.relay_url)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockTransport, TransportError};
    use std::collections::BTreeMap;

    fn key() -> TenantKey {
        TenantKey::from_bytes([0x42u8; 32])
    }

    #[tokio::test]
    async fn onboarding_link_selects_device_route() {
        let link = key().onboarding_link("https://gate.example.com");
        let parsed = OnboardingLink::parse(&link.to_url()).unwrap();
        let transport = MockTransport::new();
        let device = DeviceLink::from_onboarding(&parsed, "wss://relay.example.com", transport.clone());

        device.connect().await.unwrap();

        assert_eq!(
            transport.connected_address(),
            Some(format!("wss://relay.example.com/ws/client/{}", key().tenant_id()))
        );
    }

    #[tokio::test]
    async fn receives_check_and_answers() {
        let transport = MockTransport::new();
        let device = DeviceLink::new("ws://relay", key(), transport.clone());
        device.connect().await.unwrap();

        let check = CheckRequest::new("GET", "/secrets", BTreeMap::new(), "10.1.1.1");
        transport.queue_frame(b"\x00garbage".to_vec());
        transport.queue_frame(key().encrypt(&check.to_bytes().unwrap()).unwrap());

        let received = device.next_check().await.unwrap();
        assert_eq!(received, check);

        device.decide(received.id, false).await.unwrap();
        let reply = key().decrypt(&transport.last_sent().unwrap()).unwrap();
        let decision = Decision::from_bytes(&reply).unwrap();
        assert_eq!(decision.request_id, check.id);
        assert!(!decision.approved);
    }

    #[tokio::test]
    async fn closed_connection_ends_next_check() {
        let transport = MockTransport::new();
        let device = DeviceLink::new("ws://relay", key(), transport.clone());
        device.connect().await.unwrap();
        transport.hang_up();

        assert!(matches!(
            device.next_check().await,
            Err(ClientError::Transport(TransportError::ConnectionClosed))
        ));
    }

    #[tokio::test]
    async fn decide_requires_connection() {
        let device = DeviceLink::new("ws://relay", key(), MockTransport::new());
        assert!(matches!(
            device.decide(CheckId::new(), true).await,
            Err(ClientError::NotConnected)
        ));
    }
}
