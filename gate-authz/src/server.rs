//! Main GateAuthz service coordination.
//!
//! GateAuthz ties the check path together: the correlator the HTTP handler
//! submits to, the queue consumer draining to the relay link, and the
//! onboarding link the admin endpoint hands out.

use std::sync::Arc;
use zerok_gate_client::TenantKey;
use zerok_gate_types::TenantId;

use crate::config::Config;
use crate::correlator::RequestCorrelator;
use crate::queue::{CheckDispatch, OutboundQueue};

/// Decision service state shared by the HTTP listeners.
pub struct GateAuthz {
    config: Config,
    correlator: Arc<RequestCorrelator>,
    dispatch: Arc<dyn CheckDispatch>,
    tenant_id: TenantId,
    onboarding_url: String,
}

impl std::fmt::Debug for GateAuthz {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateAuthz")
            .field("config", &self.config)
            .field("correlator", &self.correlator)
            .field("tenant_id", &self.tenant_id)
            .field("onboarding_url", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl GateAuthz {
    /// Build the service and spawn its queue consumer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: Config, key: &TenantKey, dispatch: Arc<dyn CheckDispatch>) -> Arc<Self> {
        let (queue, consumer) = OutboundQueue::new(config.check.queue_depth);
        let correlator = Arc::new(RequestCorrelator::new(queue, config.check_timeout()));
        consumer.spawn(Arc::clone(&correlator), Arc::clone(&dispatch));

        let onboarding_url = key.onboarding_link(&config.relay.device_base_url).to_url();
        Arc::new(Self {
            config,
            correlator,
            dispatch,
            tenant_id: key.tenant_id(),
            onboarding_url,
        })
    }

    /// Get the service configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the request correlator.
    pub fn correlator(&self) -> &Arc<RequestCorrelator> {
        &self.correlator
    }

    /// The tenant this service answers for.
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Whether the relay link is currently up.
    pub fn relay_connected(&self) -> bool {
        self.dispatch.is_connected()
    }

    /// Link the resource owner opens on their device. Carries the key.
    pub fn onboarding_url(&self) -> &str {
        &self.onboarding_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerok_gate_client::{MockTransport, RelayLink};
    use zerok_gate_core::OnboardingLink;

    #[tokio::test]
    async fn onboarding_url_carries_tenant_key() {
        let key = TenantKey::from_bytes([8u8; 32]);
        let mut config = Config::default();
        config.relay.device_base_url = "https://gate.example.com".into();
        let link = Arc::new(RelayLink::new(&config.relay.url, key.clone(), MockTransport::new()));

        let authz = GateAuthz::start(config, &key, link);

        let parsed = OnboardingLink::parse(authz.onboarding_url()).unwrap();
        assert_eq!(parsed.key(), key.as_bytes());
        assert_eq!(parsed.tenant_id(), authz.tenant_id());
        assert!(authz.onboarding_url().starts_with("https://gate.example.com/s/"));
        assert!(!format!("{authz:?}").contains(&key.encode()));
    }

    #[tokio::test]
    async fn relay_status_follows_the_link() {
        let key = TenantKey::from_bytes([9u8; 32]);
        let transport = MockTransport::new();
        let link = Arc::new(RelayLink::new("ws://relay", key.clone(), transport.clone()));
        let authz = GateAuthz::start(Config::default(), &key, Arc::clone(&link) as Arc<dyn CheckDispatch>);

        assert!(!authz.relay_connected());
        link.connect().await.unwrap();
        assert!(authz.relay_connected());
    }
}
