//! Main GateRelay server coordination.
//!
//! GateRelay owns the tenant index, hands out connection ids, and routes
//! attach requests to the right [`TenantSession`].

use crate::config::Config;
use crate::limits::RateLimits;
use crate::session::{Connection, Side, TenantSession};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use zerok_gate_types::TenantId;

/// Operational metrics for monitoring relay activity.
///
/// All counters are monotonically increasing (reset only on restart).
/// Thread-safe via `AtomicU64` — no locks needed for incrementing.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Total connections attached (either side).
    pub connections_total: AtomicU64,
    /// Total links closed because a newer one took their slot.
    pub replacements_total: AtomicU64,
    /// Total frames delivered to the opposite side.
    pub frames_forwarded: AtomicU64,
    /// Total ciphertext bytes delivered to the opposite side.
    pub bytes_forwarded: AtomicU64,
    /// Total frames dropped because the opposite side was absent.
    pub frames_dropped: AtomicU64,
    /// Total rate limit rejections.
    pub rate_limit_hits: AtomicU64,
    /// Total upgrade requests refused before attach (bad tenant id, no upgrade).
    pub rejected_total: AtomicU64,
    /// Total idle sessions removed by the cleanup task.
    pub sessions_reaped: AtomicU64,
}

/// Main relay server.
pub struct GateRelay {
    config: Config,
    /// Rate limiters for connection attempts.
    rate_limits: RateLimits,
    /// Operational metrics (counters, gauges).
    metrics: Arc<RelayMetrics>,
    /// Pairing state per tenant.
    sessions: DashMap<TenantId, Arc<TenantSession>>,
    next_conn_id: AtomicU64,
}

impl std::fmt::Debug for GateRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateRelay")
            .field("config", &self.config)
            .field("rate_limits", &self.rate_limits)
            .field("metrics", &self.metrics)
            .field("sessions_count", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

impl GateRelay {
    /// Create a new GateRelay with the given config.
    pub fn new(config: Config) -> Self {
        let rate_limits = RateLimits::new(&config.limits);
        Self {
            config,
            rate_limits,
            metrics: Arc::new(RelayMetrics::default()),
            sessions: DashMap::new(),
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Get the relay configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get access to the rate limiters.
    pub fn rate_limits(&self) -> &RateLimits {
        &self.rate_limits
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Get or lazily create the session for a tenant.
    pub fn session(&self, tenant_id: &TenantId) -> Arc<TenantSession> {
        self.sessions
            .entry(*tenant_id)
            .or_insert_with(|| Arc::new(TenantSession::new(*tenant_id, Arc::clone(&self.metrics))))
            .clone()
    }

    /// Look up a tenant's session without creating one.
    pub fn existing_session(&self, tenant_id: &TenantId) -> Option<Arc<TenantSession>> {
        self.sessions.get(tenant_id).map(|entry| entry.value().clone())
    }

    /// Attach a decision-service connection. Returns its connection id.
    pub async fn attach_service(&self, tenant_id: &TenantId, conn: Connection) -> u64 {
        self.attach(tenant_id, Side::Service, conn).await
    }

    /// Attach a remote-device connection. Returns its connection id.
    pub async fn attach_device(&self, tenant_id: &TenantId, conn: Connection) -> u64 {
        self.attach(tenant_id, Side::Device, conn).await
    }

    /// Attach a connection on the given side, replacing any previous link.
    pub async fn attach(&self, tenant_id: &TenantId, side: Side, conn: Connection) -> u64 {
        let id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let session = self.session(tenant_id);

        if session.attach(side, id, conn).await {
            self.metrics.replacements_total.fetch_add(1, Ordering::Relaxed);
        }
        self.metrics.connections_total.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(tenant_id = %tenant_id, side = %side, id, "attached");
        id
    }

    /// Remove sessions that have had no attached side for at least `idle`.
    ///
    /// A session is only removed while nothing but the index refers to it,
    /// so an attach racing with the sweep keeps its session.
    pub fn reap_idle(&self, idle: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| !(Arc::strong_count(session) == 1 && session.is_idle(idle)));
        let reaped = before.saturating_sub(self.sessions.len());
        if reaped > 0 {
            self.metrics
                .sessions_reaped
                .fetch_add(reaped as u64, Ordering::Relaxed);
        }
        reaped
    }

    /// Get total tenants with a session.
    pub fn total_tenants(&self) -> usize {
        self.sessions.len()
    }

    /// Count attached links and fully paired tenants, as `(links, paired)`.
    ///
    /// Best effort: sessions whose lock is busy are skipped.
    pub fn link_counts(&self) -> (usize, usize) {
        let mut links = 0;
        let mut paired = 0;
        for entry in self.sessions.iter() {
            if let Some((service, device)) = entry.value().try_attached() {
                links += service as usize + device as usize;
                paired += (service && device) as usize;
            }
        }
        (links, paired)
    }
}
