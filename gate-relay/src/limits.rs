//! Rate limiting for gate-relay.
//!
//! Tenant ids are unauthenticated, so anyone who learns one can hammer its
//! routes and knock the legitimate service or device off by replacement.
//! Connection attempts are limited per tenant id with governor's keyed rate
//! limiter backed by DashMap.

use crate::config::LimitsConfig;
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use zerok_gate_types::TenantId;

/// Type alias for a keyed rate limiter using DashMap.
type KeyedLimiter<K> = RateLimiter<
    K,
    dashmap::DashMap<K, InMemoryState>,
    DefaultClock,
    NoOpMiddleware<governor::clock::QuantaInstant>,
>;

/// Rate limiters for the relay server.
#[derive(Clone)]
pub struct RateLimits {
    /// Limits upgrade attempts per tenant (both sides share the budget).
    ///
    /// Configured via `limits.connects_per_minute`.
    connect_limiter: Arc<KeyedLimiter<TenantId>>,
}

impl std::fmt::Debug for RateLimits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimits")
            .field("connect_limiter", &"KeyedLimiter<TenantId>")
            .field("tracked_tenants", &self.connect_limiter.len())
            .finish()
    }
}

impl RateLimits {
    /// Create rate limiters from configuration.
    ///
    /// A zero quota is treated as one; [`crate::config::Config::validate`]
    /// rejects it before this point.
    pub fn new(config: &LimitsConfig) -> Self {
        let per_minute = NonZeroU32::new(config.connects_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            connect_limiter: Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute))),
        }
    }

    /// Check if a connection attempt for `tenant` is allowed.
    pub fn check_connect(&self, tenant: &TenantId) -> Result<(), RateLimitError> {
        self.connect_limiter
            .check_key(tenant)
            .map_err(|_| RateLimitError::ConnectLimitExceeded)
    }

    /// Get the number of tracked tenant keys (for metrics).
    pub fn tracked_tenants(&self) -> usize {
        self.connect_limiter.len()
    }

    /// Evict entries whose quota has fully recharged.
    ///
    /// Called from the cleanup task so tenants that stopped connecting do
    /// not accumulate.
    pub fn shrink(&self) {
        self.connect_limiter.retain_recent();
        self.connect_limiter.shrink_to_fit();
    }
}

/// Rate limit error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    /// Too many connection attempts for this tenant.
    ConnectLimitExceeded,
}

impl std::fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectLimitExceeded => write!(f, "connection rate limit exceeded"),
        }
    }
}

impl std::error::Error for RateLimitError {}
