//! HTTP endpoints for gate-relay.
//!
//! Provides the two WebSocket routes per tenant plus health checks and
//! metrics.

pub mod health;
mod metrics;
mod ws;

use crate::server::GateRelay;
use axum::{routing::get, Extension, Router};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use zerok_gate_types::routes::{DEVICE_ROUTE, SERVICE_ROUTE};

pub use health::HealthStatus;

/// Serve the relay on an already-bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, relay: Arc<GateRelay>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, build_router(relay))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Build the HTTP router with all endpoints.
pub fn build_router(relay: Arc<GateRelay>) -> Router {
    let mut router = Router::new()
        .route(&format!("{SERVICE_ROUTE}/:tenant_id"), get(ws::service_handler))
        .route(&format!("{DEVICE_ROUTE}/:tenant_id"), get(ws::device_handler))
        .route("/health", get(health::health_handler));
    if relay.config().http.metrics_enabled {
        router = router.route("/metrics", get(metrics::metrics_handler));
    }
    router.layer(Extension(relay))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::atomic::Ordering;
    use tower::util::ServiceExt;
    use zerok_gate_types::TenantId;

    fn test_relay() -> Arc<GateRelay> {
        Arc::new(GateRelay::new(Config::default()))
    }

    async fn get_status(app: Router, uri: &str) -> StatusCode {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = build_router(test_relay());
        assert_eq!(get_status(app, "/health").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_ok() {
        let app = build_router(test_relay());
        assert_eq!(get_status(app, "/metrics").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_endpoint_can_be_disabled() {
        let mut config = Config::default();
        config.http.metrics_enabled = false;
        let app = build_router(Arc::new(GateRelay::new(config)));
        assert_eq!(get_status(app, "/metrics").await, StatusCode::NOT_FOUND);
    }

    // ===========================================
    // Upgrade Admission Tests
    // ===========================================

    #[tokio::test]
    async fn malformed_tenant_id_is_bad_request() {
        let relay = test_relay();
        let app = build_router(Arc::clone(&relay));
        assert_eq!(
            get_status(app.clone(), "/ws/server/not-a-tenant").await,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(app, "/ws/client/AAAA").await,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(relay.metrics().rejected_total.load(Ordering::Relaxed), 2);
        assert_eq!(relay.total_tenants(), 0);
    }

    #[tokio::test]
    async fn plain_get_requires_upgrade() {
        let tenant = TenantId::from_key(&[5u8; 32]);
        let app = build_router(test_relay());
        assert_eq!(
            get_status(app, &format!("/ws/client/{tenant}")).await,
            StatusCode::UPGRADE_REQUIRED
        );
    }

    #[tokio::test]
    async fn connect_attempts_are_rate_limited_per_tenant() {
        let mut config = Config::default();
        config.limits.connects_per_minute = 2;
        let relay = Arc::new(GateRelay::new(config));
        let app = build_router(Arc::clone(&relay));
        let tenant = TenantId::from_key(&[6u8; 32]);
        let uri = format!("/ws/server/{tenant}");

        assert_eq!(get_status(app.clone(), &uri).await, StatusCode::UPGRADE_REQUIRED);
        assert_eq!(get_status(app.clone(), &uri).await, StatusCode::UPGRADE_REQUIRED);
        assert_eq!(get_status(app.clone(), &uri).await, StatusCode::TOO_MANY_REQUESTS);

        // Another tenant is unaffected
        let other = TenantId::from_key(&[7u8; 32]);
        assert_eq!(
            get_status(app, &format!("/ws/client/{other}")).await,
            StatusCode::UPGRADE_REQUIRED
        );
        assert_eq!(relay.metrics().rate_limit_hits.load(Ordering::Relaxed), 1);
    }
}
