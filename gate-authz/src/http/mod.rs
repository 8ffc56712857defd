//! HTTP listeners for gate-authz.
//!
//! Two routers on two listeners: the check listener, where every request
//! is an ext_authz check, and the admin listener with health, metrics and
//! the onboarding link.

pub mod admin;
mod check;

use crate::server::GateAuthz;
use axum::{routing::get, Extension, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub use admin::HealthStatus;

/// Serve ext_authz checks on an already-bound listener until `shutdown`
/// resolves.
pub async fn serve_check<F>(listener: TcpListener, authz: Arc<GateAuthz>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(
        listener,
        check_router(authz).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

/// Serve the admin endpoints on an already-bound listener until `shutdown`
/// resolves.
pub async fn serve_admin<F>(listener: TcpListener, authz: Arc<GateAuthz>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, admin_router(authz))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Build the check router. Any method on any path is a check.
pub fn check_router(authz: Arc<GateAuthz>) -> Router {
    Router::new()
        .fallback(check::check_handler)
        .layer(Extension(authz))
}

/// Build the admin router.
pub fn admin_router(authz: Arc<GateAuthz>) -> Router {
    Router::new()
        .route("/health", get(admin::health_handler))
        .route("/metrics", get(admin::metrics_handler))
        .route("/onboarding", get(admin::onboarding_handler))
        .layer(Extension(authz))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::queue::CheckDispatch;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tokio::sync::mpsc;
    use tower::util::ServiceExt;
    use zerok_gate_client::{ClientError, TenantKey};
    use zerok_gate_types::{CheckRequest, DenyReason};

    /// Dispatch that hands checks to the test instead of a relay.
    struct Handoff {
        sent: mpsc::UnboundedSender<CheckRequest>,
        connected: bool,
    }

    #[async_trait]
    impl CheckDispatch for Handoff {
        async fn dispatch(&self, check: &CheckRequest) -> Result<(), ClientError> {
            if !self.connected {
                return Err(ClientError::NotConnected);
            }
            let _ = self.sent.send(check.clone());
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }
    }

    fn test_authz(connected: bool) -> (Arc<GateAuthz>, mpsc::UnboundedReceiver<CheckRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let key = TenantKey::from_bytes([4u8; 32]);
        let authz = GateAuthz::start(
            Config::default(),
            &key,
            Arc::new(Handoff { sent: tx, connected }),
        );
        (authz, rx)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Answer the next dispatched check, returning what was dispatched.
    fn answer_next(
        authz: &Arc<GateAuthz>,
        mut sent: mpsc::UnboundedReceiver<CheckRequest>,
        approved: bool,
    ) -> tokio::task::JoinHandle<CheckRequest> {
        let authz = Arc::clone(authz);
        tokio::spawn(async move {
            let check = sent.recv().await.unwrap();
            authz.correlator().resolve(&check.id, approved);
            check
        })
    }

    // ===========================================
    // Check Endpoint Tests
    // ===========================================

    #[tokio::test]
    async fn approved_check_returns_ok_with_result_header() {
        let (authz, sent) = test_authz(true);
        let device = answer_next(&authz, sent, true);

        let response = check_router(Arc::clone(&authz))
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/users/7?hard=true")
                    .header("x-forwarded-for", "198.51.100.4")
                    .header("authorization", "Bearer t")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-authz-result"], "approved");

        let check = device.await.unwrap();
        assert_eq!(check.method, "DELETE");
        assert_eq!(check.path, "/api/users/7?hard=true");
        assert_eq!(check.source_ip, "198.51.100.4");
        assert_eq!(check.headers["authorization"], "Bearer t");
    }

    #[tokio::test]
    async fn rejected_check_is_forbidden() {
        let (authz, sent) = test_authz(true);
        let _device = answer_next(&authz, sent, false);

        let response = check_router(authz)
            .oneshot(Request::builder().uri("/admin").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["error"], DenyReason::Rejected.as_str());
    }

    #[tokio::test]
    async fn relay_down_is_service_unavailable() {
        let (authz, _sent) = test_authz(false);

        let response = check_router(authz)
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await["error"], "relay unavailable");
    }

    // ===========================================
    // Admin Endpoint Tests
    // ===========================================

    #[tokio::test]
    async fn health_reports_relay_state() {
        let (authz, _sent) = test_authz(false);
        let response = admin_router(Arc::clone(&authz))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["relay_connected"], false);
        assert_eq!(json["tenant_id"], authz.tenant_id().to_string());
    }

    #[tokio::test]
    async fn onboarding_returns_device_link() {
        let (authz, _sent) = test_authz(true);
        let response = admin_router(Arc::clone(&authz))
            .oneshot(Request::builder().uri("/onboarding").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["url"], authz.onboarding_url());
    }

    #[tokio::test]
    async fn metrics_count_outcomes() {
        let (authz, _sent) = test_authz(false);
        let _ = check_router(Arc::clone(&authz))
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let response = admin_router(Arc::clone(&authz))
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let text = admin::render(&authz);
        assert!(text.contains("gate_authz_checks_total 1"));
        assert!(text.contains("gate_authz_verdicts_total{outcome=\"relay_unavailable\"} 1"));
        assert!(text.contains("gate_authz_relay_connected 0"));
        assert!(text.contains("gate_authz_pending_checks 0"));
    }
}
