//! Admin endpoints: health, Prometheus metrics, onboarding link.
//!
//! The onboarding link carries the tenant key, so the admin listener
//! defaults to loopback.

use crate::server::GateAuthz;
use axum::http::header;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::Serialize;
use std::fmt::Write;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

/// Global start time for uptime calculation.
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize the start time (call once at startup).
pub fn init_start_time() {
    START_TIME.get_or_init(Instant::now);
}

/// Health status response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Overall status: `ok`, or `degraded` while the relay link is down.
    pub status: String,
    /// Server version.
    pub version: String,
    /// Tenant this service answers for.
    pub tenant_id: String,
    /// Whether the relay link is up.
    pub relay_connected: bool,
    /// Checks waiting for an outcome.
    pub pending: usize,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
}

/// Health check handler.
pub async fn health_handler(Extension(authz): Extension<Arc<GateAuthz>>) -> Json<HealthStatus> {
    let uptime = START_TIME
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0);
    let relay_connected = authz.relay_connected();

    Json(HealthStatus {
        status: if relay_connected { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        tenant_id: authz.tenant_id().to_string(),
        relay_connected,
        pending: authz.correlator().pending_count(),
        uptime_seconds: uptime,
    })
}

/// Onboarding link response.
#[derive(Debug, Clone, Serialize)]
pub struct OnboardingResponse {
    /// Full device link, key fragment included.
    pub url: String,
}

/// Onboarding link handler.
pub async fn onboarding_handler(Extension(authz): Extension<Arc<GateAuthz>>) -> Json<OnboardingResponse> {
    Json(OnboardingResponse {
        url: authz.onboarding_url().to_string(),
    })
}

/// Prometheus metrics handler.
pub async fn metrics_handler(Extension(authz): Extension<Arc<GateAuthz>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        render(&authz),
    )
}

/// Render check counters in Prometheus text format.
pub fn render(authz: &GateAuthz) -> String {
    let correlator = authz.correlator();
    let m = correlator.metrics();
    let mut out = String::new();

    let gauges = [
        ("gate_authz_pending_checks", "Checks waiting for an outcome", correlator.pending_count() as u64),
        ("gate_authz_queue_length", "Checks waiting in the outbound queue", correlator.queue().len() as u64),
        ("gate_authz_relay_connected", "Whether the relay link is up", authz.relay_connected() as u64),
    ];
    for (name, help, value) in gauges {
        let _ = writeln!(out, "# HELP {name} {help}\n# TYPE {name} gauge\n{name} {value}");
    }

    let _ = writeln!(
        out,
        "# HELP gate_authz_checks_total Checks submitted\n# TYPE gate_authz_checks_total counter\ngate_authz_checks_total {}",
        m.submitted.load(Ordering::Relaxed)
    );

    let _ = writeln!(
        out,
        "# HELP gate_authz_verdicts_total Finished checks by outcome\n# TYPE gate_authz_verdicts_total counter"
    );
    let outcomes = [
        ("approved", &m.approved),
        ("denied", &m.denied),
        ("timeout", &m.timed_out),
        ("cancelled", &m.cancelled),
        ("backpressure", &m.backpressure),
        ("relay_unavailable", &m.relay_failures),
    ];
    for (outcome, counter) in outcomes {
        let _ = writeln!(
            out,
            "gate_authz_verdicts_total{{outcome=\"{outcome}\"}} {}",
            counter.load(Ordering::Relaxed)
        );
    }

    let counters = [
        ("gate_authz_late_decisions_total", "Decisions for unknown or finished checks", &m.late_decisions),
        ("gate_authz_anomalies_total", "Outcomes discarded because the slot was already used", &m.anomalies),
    ];
    for (name, help, counter) in counters {
        let _ = writeln!(
            out,
            "# HELP {name} {help}\n# TYPE {name} counter\n{name} {}",
            counter.load(Ordering::Relaxed)
        );
    }
    out
}
