//! Prometheus metrics endpoint.

use crate::server::GateRelay;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Returns metrics in Prometheus text format.
/// Includes both gauges (current state) and counters (monotonic since startup).
pub async fn metrics_handler(Extension(relay): Extension<Arc<GateRelay>>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        render(&relay),
    )
}

fn render(relay: &GateRelay) -> String {
    let m = relay.metrics();

    // Gauges — current state
    let tenants = relay.total_tenants();
    let (links, paired) = relay.link_counts();
    let limiter_keys = relay.rate_limits().tracked_tenants();

    // Counters — monotonic since startup
    let conns_total = m.connections_total.load(Ordering::Relaxed);
    let replacements = m.replacements_total.load(Ordering::Relaxed);
    let frames = m.frames_forwarded.load(Ordering::Relaxed);
    let bytes = m.bytes_forwarded.load(Ordering::Relaxed);
    let dropped = m.frames_dropped.load(Ordering::Relaxed);
    let rate_limits = m.rate_limit_hits.load(Ordering::Relaxed);
    let rejected = m.rejected_total.load(Ordering::Relaxed);
    let reaped = m.sessions_reaped.load(Ordering::Relaxed);

    format!(
        r#"# HELP gate_relay_tenants_active Tenants with a session
# TYPE gate_relay_tenants_active gauge
gate_relay_tenants_active {tenants}

# HELP gate_relay_links_active Attached links across all tenants
# TYPE gate_relay_links_active gauge
gate_relay_links_active {links}

# HELP gate_relay_tenants_paired Tenants with both sides attached
# TYPE gate_relay_tenants_paired gauge
gate_relay_tenants_paired {paired}

# HELP gate_relay_rate_limiter_keys Tenants tracked by the connect limiter
# TYPE gate_relay_rate_limiter_keys gauge
gate_relay_rate_limiter_keys {limiter_keys}

# HELP gate_relay_info Server information
# TYPE gate_relay_info gauge
gate_relay_info{{version="{version}"}} 1

# HELP gate_relay_connections_total Total connections attached
# TYPE gate_relay_connections_total counter
gate_relay_connections_total {conns_total}

# HELP gate_relay_replacements_total Total links closed by a newer connection
# TYPE gate_relay_replacements_total counter
gate_relay_replacements_total {replacements}

# HELP gate_relay_frames_forwarded_total Total frames delivered to the opposite side
# TYPE gate_relay_frames_forwarded_total counter
gate_relay_frames_forwarded_total {frames}

# HELP gate_relay_bytes_forwarded_total Total ciphertext bytes delivered
# TYPE gate_relay_bytes_forwarded_total counter
gate_relay_bytes_forwarded_total {bytes}

# HELP gate_relay_frames_dropped_total Total frames dropped with no peer attached
# TYPE gate_relay_frames_dropped_total counter
gate_relay_frames_dropped_total {dropped}

# HELP gate_relay_rate_limit_hits_total Total rate limit rejections
# TYPE gate_relay_rate_limit_hits_total counter
gate_relay_rate_limit_hits_total {rate_limits}

# HELP gate_relay_rejected_total Total upgrade requests refused
# TYPE gate_relay_rejected_total counter
gate_relay_rejected_total {rejected}

# HELP gate_relay_sessions_reaped_total Total idle sessions removed
# TYPE gate_relay_sessions_reaped_total counter
gate_relay_sessions_reaped_total {reaped}
"#,
        version = env!("CARGO_PKG_VERSION"),
    )
}
