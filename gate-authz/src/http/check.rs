//! Envoy HTTP ext_authz check endpoint.
//!
//! Envoy forwards the method, path and headers of the request it is
//! deciding on. The handler turns them into a [`CheckRequest`], waits for
//! the verdict, and answers `200` to let the request through or a denial
//! status with `{"error": "<reason>"}` to block it. If the proxy gives up
//! first, the dropped handler future withdraws the check.

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use zerok_gate_types::{CheckRequest, Verdict};

use crate::server::GateAuthz;

/// Header set on allowed checks.
pub const RESULT_HEADER: &str = "x-authz-result";

/// Check handler (router fallback).
pub async fn check_handler(
    Extension(authz): Extension<Arc<GateAuthz>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let source_ip = source_ip(&headers, peer.map(|ConnectInfo(addr)| addr));
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    let check = CheckRequest::new(method.as_str(), path, header_map(&headers), source_ip);

    match authz.correlator().submit(check).await {
        Verdict::Approved => (
            StatusCode::OK,
            [(RESULT_HEADER, HeaderValue::from_static("approved"))],
        )
            .into_response(),
        Verdict::Denied(reason) => {
            let status = StatusCode::from_u16(reason.http_status()).unwrap_or(StatusCode::FORBIDDEN);
            (status, Json(serde_json::json!({ "error": reason.as_str() }))).into_response()
        }
    }
}

/// Address of the downstream client: the first `x-forwarded-for` hop, then
/// `x-envoy-external-address`, then the TCP peer.
fn source_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let external = headers
        .get("x-envoy-external-address")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded
        .or(external)
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_default()
}

/// Flatten headers; repeated headers are joined with `", "`.
fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        map.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    map
}
