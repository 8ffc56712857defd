//! WebSocket endpoints for both sides of a tenant's route.
//!
//! Each upgraded socket is bridged to a [`ConnectionEnd`] by two pumps:
//! the reader moves socket messages to the relay, the writer moves relay
//! frames to the socket. Both stop once the relay closes the connection.

use crate::error::RelayError;
use crate::server::GateRelay;
use crate::session::{wait_closed, Connection, ConnectionEnd, Frame, Side};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::Path;
use axum::response::{IntoResponse, Response};
use axum::Extension;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use zerok_gate_types::TenantId;

/// How long a closing socket gets to flush its close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// `GET /ws/server/:tenant_id`
pub async fn service_handler(
    Path(tenant): Path<String>,
    Extension(relay): Extension<Arc<GateRelay>>,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    upgrade(tenant, Side::Service, relay, ws)
}

/// `GET /ws/client/:tenant_id`
pub async fn device_handler(
    Path(tenant): Path<String>,
    Extension(relay): Extension<Arc<GateRelay>>,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    upgrade(tenant, Side::Device, relay, ws)
}

fn upgrade(
    tenant: String,
    side: Side,
    relay: Arc<GateRelay>,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    match admit(&tenant, &relay, ws) {
        Ok((tenant_id, ws)) => {
            let max = relay.config().limits.max_frame_size;
            ws.max_message_size(max)
                .max_frame_size(max)
                .on_upgrade(move |socket| bridge(socket, tenant_id, side, relay))
        }
        Err(e) => {
            let counter = match e {
                RelayError::RateLimited(_) => &relay.metrics().rate_limit_hits,
                _ => &relay.metrics().rejected_total,
            };
            counter.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(side = %side, error = %e, "upgrade refused");
            e.into_response()
        }
    }
}

fn admit(
    tenant: &str,
    relay: &GateRelay,
    ws: Option<WebSocketUpgrade>,
) -> Result<(TenantId, WebSocketUpgrade), RelayError> {
    let tenant_id: TenantId = tenant
        .parse()
        .map_err(|_| RelayError::InvalidTenant(tenant.chars().take(32).collect()))?;
    relay.rate_limits().check_connect(&tenant_id)?;
    let ws = ws.ok_or(RelayError::UpgradeRequired)?;
    Ok((tenant_id, ws))
}

/// Attach an upgraded socket and pump it until either side lets go.
async fn bridge(socket: WebSocket, tenant_id: TenantId, side: Side, relay: Arc<GateRelay>) {
    let (conn, end) = Connection::pair(relay.config().limits.link_buffer);
    let id = relay.attach(&tenant_id, side, conn).await;
    tracing::info!(tenant_id = %tenant_id, side = %side, id, "socket attached");

    let ConnectionEnd {
        to_relay,
        mut from_relay,
        closed,
    } = end;
    let (mut sink, mut stream) = socket.split();

    let mut writer_closed = closed.clone();
    let writer = async move {
        loop {
            tokio::select! {
                biased;
                frame = from_relay.recv() => match frame {
                    Some(frame) => {
                        // A write stuck on a peer that stopped reading must
                        // not outlive the connection.
                        let sent = tokio::select! {
                            biased;
                            _ = wait_closed(&mut writer_closed) => false,
                            sent = sink.send(into_message(frame)) => sent.is_ok(),
                        };
                        if !sent {
                            break;
                        }
                    }
                    None => break,
                },
                _ = wait_closed(&mut writer_closed) => break,
            }
        }
        let goodbye = async {
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
        };
        if tokio::time::timeout(CLOSE_GRACE, goodbye).await.is_err() {
            tracing::debug!(tenant_id = %tenant_id, side = %side, id, "close handshake abandoned");
        }
    };

    let mut reader_closed = closed;
    let reader = async move {
        loop {
            tokio::select! {
                _ = wait_closed(&mut reader_closed) => break,
                message = stream.next() => {
                    let frame = match message {
                        Some(Ok(Message::Binary(data))) => Frame::Binary(data),
                        Some(Ok(Message::Text(text))) => Frame::Text(text),
                        Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(e)) => {
                            tracing::debug!(error = %e, "socket read failed");
                            break;
                        }
                    };
                    let forwarded = tokio::select! {
                        biased;
                        _ = wait_closed(&mut reader_closed) => false,
                        sent = to_relay.send(frame) => sent.is_ok(),
                    };
                    if !forwarded {
                        break;
                    }
                }
            }
        }
        // Dropping `to_relay` ends the forwarding task, which detaches.
    };

    tokio::join!(reader, writer);
    tracing::info!(tenant_id = %tenant_id, side = %side, id, "socket closed");
}

fn into_message(frame: Frame) -> Message {
    match frame {
        Frame::Binary(data) => Message::Binary(data),
        Frame::Text(text) => Message::Text(text),
    }
}
