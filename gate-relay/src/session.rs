//! Per-tenant session pairing and frame forwarding.
//!
//! A [`TenantSession`] holds at most one decision-service link and at most
//! one device link. Each attached link gets a forwarding task that moves its
//! inbound frames to whatever link currently holds the opposite slot.
//!
//! ```text
//!  service socket ─► [fwd task S] ─► device slot ─► device socket
//!  device socket  ─► [fwd task D] ─► service slot ─► service socket
//! ```
//!
//! The session lock only guards slot swaps and sender clones; frames are
//! sent after it is released. A forwarding task is bound to the connection
//! it was started for and never re-reads its own slot, so a task outliving
//! its connection cannot steal a replacement's traffic.

use crate::server::RelayMetrics;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::Instant;
use zerok_gate_types::TenantId;

/// One relayed message. The relay never looks inside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Binary WebSocket message.
    Binary(Vec<u8>),
    /// Text WebSocket message.
    Text(String),
}

impl Frame {
    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Frame::Binary(data) => data.len(),
            Frame::Text(text) => text.len(),
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Which end of a tenant's route a link belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The decision service (`/ws/server/:tenant_id`).
    Service,
    /// The remote device (`/ws/client/:tenant_id`).
    Device,
}

impl Side {
    /// The side frames from this side are delivered to.
    pub fn opposite(self) -> Self {
        match self {
            Side::Service => Side::Device,
            Side::Device => Side::Service,
        }
    }

    /// Label for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Service => "service",
            Side::Device => "device",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The relay's half of an attached connection.
///
/// Created together with a [`ConnectionEnd`] by [`Connection::pair`]; the
/// socket pumps own the end, the session owns this half.
#[derive(Debug)]
pub struct Connection {
    inbound: mpsc::Receiver<Frame>,
    outbound: mpsc::Sender<Frame>,
    shutdown: watch::Sender<bool>,
}

/// The socket's half of an attached connection.
///
/// Frames sent on `to_relay` are forwarded to the opposite side; frames for
/// this socket arrive on `from_relay`. `closed` flips to `true` (or its
/// sender is dropped) once the relay has let go of the connection, either
/// because it was replaced or because its forwarding task ended.
#[derive(Debug)]
pub struct ConnectionEnd {
    /// Frames read from the socket.
    pub to_relay: mpsc::Sender<Frame>,
    /// Frames to write to the socket.
    pub from_relay: mpsc::Receiver<Frame>,
    /// Relay-side close signal.
    pub closed: watch::Receiver<bool>,
}

impl Connection {
    /// Create a connected pair with `buffer` frames of slack each way.
    pub fn pair(buffer: usize) -> (Connection, ConnectionEnd) {
        let (to_relay, inbound) = mpsc::channel(buffer.max(1));
        let (outbound, from_relay) = mpsc::channel(buffer.max(1));
        let (shutdown, closed) = watch::channel(false);
        (
            Connection {
                inbound,
                outbound,
                shutdown,
            },
            ConnectionEnd {
                to_relay,
                from_relay,
                closed,
            },
        )
    }
}

impl ConnectionEnd {
    /// Hand a frame read from the socket to the relay.
    pub async fn send(&self, frame: Frame) -> Result<(), Frame> {
        self.to_relay.send(frame).await.map_err(|e| e.0)
    }

    /// Next frame to write to the socket, or `None` once the relay closed
    /// this connection.
    pub async fn recv(&mut self) -> Option<Frame> {
        tokio::select! {
            biased;
            frame = self.from_relay.recv() => frame,
            _ = wait_closed(&mut self.closed) => None,
        }
    }

    /// Whether the relay has closed this connection.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow() || self.closed.has_changed().is_err()
    }
}

/// Resolve once the relay closes a connection.
pub async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    // An Err means the sender is gone, which is a close as well.
    let _ = closed.wait_for(|closed| *closed).await;
}

/// A link installed in a session slot.
#[derive(Debug)]
struct PeerLink {
    id: u64,
    outbound: mpsc::Sender<Frame>,
    shutdown: watch::Sender<bool>,
}

impl PeerLink {
    fn close(&self) {
        self.shutdown.send_replace(true);
    }
}

#[derive(Debug)]
struct Slots {
    service: Option<PeerLink>,
    device: Option<PeerLink>,
    /// Last attach or detach.
    changed_at: Instant,
}

impl Slots {
    fn get(&self, side: Side) -> &Option<PeerLink> {
        match side {
            Side::Service => &self.service,
            Side::Device => &self.device,
        }
    }

    fn get_mut(&mut self, side: Side) -> &mut Option<PeerLink> {
        match side {
            Side::Service => &mut self.service,
            Side::Device => &mut self.device,
        }
    }
}

/// Pairing state for one tenant.
#[derive(Debug)]
pub struct TenantSession {
    tenant_id: TenantId,
    slots: RwLock<Slots>,
    metrics: Arc<RelayMetrics>,
}

impl TenantSession {
    /// Create an empty session.
    pub fn new(tenant_id: TenantId, metrics: Arc<RelayMetrics>) -> Self {
        Self {
            tenant_id,
            slots: RwLock::new(Slots {
                service: None,
                device: None,
                changed_at: Instant::now(),
            }),
            metrics,
        }
    }

    /// The tenant this session routes for.
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Install `conn` as the `side` link and start forwarding its frames.
    ///
    /// Any link already in that slot is closed before the new one is
    /// installed, under the same exclusive lock. Returns `true` if a link
    /// was replaced.
    pub async fn attach(self: &Arc<Self>, side: Side, id: u64, conn: Connection) -> bool {
        let Connection {
            inbound,
            outbound,
            shutdown,
        } = conn;
        let closed = shutdown.subscribe();

        let replaced = {
            let mut slots = self.slots.write().await;
            let previous = slots.get_mut(side).replace(PeerLink {
                id,
                outbound,
                shutdown,
            });
            slots.changed_at = Instant::now();
            match previous {
                Some(old) => {
                    old.close();
                    tracing::info!(
                        tenant_id = %self.tenant_id,
                        side = %side,
                        old = old.id,
                        new = id,
                        "replaced link"
                    );
                    true
                }
                None => false,
            }
        };

        tokio::spawn(forward(Arc::clone(self), side, id, inbound, closed));
        replaced
    }

    /// Which sides are attached, as `(service, device)`.
    pub async fn attached(&self) -> (bool, bool) {
        let slots = self.slots.read().await;
        (slots.service.is_some(), slots.device.is_some())
    }

    /// Like [`TenantSession::attached`], but gives up if the lock is busy.
    pub fn try_attached(&self) -> Option<(bool, bool)> {
        self.slots
            .try_read()
            .ok()
            .map(|slots| (slots.service.is_some(), slots.device.is_some()))
    }

    /// Connection id currently holding `side`.
    pub async fn link_id(&self, side: Side) -> Option<u64> {
        self.slots.read().await.get(side).as_ref().map(|link| link.id)
    }

    /// Whether the session has been empty for at least `idle`.
    ///
    /// Non-blocking: a session whose lock is busy is not idle.
    pub fn is_idle(&self, idle: std::time::Duration) -> bool {
        match self.slots.try_read() {
            Ok(slots) => {
                slots.service.is_none()
                    && slots.device.is_none()
                    && slots.changed_at.elapsed() >= idle
            }
            Err(_) => false,
        }
    }

    /// Deliver a frame to `to`, dropping it if that side is absent.
    ///
    /// A send blocked on a full link gives up as soon as that link is
    /// closed, so a stalled peer that gets replaced releases the forwarder.
    async fn deliver(&self, to: Side, frame: Frame) {
        let target = {
            let slots = self.slots.read().await;
            slots
                .get(to)
                .as_ref()
                .map(|link| (link.outbound.clone(), link.shutdown.subscribe()))
        };

        let len = frame.len() as u64;
        let delivered = match target {
            Some((sender, mut closed)) => tokio::select! {
                biased;
                _ = wait_closed(&mut closed) => false,
                sent = sender.send(frame) => sent.is_ok(),
            },
            None => false,
        };

        if delivered {
            self.metrics.frames_forwarded.fetch_add(1, Ordering::Relaxed);
            self.metrics.bytes_forwarded.fetch_add(len, Ordering::Relaxed);
        } else {
            self.metrics.frames_dropped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(tenant_id = %self.tenant_id, to = %to, bytes = len, "peer absent or closed, frame dropped");
        }
    }

    /// Clear `side` if it still holds connection `id`, then close it.
    async fn detach(&self, side: Side, id: u64) {
        let mut slots = self.slots.write().await;
        let slot = slots.get_mut(side);
        if slot.as_ref().is_some_and(|link| link.id == id) {
            if let Some(link) = slot.take() {
                link.close();
            }
            slots.changed_at = Instant::now();
            tracing::info!(tenant_id = %self.tenant_id, side = %side, id, "link detached");
        }
    }
}

/// Forward frames from one connection until it closes or is superseded.
async fn forward(
    session: Arc<TenantSession>,
    side: Side,
    id: u64,
    mut inbound: mpsc::Receiver<Frame>,
    mut closed: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = wait_closed(&mut closed) => break,
            frame = inbound.recv() => match frame {
                Some(frame) => tokio::select! {
                    biased;
                    _ = wait_closed(&mut closed) => break,
                    () = session.deliver(side.opposite(), frame) => {}
                },
                None => break,
            },
        }
    }
    session.detach(side, id).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn session() -> (Arc<TenantSession>, Arc<RelayMetrics>) {
        let metrics = Arc::new(RelayMetrics::default());
        let session = Arc::new(TenantSession::new(
            TenantId::from_key(&[7u8; 32]),
            Arc::clone(&metrics),
        ));
        (session, metrics)
    }

    async fn attach(session: &Arc<TenantSession>, side: Side, id: u64) -> ConnectionEnd {
        let (conn, end) = Connection::pair(8);
        session.attach(side, id, conn).await;
        end
    }

    async fn recv(end: &mut ConnectionEnd) -> Option<Frame> {
        tokio::time::timeout(Duration::from_secs(1), end.recv())
            .await
            .expect("timed out waiting for frame")
    }

    async fn eventually<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..200 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    // ===========================================
    // Forwarding Tests
    // ===========================================

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let (session, metrics) = session();
        let mut service = attach(&session, Side::Service, 1).await;
        let mut device = attach(&session, Side::Device, 2).await;

        service.send(Frame::Binary(vec![1, 2, 3])).await.unwrap();
        assert_eq!(recv(&mut device).await, Some(Frame::Binary(vec![1, 2, 3])));

        device.send(Frame::Text("{\"x\":1}".into())).await.unwrap();
        assert_eq!(recv(&mut service).await, Some(Frame::Text("{\"x\":1}".into())));

        assert_eq!(metrics.frames_forwarded.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.bytes_forwarded.load(Ordering::Relaxed), 10);
    }

    #[tokio::test]
    async fn order_is_preserved_per_direction() {
        let (session, _) = session();
        let service = attach(&session, Side::Service, 1).await;
        let mut device = attach(&session, Side::Device, 2).await;

        for i in 0..20u8 {
            service.send(Frame::Binary(vec![i])).await.unwrap();
        }
        for i in 0..20u8 {
            assert_eq!(recv(&mut device).await, Some(Frame::Binary(vec![i])));
        }
    }

    #[tokio::test]
    async fn frames_without_peer_are_dropped_not_buffered() {
        let (session, metrics) = session();
        let service = attach(&session, Side::Service, 1).await;

        service.send(Frame::Binary(b"early".to_vec())).await.unwrap();
        eventually(|| async { metrics.frames_dropped.load(Ordering::Relaxed) == 1 }).await;

        let mut device = attach(&session, Side::Device, 2).await;
        service.send(Frame::Binary(b"late".to_vec())).await.unwrap();

        // Only the frame sent after pairing arrives
        assert_eq!(recv(&mut device).await, Some(Frame::Binary(b"late".to_vec())));
    }

    // ===========================================
    // Replacement Tests
    // ===========================================

    #[tokio::test]
    async fn new_device_closes_previous_and_takes_traffic() {
        let (session, _) = session();
        let service = attach(&session, Side::Service, 1).await;
        let mut old_device = attach(&session, Side::Device, 2).await;

        let mut new_device = attach(&session, Side::Device, 3).await;

        assert_eq!(recv(&mut old_device).await, None);
        assert!(old_device.is_closed());

        service.send(Frame::Binary(b"to new".to_vec())).await.unwrap();
        assert_eq!(recv(&mut new_device).await, Some(Frame::Binary(b"to new".to_vec())));
        assert_eq!(session.link_id(Side::Device).await, Some(3));
    }

    #[tokio::test]
    async fn superseded_task_does_not_clear_replacement() {
        let (session, _) = session();
        let mut old_service = attach(&session, Side::Service, 1).await;
        let service = attach(&session, Side::Service, 2).await;
        let mut device = attach(&session, Side::Device, 3).await;

        // Old forwarding task has exited and run its detach by now
        assert_eq!(recv(&mut old_service).await, None);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(session.link_id(Side::Service).await, Some(2));
        service.send(Frame::Binary(vec![9])).await.unwrap();
        assert_eq!(recv(&mut device).await, Some(Frame::Binary(vec![9])));
    }

    #[tokio::test]
    async fn old_device_cannot_inject_after_replacement() {
        let (session, _) = session();
        let mut service = attach(&session, Side::Service, 1).await;
        let old_device = attach(&session, Side::Device, 2).await;
        let new_device = attach(&session, Side::Device, 3).await;

        // The old link's forwarder is gone; its sends go nowhere
        let _ = old_device.send(Frame::Binary(b"stale".to_vec())).await;
        new_device.send(Frame::Binary(b"fresh".to_vec())).await.unwrap();

        assert_eq!(recv(&mut service).await, Some(Frame::Binary(b"fresh".to_vec())));
    }

    #[tokio::test]
    async fn stalled_device_does_not_block_its_replacement() {
        let (session, metrics) = session();
        let service = attach(&session, Side::Service, 1).await;

        // One frame of slack and nobody reading it
        let (conn, stalled) = Connection::pair(1);
        session.attach(Side::Device, 2, conn).await;

        service.send(Frame::Binary(vec![1])).await.unwrap();
        service.send(Frame::Binary(vec![2])).await.unwrap();
        // Second frame is parked in the forwarder, waiting for buffer space
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut new_device = attach(&session, Side::Device, 3).await;
        assert!(stalled.is_closed());

        service.send(Frame::Binary(vec![3])).await.unwrap();
        assert_eq!(recv(&mut new_device).await, Some(Frame::Binary(vec![3])));
        assert_eq!(metrics.frames_dropped.load(Ordering::Relaxed), 1);
    }

    // ===========================================
    // Detach Tests
    // ===========================================

    #[tokio::test]
    async fn socket_drop_clears_slot_and_closes() {
        let (session, _) = session();
        let service = attach(&session, Side::Service, 1).await;
        let ConnectionEnd {
            to_relay, closed, ..
        } = service;

        drop(to_relay);

        eventually(|| async { session.attached().await == (false, false) }).await;
        assert!(*closed.borrow() || closed.has_changed().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_only_after_both_sides_leave() {
        let (session, _) = session();
        let idle = Duration::from_secs(60);
        assert!(!session.is_idle(idle));

        let device = attach(&session, Side::Device, 1).await;
        tokio::time::advance(Duration::from_secs(120)).await;
        assert!(!session.is_idle(idle), "attached session is never idle");

        drop(device);
        eventually(|| async { session.attached().await == (false, false) }).await;
        assert!(!session.is_idle(idle));

        tokio::time::advance(idle).await;
        assert!(session.is_idle(idle));
    }

    #[test]
    fn sides_are_opposites() {
        assert_eq!(Side::Service.opposite(), Side::Device);
        assert_eq!(Side::Device.opposite(), Side::Service);
        assert_eq!(Side::Device.to_string(), "device");
    }
}
