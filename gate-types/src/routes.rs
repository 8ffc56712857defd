//! Relay route layout shared by the relay and its clients.

/// Upgrade path prefix for the decision-service side of a tenant.
pub const SERVICE_ROUTE: &str = "/ws/server";

/// Upgrade path prefix for the remote-device side of a tenant.
pub const DEVICE_ROUTE: &str = "/ws/client";
