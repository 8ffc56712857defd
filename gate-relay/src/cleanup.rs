//! Background cleanup task for idle tenant sessions.
//!
//! Runs periodically to drop sessions that have had neither side attached
//! for `cleanup.idle_secs`, and to evict recharged rate limiter entries.

use crate::config::CleanupConfig;
use crate::server::GateRelay;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

/// Spawn a background cleanup task.
///
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_task(
    relay: Arc<GateRelay>,
    config: CleanupConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if !config.enabled {
            tracing::info!("Cleanup task disabled");
            return;
        }

        let idle = Duration::from_secs(config.idle_secs);
        tracing::info!(
            interval_secs = config.interval_secs,
            idle_secs = config.idle_secs,
            "Cleanup task started"
        );

        let mut timer = interval(Duration::from_secs(config.interval_secs.max(1)));

        loop {
            timer.tick().await;

            let reaped = relay.reap_idle(idle);
            relay.rate_limits().shrink();
            if reaped > 0 {
                tracing::info!(reaped, remaining = relay.total_tenants(), "Cleanup: reaped idle sessions");
            } else {
                tracing::debug!("Cleanup: no idle sessions");
            }
        }
    })
}
