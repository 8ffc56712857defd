//! Keeps the decision service's relay link up.
//!
//! The supervisor owns the link's reader loop: it connects, feeds decisions
//! to the handler until the connection ends, then reconnects with backoff.
//! While the link is down the queue consumer's sends fail, so checks are
//! denied as relay-unavailable rather than left waiting.

use std::sync::Arc;
use zerok_gate_client::{DecisionHandler, RelayLink, Transport};
use zerok_gate_core::reconnect_delay;

/// Spawn the relay link supervisor.
///
/// With `reconnect` off the task ends the first time the link drops.
/// Returns a handle that can be used to abort the task.
pub fn spawn_relay_supervisor<T, H>(
    link: Arc<RelayLink<T>>,
    handler: Arc<H>,
    reconnect: bool,
) -> tokio::task::JoinHandle<()>
where
    T: Transport + 'static,
    H: DecisionHandler + ?Sized + 'static,
{
    tokio::spawn(async move {
        let mut attempt: u32 = 0;
        loop {
            let connected = link.is_connected() || match link.connect().await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(tenant_id = %link.tenant_id(), attempt, error = %e, "relay connect failed");
                    false
                }
            };

            if connected {
                attempt = 0;
                let reason = link.run_reader(handler.as_ref()).await;
                tracing::warn!(tenant_id = %link.tenant_id(), error = %reason, "relay link lost");
            }

            if !reconnect {
                tracing::info!("relay reconnect disabled, supervisor stopping");
                return;
            }

            let delay = reconnect_delay(attempt);
            attempt = attempt.saturating_add(1);
            tracing::debug!(delay_ms = delay.as_millis() as u64, attempt, "reconnecting to relay");
            tokio::time::sleep(delay).await;
        }
    })
}
