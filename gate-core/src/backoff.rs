//! Reconnection backoff for the decision service's relay link.

use std::time::Duration;

/// Upper bound on the base delay, before jitter.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Calculate reconnection backoff with jitter.
///
/// Exponential with random jitter so a fleet of decision services does not
/// reconnect in lockstep after a relay restart.
///
/// Formula: min(30s, 2^attempt seconds) + random(0..1000ms)
pub fn reconnect_delay(attempt: u32) -> Duration {
    let base_secs = 2u64.pow(attempt.min(5)).min(MAX_BACKOFF.as_secs());
    Duration::from_secs(base_secs) + Duration::from_millis(random_jitter_ms())
}

/// Random jitter between 0 and 1000 milliseconds.
fn random_jitter_ms() -> u64 {
    let mut bytes = [0u8; 8];
    // No jitter if the OS RNG is unavailable.
    if getrandom::getrandom(&mut bytes).is_err() {
        return 0;
    }
    u64::from_le_bytes(bytes) % 1001
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_increases_with_attempt() {
        let first = reconnect_delay(0);
        let third = reconnect_delay(3);
        assert!(first < Duration::from_secs(3));
        assert!(third >= Duration::from_secs(8));
    }

    #[test]
    fn backoff_capped_at_30_seconds_plus_jitter() {
        for attempt in [5, 6, 10, u32::MAX] {
            let delay = reconnect_delay(attempt);
            assert!(delay >= Duration::from_secs(30));
            assert!(
                delay <= Duration::from_secs(31),
                "delay must be capped, got {:?}",
                delay
            );
        }
    }

    #[test]
    fn jitter_creates_variance() {
        let delays: Vec<_> = (0..20).map(|_| reconnect_delay(2)).collect();
        let min = delays.iter().min().unwrap();
        let max = delays.iter().max().unwrap();
        assert!(max > min, "expected jitter variance, got {:?}", min);
    }
}
