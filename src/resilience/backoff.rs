//! Exponential backoff with jitter.
//!
//! Used for database connect retries at startup and reconnects after
//! the pool goes unhealthy. Jitter keeps a restarted database from
//! being hit by every waiter at once.

use std::time::Duration;

use rand::Rng;

/// Delay before the given attempt (1-based). Attempt 0 returns zero
/// so callers can loop uniformly.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential = 2u64.saturating_pow(attempt - 1);
    let capped = base_ms.saturating_mul(exponential).min(max_ms);

    // 0-10% jitter on top of the capped delay
    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_exponentially_until_capped() {
        assert_eq!(calculate_backoff(0, 100, 2000), Duration::from_millis(0));

        let first = calculate_backoff(1, 100, 2000);
        assert!(first.as_millis() >= 100 && first.as_millis() < 120);

        let third = calculate_backoff(3, 100, 2000);
        assert!(third.as_millis() >= 400 && third.as_millis() < 450);

        // Deep attempts stay at the cap plus jitter, no overflow.
        let deep = calculate_backoff(60, 100, 2000);
        assert!(deep.as_millis() >= 2000 && deep.as_millis() < 2250);
    }
}
