//! Exponential backoff for the swap helper's retry loop.

use crate::constants::{SWAP_MAX_BACKOFF_MS, SWAP_STARTING_BACKOFF_MS};
use std::time::Duration;

/// Delay before retry number `attempt` (0-based).
///
/// 100ms, 200ms, 400ms... capped at 2s.
#[must_use]
pub fn backoff_delay(attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(SWAP_STARTING_BACKOFF_MS.saturating_mul(factor).min(SWAP_MAX_BACKOFF_MS))
}

/// Sleep for [`backoff_delay`] and return the next attempt number.
pub async fn exponential_backoff_with_delay(attempt: u32) -> u32 {
    tokio::time::sleep(backoff_delay(attempt)).await;
    attempt.saturating_add(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_then_caps() {
        assert_eq!(backoff_delay(0), Duration::from_millis(100));
        assert_eq!(backoff_delay(1), Duration::from_millis(200));
        assert_eq!(backoff_delay(4), Duration::from_millis(1600));
        assert_eq!(backoff_delay(5), Duration::from_millis(2000));
        assert_eq!(backoff_delay(63), Duration::from_millis(2000));
        assert_eq!(backoff_delay(200), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_backoff_increments_attempt() {
        assert_eq!(exponential_backoff_with_delay(0).await, 1);
    }
}
