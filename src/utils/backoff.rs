use std::time::Duration;

/// Delay before retry number `attempt` (1-based): `base_ms * 2^attempt`.
#[inline]
pub fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    Duration::from_millis(base_ms.saturating_mul(2_u64.saturating_pow(attempt)))
}
