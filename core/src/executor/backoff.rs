use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::rngs::OsRng;
use rand::RngCore;

use super::types::{BackoffKind, RetryPolicy};

/// Upper bound of the random jitter, as a fraction of the exponential delay.
const JITTER_FRACTION: f64 = 0.10;

/// Wait before retrying after `attempt` (1-based) failed, clamped to
/// `policy.max_delay`.
pub fn compute_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let attempt = attempt.max(1);
    let base = policy.base_delay;

    let delay = match policy.backoff {
        BackoffKind::Fixed => base,
        BackoffKind::Linear => base.saturating_mul(attempt),
        BackoffKind::Exponential => exponential(base, attempt),
        BackoffKind::ExponentialJitter => {
            let exp = exponential(base, attempt);
            exp.saturating_add(exp.mul_f64(JITTER_FRACTION * unit_random()))
        }
    };

    delay.min(policy.max_delay)
}

fn exponential(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

/// Uniform value in `[0, 1)` from the OS RNG, falling back to the clock's
/// sub-second nanos when the OS source fails.
fn unit_random() -> f64 {
    let mut buf = [0u8; 8];
    let bits = match OsRng.try_fill_bytes(&mut buf) {
        Ok(()) => u64::from_le_bytes(buf),
        Err(e) => {
            tracing::debug!(error = %e, "os rng unavailable, using clock for jitter");
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| u64::from(d.subsec_nanos()).wrapping_mul(0x9E37_79B9_7F4A_7C15))
                .unwrap_or_default()
        }
    };
    (bits >> 11) as f64 / (1u64 << 53) as f64
}
