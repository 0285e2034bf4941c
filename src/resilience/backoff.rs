//! Backoff schedules for the retry layer.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// How the wait between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// Same delay before every retry.
    #[default]
    Constant,
    /// Delay doubles on every retry.
    Exponential,
    /// Exponential, plus up to 10% random jitter.
    ExponentialJitter,
}

/// Calculate the delay before retry number `retry` (1-based).
///
/// The result depends only on the schedule, never on the error that caused
/// the retry. Growing kinds are capped at `max`.
pub fn calculate_backoff(kind: BackoffKind, retry: u32, base: Duration, max: Duration) -> Duration {
    if retry == 0 {
        return Duration::ZERO;
    }

    match kind {
        BackoffKind::Constant => base,
        BackoffKind::Exponential => exponential(retry, base, max),
        BackoffKind::ExponentialJitter => {
            let capped = exponential(retry, base, max);

            // Apply jitter (0 to 10% of the delay)
            let jitter_range = capped.as_millis() as u64 / 10;
            let jitter = if jitter_range > 0 {
                rand::thread_rng().gen_range(0..jitter_range)
            } else {
                0
            };

            (capped + Duration::from_millis(jitter)).min(max)
        }
    }
}

fn exponential(retry: u32, base: Duration, max: Duration) -> Duration {
    let factor = 2u32.saturating_pow(retry - 1);
    base.saturating_mul(factor).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_millis(100);
    const MAX: Duration = Duration::from_millis(1000);

    #[test]
    fn test_constant_ignores_attempt() {
        assert_eq!(calculate_backoff(BackoffKind::Constant, 1, BASE, MAX), BASE);
        assert_eq!(calculate_backoff(BackoffKind::Constant, 7, BASE, MAX), BASE);
    }

    #[test]
    fn test_exponential_doubles_and_caps() {
        let b1 = calculate_backoff(BackoffKind::Exponential, 1, BASE, MAX);
        assert_eq!(b1, Duration::from_millis(100));

        let b3 = calculate_backoff(BackoffKind::Exponential, 3, BASE, MAX);
        assert_eq!(b3, Duration::from_millis(400));

        let capped = calculate_backoff(BackoffKind::Exponential, 40, BASE, MAX);
        assert_eq!(capped, MAX);
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        for _ in 0..50 {
            let d = calculate_backoff(BackoffKind::ExponentialJitter, 2, BASE, MAX);
            assert!(d >= Duration::from_millis(200));
            assert!(d < Duration::from_millis(220));
        }
    }

    #[test]
    fn test_zeroth_retry_has_no_delay() {
        assert_eq!(calculate_backoff(BackoffKind::Exponential, 0, BASE, MAX), Duration::ZERO);
    }
}
