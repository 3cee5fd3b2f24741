//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Delay to wait after failed attempt `attempt` (0-based).
///
/// `min(base * exponential_base^attempt, max)`, scaled by a uniform factor in
/// `[0.5, 1.0]` when `jitter` is set.
pub fn calculate_backoff(
    attempt: u32,
    base: Duration,
    max: Duration,
    exponential_base: f64,
    jitter: bool,
) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let raw_nanos = base.as_nanos() as f64 * exponential_base.powi(exponent);
    let max_nanos = max.as_nanos() as f64;

    let capped = if raw_nanos.is_finite() {
        raw_nanos.min(max_nanos).max(0.0)
    } else {
        max_nanos
    };

    let scaled = if jitter {
        capped * rand::thread_rng().gen_range(0.5..=1.0)
    } else {
        capped
    };

    Duration::from_nanos(scaled.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        let base = Duration::from_millis(100);
        let max = Duration::from_millis(1000);

        assert_eq!(calculate_backoff(0, base, max, 2.0, false), Duration::from_millis(100));
        assert_eq!(calculate_backoff(1, base, max, 2.0, false), Duration::from_millis(200));
        assert_eq!(calculate_backoff(2, base, max, 2.0, false), Duration::from_millis(400));
        assert_eq!(calculate_backoff(4, base, max, 2.0, false), max);
        assert_eq!(calculate_backoff(5000, base, max, 2.0, false), max);
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(5);

        for _ in 0..200 {
            let delay = calculate_backoff(1, base, max, 2.0, true);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(200));
        }
    }

    #[test]
    fn test_flat_base() {
        let delay = calculate_backoff(3, Duration::from_millis(50), Duration::from_secs(1), 1.0, false);
        assert_eq!(delay, Duration::from_millis(50));
    }
}
