//! Jittered delay between retry attempts.

use std::time::Duration;

use rand::Rng;

use crate::config::schema::UpstreamConfig;

/// Delay before retry `attempt` (1-based). Doubles per attempt from the
/// configured base, capped at the maximum, with up to 10% jitter.
pub fn retry_delay(config: &UpstreamConfig, attempt: u32) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponent = 2u64.saturating_pow(attempt - 1);
    let delay_ms = config
        .retry_base_delay_ms
        .saturating_mul(exponent)
        .min(config.retry_max_delay_ms);

    let jitter_range = delay_ms / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(delay_ms + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base: u64, max: u64) -> UpstreamConfig {
        UpstreamConfig {
            timeout_secs: 30,
            retry_base_delay_ms: base,
            retry_max_delay_ms: max,
        }
    }

    #[test]
    fn test_grows_and_caps() {
        let cfg = config(100, 500);
        let d1 = retry_delay(&cfg, 1);
        assert!(d1.as_millis() >= 100 && d1.as_millis() < 120);

        let d2 = retry_delay(&cfg, 2);
        assert!(d2.as_millis() >= 200 && d2.as_millis() < 230);

        let d5 = retry_delay(&cfg, 5);
        // 100 * 16 capped at 500 (+ jitter).
        assert!(d5.as_millis() >= 500 && d5.as_millis() < 560);
    }

    #[test]
    fn test_zero_attempt_is_immediate() {
        assert_eq!(retry_delay(&config(100, 500), 0), Duration::ZERO);
    }
}
