//! Reconnect policy with jittered exponential back-off.

use std::time::Duration;

use ra_domain::config::ReconnectConfig;

/// Controls how the supervisor reconnects after the brain link drops.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    /// Initial delay before the first reconnect attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (cap).
    pub max_delay: Duration,
    /// Multiplier applied after each failed attempt.
    pub backoff_factor: f64,
    /// Consecutive failures before giving up. `0` means unlimited.
    pub max_attempts: u32,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}

impl From<&ReconnectConfig> for ReconnectBackoff {
    fn from(cfg: &ReconnectConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(cfg.initial_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
            backoff_factor: cfg.backoff_factor,
            max_attempts: cfg.max_attempts,
        }
    }
}

impl ReconnectBackoff {
    /// Compute the delay for the given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let delay_ms = base_ms * self.backoff_factor.powi(attempt.min(64) as i32);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        // ~25% jitter spreads adapters restarting together.
        let jitter = capped_ms * 0.25 * pseudo_random_fraction(attempt);
        Duration::from_millis((capped_ms + jitter) as u64)
    }

    pub fn should_give_up(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }
}

/// Deterministic fraction in [0, 1) from the attempt number.
fn pseudo_random_fraction(attempt: u32) -> f64 {
    let hash = attempt.wrapping_mul(2654435761);
    (hash as f64) / (u32::MAX as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_config_defaults() {
        let p = ReconnectBackoff::default();
        assert_eq!(p.initial_delay, Duration::from_secs(1));
        assert_eq!(p.max_delay, Duration::from_secs(60));
        assert_eq!(p.max_attempts, 0);
    }

    #[test]
    fn delay_grows_then_caps() {
        let p = ReconnectBackoff {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
            max_attempts: 0,
        };
        assert!(p.delay_for_attempt(1) > p.delay_for_attempt(0));
        assert!(p.delay_for_attempt(3) > p.delay_for_attempt(2));
        // Cap plus at most 25% jitter.
        assert!(p.delay_for_attempt(30) <= Duration::from_millis(2_500));
    }

    #[test]
    fn huge_attempt_counts_do_not_overflow() {
        let p = ReconnectBackoff::default();
        assert!(p.delay_for_attempt(u32::MAX) <= Duration::from_millis(75_000));
    }

    #[test]
    fn limited_policy_gives_up() {
        let p = ReconnectBackoff {
            max_attempts: 3,
            ..Default::default()
        };
        assert!(!p.should_give_up(2));
        assert!(p.should_give_up(3));
        assert!(!ReconnectBackoff::default().should_give_up(1_000_000));
    }

    #[test]
    fn built_from_config_section() {
        let cfg = ReconnectConfig {
            initial_delay_ms: 250,
            max_delay_ms: 4_000,
            backoff_factor: 1.5,
            max_attempts: 7,
        };
        let p = ReconnectBackoff::from(&cfg);
        assert_eq!(p.initial_delay, Duration::from_millis(250));
        assert_eq!(p.max_delay, Duration::from_secs(4));
        assert_eq!(p.max_attempts, 7);
    }
}
