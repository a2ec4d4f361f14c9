//! Exponential backoff for transport errors and redelivery pacing

use std::time::Duration;

use rand::Rng;

/// Exponential backoff configuration
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Initial delay in milliseconds
    pub initial_delay_ms: u64,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u64,
    /// Multiplier for exponential growth
    pub multiplier: f64,
    /// Jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 100,
            max_delay_ms: 30_000, // 30 seconds
            multiplier: 2.0,
            jitter_factor: 0.1, // 10% jitter
        }
    }
}

/// Exponential backoff calculator with jitter
pub struct ExponentialBackoff {
    config: BackoffConfig,
    current_delay_ms: f64,
    attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(config: BackoffConfig) -> Self {
        let initial = config.initial_delay_ms as f64;
        Self {
            config,
            current_delay_ms: initial,
            attempt: 0,
        }
    }

    /// Delay before the next attempt. The first call returns the initial delay.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt += 1;

        let base = self.current_delay_ms.min(self.config.max_delay_ms as f64);
        self.current_delay_ms =
            (base * self.config.multiplier).min(self.config.max_delay_ms as f64);

        let delay = if self.config.jitter_factor > 0.0 {
            let jitter_range = base * self.config.jitter_factor;
            base + rand::rng().random_range(-jitter_range..=jitter_range)
        } else {
            base
        };

        Duration::from_millis(delay.max(1.0) as u64)
    }

    /// Reset the backoff to initial state
    pub fn reset(&mut self) {
        self.current_delay_ms = self.config.initial_delay_ms as f64;
        self.attempt = 0;
    }

    /// Get the current attempt number
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn without_jitter(initial_delay_ms: u64, max_delay_ms: u64) -> ExponentialBackoff {
        ExponentialBackoff::new(BackoffConfig {
            initial_delay_ms,
            max_delay_ms,
            multiplier: 2.0,
            jitter_factor: 0.0,
        })
    }

    #[test]
    fn test_backoff_doubles() {
        let mut backoff = without_jitter(100, 10_000);

        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(400));
        assert_eq!(backoff.attempt(), 3);
    }

    #[test]
    fn test_backoff_caps_at_max() {
        let mut backoff = without_jitter(1000, 5000);

        for _ in 0..10 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Duration::from_millis(5000));
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = without_jitter(100, 10_000);
        backoff.next_delay();
        backoff.next_delay();

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let mut backoff = ExponentialBackoff::default();

        let delay = backoff.next_delay().as_millis();
        assert!((90..=110).contains(&delay), "delay {}", delay);
    }
}
