//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::SyncSettings;

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: f64,
    attempt: u32,
}

impl Backoff {
    #[must_use]
    pub fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            base,
            max: max.max(base),
            jitter: jitter.clamp(0.0, 1.0),
            attempt: 0,
        }
    }

    #[must_use]
    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self::new(
            settings.backoff_base,
            settings.backoff_max,
            settings.backoff_jitter,
        )
    }

    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay for the current attempt, then advance.
    pub fn next_delay(&mut self) -> Duration {
        let exp = self.attempt.min(16);
        self.attempt = self.attempt.saturating_add(1);

        let raw = self.base.saturating_mul(1u32 << exp).min(self.max);
        if self.jitter == 0.0 || raw.is_zero() {
            return raw;
        }
        let factor = 1.0 + rand::rng().random_range(-self.jitter..=self.jitter);
        raw.mul_f64(factor).min(self.max)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
