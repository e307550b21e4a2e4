//! Interaction pacing.
//!
//! Two fixed pauses shape the run: a short one before clicking the challenge
//! widget, and a settle interval after every listing navigation while the
//! page content loads. An optional jitter spreads both around their base.

use std::time::Duration;

const CHALLENGE_CLICK_DELAY_MS: u64 = 300;
const SETTLE_INTERVAL_MS: u64 = 1_000;

/// Delays applied by the session establisher and the paginator.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionTiming {
    pub challenge_click_delay: Duration,
    pub settle_interval: Duration,
    /// Fraction of each delay used as a symmetric random spread; `0.0` keeps
    /// delays exact.
    pub variance_pct: f64,
}

impl Default for InteractionTiming {
    fn default() -> Self {
        Self {
            challenge_click_delay: Duration::from_millis(CHALLENGE_CLICK_DELAY_MS),
            settle_interval: Duration::from_millis(SETTLE_INTERVAL_MS),
            variance_pct: 0.0,
        }
    }
}

impl InteractionTiming {
    /// No pauses at all.
    pub fn immediate() -> Self {
        Self {
            challenge_click_delay: Duration::ZERO,
            settle_interval: Duration::ZERO,
            variance_pct: 0.0,
        }
    }

    pub fn with_variance(mut self, variance_pct: f64) -> Self {
        self.variance_pct = variance_pct.clamp(0.0, 1.0);
        self
    }

    pub fn challenge_click_delay(&self) -> Duration {
        self.spread(self.challenge_click_delay)
    }

    pub fn settle_interval(&self) -> Duration {
        self.spread(self.settle_interval)
    }

    fn spread(&self, base: Duration) -> Duration {
        if self.variance_pct <= 0.0 || base.is_zero() {
            return base;
        }
        let base_ms = base.as_millis() as f64;
        let variance = base_ms * self.variance_pct;
        let jitter = rand::random::<f64>() * variance - (variance / 2.0);
        Duration::from_millis((base_ms + jitter).max(0.0) as u64)
    }
}
