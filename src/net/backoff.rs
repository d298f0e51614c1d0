//! Reconnect delay schedule: exponential, capped, with jitter.

#[cfg(test)]
#[path = "backoff_test.rs"]
mod backoff_test;

use std::time::Duration;

use rand::Rng;

use crate::config::ReconnectPolicy;

#[derive(Clone, Debug)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Un-jittered delay for the current attempt.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        let factor = 1_u32.checked_shl(self.attempt.min(16)).unwrap_or(u32::MAX);
        self.policy
            .initial
            .checked_mul(factor)
            .unwrap_or(self.policy.max)
            .min(self.policy.max)
    }

    /// Delay before the next attempt; advances the schedule.
    ///
    /// With jitter `j`, the result is drawn uniformly from
    /// `[base * (1 - j), base]`, so the cap is never exceeded.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.base_delay();
        self.attempt = self.attempt.saturating_add(1);

        let jitter = self.policy.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 || base.is_zero() {
            return base;
        }
        let spread = rand::rng().random_range(0.0..=jitter);
        base.mul_f64(1.0 - spread)
    }

    /// Back to the initial delay after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
