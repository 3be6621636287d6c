use crate::types::{DEFAULT_MAX_RECONNECT_ATTEMPTS, RECONNECT_BASE_DELAY, RECONNECT_MAX_DELAY};
use std::time::Duration;

/// Reconnection backoff: `min(base * 2^attempt, max)` with a fixed attempt budget
#[derive(Debug, Clone)]
pub struct Timer {
    attempts: u32,
    max_attempts: u32,
    base_delay: u64,
    max_delay: u64,
}

impl Timer {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            max_attempts,
            base_delay: RECONNECT_BASE_DELAY,
            max_delay: RECONNECT_MAX_DELAY,
        }
    }

    /// Delay for a given zero-based attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        Duration::from_millis(self.base_delay.saturating_mul(factor).min(self.max_delay))
    }

    /// Get the next delay and count the attempt; `None` once the budget is spent
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }

        let delay = self.delay_for(self.attempts);
        self.attempts += 1;
        Some(delay)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Reset the timer
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECONNECT_ATTEMPTS)
    }
}
