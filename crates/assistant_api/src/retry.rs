use std::time::Duration;

/// Starting delay between stream polls.
pub const INITIAL_POLL_BACKOFF: Duration = Duration::from_millis(1000);
/// Ceiling for the rate-limit backoff.
pub const MAX_POLL_BACKOFF: Duration = Duration::from_millis(5000);

/// Adaptive poll delay that doubles on every rate-limit signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitBackoff {
    current: Duration,
    max: Duration,
}

impl Default for RateLimitBackoff {
    fn default() -> Self {
        Self::new(INITIAL_POLL_BACKOFF, MAX_POLL_BACKOFF)
    }
}

impl RateLimitBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            current: initial.min(max),
            max,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn is_saturated(&self) -> bool {
        self.current >= self.max
    }

    /// Double the delay, capped at `max`, and return the new value.
    pub fn escalate(&mut self) -> Duration {
        let doubled = self.current.saturating_mul(2);
        // A zero delay would never grow by doubling.
        let next = if doubled.is_zero() {
            Duration::from_millis(1)
        } else {
            doubled
        };
        self.current = next.min(self.max);
        self.current
    }
}

/// Compute `initial * multiplier^attempt`, capped at `cap`.
pub fn exponential_delay(attempt: u32, initial: Duration, multiplier: f64, cap: Duration) -> Duration {
    let exponent = attempt.min(30) as i32;
    let factor = multiplier.max(1.0).powi(exponent);
    let millis = initial.as_millis() as f64 * factor;
    if !millis.is_finite() || millis >= cap.as_millis() as f64 {
        return cap;
    }
    Duration::from_millis(millis.round() as u64)
}
