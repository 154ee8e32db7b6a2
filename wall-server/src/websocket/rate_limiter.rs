use std::time::Instant;

/// Per-connection token bucket for inbound messages. Capacity absorbs a
/// short burst; sustained traffic is capped at `refill_per_second`.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    tokens: f64,
    capacity: f64,
    refill_per_second: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_limits(20.0, 5.0)
    }

    pub fn with_limits(capacity: f64, refill_per_second: f64) -> Self {
        Self {
            tokens: capacity,
            capacity,
            refill_per_second,
            last_refill: Instant::now(),
        }
    }

    /// Take one token if available.
    pub fn check_rate_limit(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_second).min(self.capacity);
        self.last_refill = now;
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_burst_then_limit() {
        let mut limiter = RateLimiter::with_limits(3.0, 1.0);

        assert!(limiter.check_rate_limit());
        assert!(limiter.check_rate_limit());
        assert!(limiter.check_rate_limit());
        assert!(!limiter.check_rate_limit());
    }

    #[test]
    fn test_tokens_refill_over_time() {
        let mut limiter = RateLimiter::with_limits(1.0, 100.0);

        assert!(limiter.check_rate_limit());
        assert!(!limiter.check_rate_limit());

        std::thread::sleep(Duration::from_millis(50));
        assert!(limiter.check_rate_limit());
    }
}
