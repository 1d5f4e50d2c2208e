use codegraph_core::error::StoreError;
use std::sync::Mutex;
use std::time::Instant;

/// Token-bucket rate limiter for model calls.
///
/// Tokens refill continuously at `refill_per_sec` up to `capacity`. Callers
/// that cannot acquire a token get a `StoreError::External` they are expected
/// to treat as a degraded (empty) result rather than a failure.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(requests_per_second: f64, burst_size: u32) -> Self {
        let capacity = f64::from(burst_size.max(1));
        Self {
            capacity,
            refill_per_sec: requests_per_second.max(0.0),
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token if available. Never blocks.
    pub fn try_acquire(&self) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn acquire(&self) -> Result<(), StoreError> {
        if self.try_acquire() {
            Ok(())
        } else {
            Err(StoreError::external("rate_limited"))
        }
    }
}
