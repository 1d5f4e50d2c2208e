use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Cooperative per-query deadline.
///
/// The pipeline checks the deadline between stages and between external
/// calls; once expired, remaining stages short-circuit to empty results.
/// Nothing is forcibly interrupted, so in-flight store calls finish on
/// their own.
#[derive(Debug)]
pub struct Deadline {
    expires_at: Instant,
    expired: AtomicBool,
}

impl Deadline {
    pub fn new(timeout: Duration) -> Self {
        Self {
            expires_at: Instant::now() + timeout,
            expired: AtomicBool::new(false),
        }
    }

    pub fn from_millis(timeout_ms: u64) -> Self {
        Self::new(Duration::from_millis(timeout_ms.max(1)))
    }

    /// True once the deadline has passed. Latches: after the first expired
    /// observation every later check is expired too.
    pub fn expired(&self) -> bool {
        if self.expired.load(Ordering::Relaxed) {
            return true;
        }
        if Instant::now() >= self.expires_at {
            self.expired.store(true, Ordering::Relaxed);
            return true;
        }
        false
    }

    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}
