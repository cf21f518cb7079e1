use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Millisecond time source used to stamp commits.
///
/// Production code uses [`SystemClock`]; tests inject a [`ManualClock`] so
/// commit ordering (and therefore merge winners) is deterministic.
pub trait Clock: Send + Sync {
    /// Milliseconds since the UNIX epoch.
    fn now_ms(&self) -> i64;
}

/// Wall-clock time source.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }
}

/// Manually advanced time source for tests and simulations.
///
/// Every `now_ms` call returns a strictly larger value than the last, so two
/// consecutive commits never tie on timestamp.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<i64>,
}

impl ManualClock {
    /// Create a clock starting at `start_ms`.
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: Mutex::new(start_ms),
        }
    }

    /// Move the clock forward by `delta_ms`.
    pub fn advance(&self, delta_ms: i64) {
        *self.now.lock().expect("lock poisoned") += delta_ms;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(1_000)
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        let mut now = self.now.lock().expect("lock poisoned");
        *now += 1;
        *now
    }
}
