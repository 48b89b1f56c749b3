//! Wall-clock sources for session timestamps.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Default clock backed by `SystemTime::now`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Deterministic clock for tests and the simulator.
///
/// Each call to `now_ms()` advances by a fixed 10ms so timestamps stay
/// strictly increasing without a real clock.
#[derive(Debug)]
pub struct StubClock {
    start_ms: u64,
    offset_ms: AtomicU64,
}

impl StubClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            start_ms,
            offset_ms: AtomicU64::new(0),
        }
    }
}

impl Default for StubClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Clock for StubClock {
    fn now_ms(&self) -> u64 {
        self.start_ms + self.offset_ms.fetch_add(10, Ordering::SeqCst)
    }
}
