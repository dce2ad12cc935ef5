// ABOUTME: Process-wide high-precision monotonic clock
// ABOUTME: Anchors a hardware tick count to a wall-clock Unix microsecond reading once at startup

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// A single process-wide monotonic time base, microsecond resolution.
///
/// Records an anchor pair `(tick0, unix_us0)` once, then derives
/// `now_us = unix_us0 + (ticks_now - tick0)`. `Instant` on every platform Rust
/// supports is already monotonic and sub-microsecond resolution, so a
/// platform lacking high-resolution counters degrades to reporting
/// reduced-resolution via `is_coarse()` rather than computing differently.
pub struct MonotonicClock {
    anchor_instant: Instant,
    anchor_unix_us: i64,
    coarse: AtomicBool,
}

impl MonotonicClock {
    fn new() -> Self {
        let anchor_instant = Instant::now();
        let anchor_unix_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as i64;

        // `Instant` resolution is platform-dependent; if it can't tell apart
        // two back-to-back reads we're on a coarse clock and jitter will be
        // higher than the microsecond contract implies.
        let a = Instant::now();
        let b = Instant::now();
        let coarse = a == b;

        Self {
            anchor_instant,
            anchor_unix_us,
            coarse: AtomicBool::new(coarse),
        }
    }

    /// Current time in microseconds since the Unix epoch, monotonic for the
    /// lifetime of the process (never goes backwards between two calls on
    /// this instance).
    pub fn now_us(&self) -> i64 {
        let elapsed = self.anchor_instant.elapsed();
        self.anchor_unix_us + elapsed.as_micros() as i64
    }

    /// True if the platform's monotonic counter could not be observed to
    /// advance between two adjacent reads at startup, i.e. resolution is
    /// worse than microsecond and callers should expect more jitter.
    pub fn is_coarse(&self) -> bool {
        self.coarse.load(Ordering::Relaxed)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: OnceLock<MonotonicClock> = OnceLock::new();

/// The process-wide monotonic clock instance, lazily initialized on first use.
pub fn global() -> &'static MonotonicClock {
    GLOBAL.get_or_init(MonotonicClock::new)
}

/// Convenience wrapper over `global().now_us()`.
pub fn now_us() -> i64 {
    global().now_us()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_us_is_monotonic_non_decreasing() {
        let clock = MonotonicClock::new();
        let mut last = clock.now_us();
        for _ in 0..1000 {
            let t = clock.now_us();
            assert!(t >= last, "clock went backwards: {} -> {}", last, t);
            last = t;
        }
    }

    #[test]
    fn now_us_tracks_wall_clock_roughly() {
        let clock = MonotonicClock::new();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let elapsed_us = clock.now_us() - clock.anchor_unix_us;
        assert!(elapsed_us >= 4_000, "expected at least 4ms elapsed, got {}us", elapsed_us);
    }

    #[test]
    fn global_returns_same_instance() {
        let a = global() as *const MonotonicClock;
        let b = global() as *const MonotonicClock;
        assert_eq!(a, b);
    }
}
