//! Wall-clock time sources
//!
//! The scheduler never reads `Instant` directly. It goes through a
//! [`TimeSource`] so that the whole control loop can run against a virtual
//! clock in tests and in the simulator.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Monotonic wall clock with the ability to suspend the caller
pub trait TimeSource: Send + Sync {
    /// Seconds since an arbitrary fixed origin
    fn now(&self) -> f64;

    /// Suspend the caller for `seconds`
    fn sleep(&self, seconds: f64);

    /// One iteration of a busy-wait
    fn spin(&self) {
        std::hint::spin_loop();
    }
}

/// Real time backed by `Instant` and `thread::sleep`
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn sleep(&self, seconds: f64) {
        if seconds > 0.0 {
            thread::sleep(Duration::from_secs_f64(seconds));
        }
    }
}

/// Measures wall time elapsed between successive calls.
///
/// Every call to [`RelativeClock::relative_time`] re-arms the reference, so a
/// caller that wants to exclude an interval (a pause) simply calls
/// [`RelativeClock::rearm`] when the interval ends.
pub struct RelativeClock {
    source: Arc<dyn TimeSource>,
    last: f64,
}

impl RelativeClock {
    pub fn new(source: Arc<dyn TimeSource>) -> Self {
        let last = source.now();
        Self { source, last }
    }

    /// Seconds elapsed since the previous call
    pub fn relative_time(&mut self) -> f64 {
        let now = self.source.now();
        let elapsed = now - self.last;
        self.last = now;
        elapsed
    }

    /// Drop the time elapsed since the previous call
    pub fn rearm(&mut self) {
        self.last = self.source.now();
    }

    /// Absolute time of the underlying source
    pub fn now(&self) -> f64 {
        self.source.now()
    }

    pub fn sleep(&self, seconds: f64) {
        self.source.sleep(seconds);
    }

    pub fn spin(&self) {
        self.source.spin();
    }
}
