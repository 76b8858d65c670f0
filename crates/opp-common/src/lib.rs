//! OPP Common - Shared types for the Open Packet Processor
//!
//! This crate provides the small set of primitives every other OPP crate
//! builds on:
//! - Flow keys and minimal header extraction
//! - Monotonic nanosecond clocks
//! - Lock-free counters for statistics
//! - Error handling

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod flow;

pub use error::*;
pub use flow::*;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

/// Source of monotonic nanosecond readings for the packet path.
///
/// Only differences between readings carry meaning; there is no wall-clock
/// or time-zone semantics anywhere in the classifier.
pub trait Clock: Send + Sync {
    /// Current reading in nanoseconds
    fn now_ns(&self) -> u64;
}

/// Monotonic clock shared by every classifier in the process.
///
/// All instances read from one origin, fixed on first use, so windows
/// written by one classifier stay comparable for any classifier that later
/// attaches to the same pinned stores.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

static PROCESS_ORIGIN: OnceLock<Instant> = OnceLock::new();

impl MonotonicClock {
    /// Create a handle on the process clock
    pub fn new() -> Self {
        PROCESS_ORIGIN.get_or_init(Instant::now);
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline(always)]
    fn now_ns(&self) -> u64 {
        // u64 nanoseconds cover ~584 years of process uptime
        PROCESS_ORIGIN
            .get_or_init(Instant::now)
            .elapsed()
            .as_nanos() as u64
    }
}

/// Manually driven clock for tests and offline simulation
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    /// Create a clock reading `start_ns`
    pub const fn new(start_ns: u64) -> Self {
        Self(AtomicU64::new(start_ns))
    }

    /// Jump to an absolute reading
    pub fn set(&self, now_ns: u64) {
        self.0.store(now_ns, Ordering::Release);
    }

    /// Move forward by `delta_ns` and return the new reading
    pub fn advance(&self, delta_ns: u64) -> u64 {
        self.0.fetch_add(delta_ns, Ordering::AcqRel) + delta_ns
    }
}

impl Clock for ManualClock {
    #[inline(always)]
    fn now_ns(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }
}

/// High-performance counter for lock-free metrics
#[derive(Debug, Default)]
pub struct AtomicCounter(AtomicU64);

impl AtomicCounter {
    /// Create new counter
    pub const fn new(value: u64) -> Self {
        Self(AtomicU64::new(value))
    }

    /// Increment and return previous value
    #[inline(always)]
    pub fn inc(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    /// Get current value
    #[inline(always)]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_never_goes_back() {
        let clock = MonotonicClock::new();
        let t1 = clock.now_ns();
        std::thread::sleep(std::time::Duration::from_micros(100));
        let t2 = clock.now_ns();

        assert!(t2 >= t1 + 100_000);
    }

    #[test]
    fn test_monotonic_clocks_share_origin() {
        let first = MonotonicClock::new();
        std::thread::sleep(std::time::Duration::from_millis(20));
        let before = first.now_ns();
        let second = MonotonicClock::new();

        // a later handle continues the same time base instead of restarting at zero
        assert!(second.now_ns() >= before);
        assert!(second.now_ns() >= 20_000_000);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(5);
        assert_eq!(clock.now_ns(), 5);
        assert_eq!(clock.advance(10), 15);
        clock.set(1_000);
        assert_eq!(clock.now_ns(), 1_000);
    }

    #[test]
    fn test_atomic_counter() {
        let counter = AtomicCounter::new(0);
        assert_eq!(counter.inc(), 0);
        assert_eq!(counter.inc(), 1);
        assert_eq!(counter.get(), 2);
    }
}
