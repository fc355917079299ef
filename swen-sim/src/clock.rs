//! Virtual time for deterministic simulation.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use swen_core::wheel::TickSource;

#[derive(Default)]
struct ClockInner {
    ticks: AtomicU64,
    running: AtomicBool,
}

/// Simulated tick counter shared between a test and the nodes it drives.
///
/// The clock hands each node a [`TickSource`] so tests can observe when the
/// timer wheel starts and stops its hardware timer; advancing simulated time
/// is the test's job (via `Node::advance_ticks`), mirrored here for
/// bookkeeping.
#[derive(Clone, Default)]
pub struct VirtualClock {
    inner: Arc<ClockInner>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tick source to hand to a node under test.
    pub fn source(&self) -> Box<dyn TickSource> {
        Box::new(ClockSource {
            inner: self.inner.clone(),
        })
    }

    pub fn advance(&self, n: u64) {
        self.inner.ticks.fetch_add(n, Ordering::Relaxed);
    }

    pub fn ticks(&self) -> u64 {
        self.inner.ticks.load(Ordering::Relaxed)
    }

    /// True while the timer wheel has at least one armed timer.
    pub fn timer_running(&self) -> bool {
        self.inner.running.load(Ordering::Relaxed)
    }
}

struct ClockSource {
    inner: Arc<ClockInner>,
}

impl TickSource for ClockSource {
    fn start(&mut self) {
        self.inner.running.store(true, Ordering::Relaxed);
    }

    fn stop(&mut self) {
        self.inner.running.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_reports_timer_state() {
        let clock = VirtualClock::new();
        let mut source = clock.source();
        assert!(!clock.timer_running());
        source.start();
        assert!(clock.timer_running());
        source.stop();
        assert!(!clock.timer_running());
    }

    #[test]
    fn advance_accumulates() {
        let clock = VirtualClock::new();
        clock.advance(8);
        clock.advance(3);
        assert_eq!(clock.ticks(), 11);
    }
}
