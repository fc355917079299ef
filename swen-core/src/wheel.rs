//! ## swen-core::wheel
//! **Cascading 16-bucket timer wheel**
//!
//! A hardware tick advances the cursor one bucket per call and expires every
//! timer filed under the new current bucket. A delay beyond the wheel span
//! wraps the wheel once and carries the remainder in the timer's `ticks`
//! field; each visit decrements it and re-files the timer until it reaches
//! zero, at which point the callback is due.
//!
//! Timers are registered once and armed/disarmed many times; the wheel never
//! allocates or frees them. Expired callbacks are returned to the caller and
//! run in task context, never from the tick source itself.

use tracing::trace;

/// Number of wheel buckets; one cursor step per hardware tick.
pub const WHEEL_BUCKETS: usize = 16;

/// Timer callback: `(context, opaque argument)`.
pub type TimerFn<C> = fn(&mut C, usize);

/// Handle to a registered timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerId(usize);

/// Capability controlling the hardware tick source. The wheel stops it when
/// the last timer unlinks and restarts it on the next arm.
pub trait TickSource: Send {
    fn start(&mut self);
    fn stop(&mut self);
}

/// Tick source for hosts that drive `tick()` themselves (tests, simulation).
pub struct ManualTickSource;

impl TickSource for ManualTickSource {
    fn start(&mut self) {}
    fn stop(&mut self) {}
}

struct TimerSlot<C> {
    cb: TimerFn<C>,
    arg: usize,
    bucket: Option<usize>,
    ticks: u32,
}

/// A due timer callback, handed back to the owning reactor by `tick()`.
#[derive(Debug, Clone, Copy)]
pub struct Expired<C> {
    pub cb: TimerFn<C>,
    pub arg: usize,
}

pub struct TimerWheel<C> {
    timers: Vec<TimerSlot<C>>,
    buckets: [Vec<TimerId>; WHEEL_BUCKETS],
    cursor: usize,
    armed: usize,
    source: Box<dyn TickSource>,
}

impl<C> TimerWheel<C> {
    pub fn new(source: Box<dyn TickSource>) -> Self {
        Self {
            timers: Vec::new(),
            buckets: std::array::from_fn(|_| Vec::new()),
            cursor: 0,
            armed: 0,
            source,
        }
    }

    /// Registers a timer with its callback and opaque argument. The timer
    /// starts unarmed.
    pub fn register(&mut self, cb: TimerFn<C>, arg: usize) -> TimerId {
        self.timers.push(TimerSlot {
            cb,
            arg,
            bucket: None,
            ticks: 0,
        });
        TimerId(self.timers.len() - 1)
    }

    /// Arms a timer to expire after `delay` ticks.
    ///
    /// Arming an already-armed timer is a programming error (fatal in debug
    /// builds); use `rearm` to move a possibly-pending timer.
    pub fn arm(&mut self, id: TimerId, delay: u32) {
        debug_assert!(
            self.timers[id.0].bucket.is_none(),
            "timer armed while already pending"
        );
        if self.timers[id.0].bucket.is_some() {
            return;
        }

        if self.armed == 0 {
            self.source.start();
        }

        let delay = delay.max(1);
        let bucket = (self.cursor + delay as usize % WHEEL_BUCKETS) % WHEEL_BUCKETS;
        let slot = &mut self.timers[id.0];
        slot.ticks = (delay - 1) / WHEEL_BUCKETS as u32;
        slot.bucket = Some(bucket);
        self.buckets[bucket].push(id);
        self.armed += 1;
        trace!(timer = id.0, delay, bucket, "timer armed");
    }

    /// Unlinks a timer if pending. Always safe to call on a stopped timer.
    pub fn disarm(&mut self, id: TimerId) {
        let Some(bucket) = self.timers[id.0].bucket.take() else {
            return;
        };
        self.buckets[bucket].retain(|t| *t != id);
        self.armed -= 1;
        if self.armed == 0 {
            self.source.stop();
        }
    }

    /// Moves a timer (pending or not) to expire after `delay` ticks.
    pub fn rearm(&mut self, id: TimerId, delay: u32) {
        self.disarm(id);
        self.arm(id, delay);
    }

    /// True if the timer is currently filed in a bucket.
    #[inline]
    pub fn is_armed(&self, id: TimerId) -> bool {
        self.timers[id.0].bucket.is_some()
    }

    /// Number of currently armed timers.
    #[inline]
    pub fn armed(&self) -> usize {
        self.armed
    }

    /// Advances the cursor one bucket and returns the timers that came due.
    ///
    /// The caller runs the returned callbacks in task context; a callback may
    /// re-arm its own timer.
    pub fn tick(&mut self) -> Vec<Expired<C>> {
        self.cursor = (self.cursor + 1) % WHEEL_BUCKETS;
        let mut due = Vec::new();
        let entries = std::mem::take(&mut self.buckets[self.cursor]);
        for id in entries {
            let slot = &mut self.timers[id.0];
            if slot.ticks > 0 {
                // Cascade: not this wheel revolution.
                slot.ticks -= 1;
                self.buckets[self.cursor].push(id);
            } else {
                slot.bucket = None;
                self.armed -= 1;
                due.push(Expired {
                    cb: slot.cb,
                    arg: slot.arg,
                });
            }
        }
        if self.armed == 0 && !due.is_empty() {
            self.source.stop();
        }
        due
    }
}
