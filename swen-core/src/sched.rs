//! ## swen-core::sched
//! **Dual-ring cooperative scheduler**
//!
//! Defers work out of interrupt handlers into a single-threaded run loop.
//! Two fixed-capacity rings hold `{callback, argument}` tasks: one fed from
//! interrupt context through a cloneable [`IrqHandle`], one fed from task
//! context. The run loop drains the interrupt ring first; when its occupancy
//! passes the high-water mark the interrupt source is masked until the ring
//! drains, so a fast interrupt source cannot starve the task-context queue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::error::CoreError;
use crate::ring::SpscRing;

/// An ephemeral unit of deferred work. Copied into a ring when scheduled; it
/// has no identity after that point.
#[derive(Debug, Clone, Copy)]
pub struct Task<C> {
    pub run: fn(&mut C, usize),
    pub arg: usize,
}

impl<C> Task<C> {
    #[inline]
    pub fn new(run: fn(&mut C, usize), arg: usize) -> Self {
        Self { run, arg }
    }
}

/// Policy applied when a task ring is full. The original call sites were
/// split between aborting and dropping, so the choice is configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Log, count and drop the task.
    #[default]
    Drop,
    /// Treat a full ring as a hard resource cap and panic.
    Abort,
}

/// Capability for masking and unmasking the interrupt source feeding the
/// irq-context ring. Resolved once at construction.
pub trait IrqGate: Send + Sync {
    fn mask(&self);
    fn unmask(&self);
}

/// Gate for hosts without a maskable interrupt source.
pub struct NullGate;

impl IrqGate for NullGate {
    fn mask(&self) {}
    fn unmask(&self) {}
}

/// Producer handle for interrupt context. `Send`; pushing is the only
/// operation interrupt handlers may perform on the scheduler.
pub struct IrqHandle<C> {
    ring: SpscRing<Task<C>>,
    policy: OverflowPolicy,
    dropped: Arc<AtomicU64>,
}

impl<C> Clone for IrqHandle<C> {
    fn clone(&self) -> Self {
        Self {
            ring: self.ring.share(),
            policy: self.policy,
            dropped: Arc::clone(&self.dropped),
        }
    }
}

impl<C> IrqHandle<C> {
    /// Schedules a task from interrupt context.
    pub fn schedule(&self, task: Task<C>) -> Result<(), CoreError> {
        match self.ring.try_push(task) {
            Ok(()) => Ok(()),
            Err(_) => match self.policy {
                OverflowPolicy::Drop => {
                    let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(dropped, "irq task ring full, dropping task");
                    Err(CoreError::RingFull)
                }
                OverflowPolicy::Abort => panic!("irq task ring full"),
            },
        }
    }
}

pub struct Scheduler<C> {
    irq: SpscRing<Task<C>>,
    task: SpscRing<Task<C>>,
    gate: Arc<dyn IrqGate>,
    high_water: usize,
    masked: bool,
    policy: OverflowPolicy,
    /// Shared with every [`IrqHandle`] so interrupt-side drops count too.
    dropped: Arc<AtomicU64>,
}

impl<C> Scheduler<C> {
    /// Creates a scheduler with rings of the given capacities (powers of
    /// two). `high_water` is the irq-ring occupancy at which the interrupt
    /// source is masked.
    pub fn new(
        irq_capacity: usize,
        task_capacity: usize,
        high_water: usize,
        policy: OverflowPolicy,
        gate: Arc<dyn IrqGate>,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            irq: SpscRing::with_capacity(irq_capacity)?,
            task: SpscRing::with_capacity(task_capacity)?,
            gate,
            high_water,
            masked: false,
            policy,
            dropped: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Returns the interrupt-context producer handle.
    pub fn irq_handle(&self) -> IrqHandle<C> {
        IrqHandle {
            ring: self.irq.share(),
            policy: self.policy,
            dropped: Arc::clone(&self.dropped),
        }
    }

    /// Schedules a task from task context.
    pub fn schedule(&mut self, task: Task<C>) -> Result<(), CoreError> {
        match self.task.try_push(task) {
            Ok(()) => Ok(()),
            Err(_) => match self.policy {
                OverflowPolicy::Drop => {
                    let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(dropped, "task ring full, dropping task");
                    Err(CoreError::RingFull)
                }
                OverflowPolicy::Abort => panic!("task ring full"),
            },
        }
    }

    /// Pops the next task to run: interrupt-origin tasks drain ahead of
    /// task-origin tasks. Applies the admission-control mask when the irq
    /// ring backs up.
    pub fn next(&mut self) -> Option<Task<C>> {
        if !self.masked && self.irq.len() >= self.high_water {
            self.gate.mask();
            self.masked = true;
        }
        if let Some(task) = self.irq.try_pop() {
            if self.masked && self.irq.is_empty() {
                self.gate.unmask();
                self.masked = false;
            }
            return Some(task);
        }
        self.task.try_pop()
    }

    /// True when both rings are empty and the run loop may sleep.
    pub fn idle(&self) -> bool {
        self.irq.is_empty() && self.task.is_empty()
    }

    /// Tasks dropped so far under `OverflowPolicy::Drop`, on both rings.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct Ctx {
        order: Vec<usize>,
    }

    fn record(ctx: &mut Ctx, arg: usize) {
        ctx.order.push(arg);
    }

    fn drain(sched: &mut Scheduler<Ctx>, ctx: &mut Ctx) {
        while let Some(task) = sched.next() {
            (task.run)(ctx, task.arg);
        }
    }

    fn scheduler(policy: OverflowPolicy) -> Scheduler<Ctx> {
        Scheduler::new(8, 8, 6, policy, Arc::new(NullGate)).unwrap()
    }

    #[test]
    fn irq_tasks_drain_first() {
        let mut sched = scheduler(OverflowPolicy::Drop);
        let irq = sched.irq_handle();
        sched.schedule(Task::new(record, 10)).unwrap();
        irq.schedule(Task::new(record, 1)).unwrap();
        irq.schedule(Task::new(record, 2)).unwrap();
        sched.schedule(Task::new(record, 11)).unwrap();

        let mut ctx = Ctx::default();
        drain(&mut sched, &mut ctx);
        assert_eq!(ctx.order, vec![1, 2, 10, 11]);
        assert!(sched.idle());
    }

    #[test]
    fn full_ring_drops_under_drop_policy() {
        let mut sched = scheduler(OverflowPolicy::Drop);
        for i in 0..7 {
            sched.schedule(Task::new(record, i)).unwrap();
        }
        assert_eq!(
            sched.schedule(Task::new(record, 99)),
            Err(CoreError::RingFull)
        );
        assert_eq!(sched.dropped(), 1);
    }

    #[test]
    fn irq_drops_are_counted() {
        let sched = scheduler(OverflowPolicy::Drop);
        let irq = sched.irq_handle();
        for i in 0..7 {
            irq.schedule(Task::new(record, i)).unwrap();
        }
        assert_eq!(
            irq.schedule(Task::new(record, 99)),
            Err(CoreError::RingFull)
        );
        assert_eq!(sched.dropped(), 1);
    }

    #[test]
    #[should_panic(expected = "task ring full")]
    fn full_ring_aborts_under_abort_policy() {
        let mut sched = scheduler(OverflowPolicy::Abort);
        for i in 0..8 {
            let _ = sched.schedule(Task::new(record, i));
        }
    }

    #[test]
    fn high_water_masks_irq_source_until_drained() {
        struct Gate {
            masked: AtomicBool,
        }
        impl IrqGate for Gate {
            fn mask(&self) {
                self.masked.store(true, Ordering::SeqCst);
            }
            fn unmask(&self) {
                self.masked.store(false, Ordering::SeqCst);
            }
        }

        let gate = Arc::new(Gate {
            masked: AtomicBool::new(false),
        });
        let mut sched: Scheduler<Ctx> =
            Scheduler::new(8, 8, 3, OverflowPolicy::Drop, gate.clone()).unwrap();
        let irq = sched.irq_handle();
        for i in 0..5 {
            irq.schedule(Task::new(record, i)).unwrap();
        }

        let mut ctx = Ctx::default();
        let task = sched.next().unwrap();
        (task.run)(&mut ctx, task.arg);
        assert!(gate.masked.load(Ordering::SeqCst));

        drain(&mut sched, &mut ctx);
        assert!(!gate.masked.load(Ordering::SeqCst));
        assert_eq!(ctx.order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn irq_handle_is_send() {
        let mut sched = scheduler(OverflowPolicy::Drop);
        let irq = sched.irq_handle();
        std::thread::spawn(move || {
            irq.schedule(Task::new(record, 42)).unwrap();
        })
        .join()
        .unwrap();

        let mut ctx = Ctx::default();
        drain(&mut sched, &mut ctx);
        assert_eq!(ctx.order, vec![42]);
    }
}
