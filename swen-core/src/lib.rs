//! # swen-core
//!
//! Runtime substrate for the SWEN radio stack: a miniature, single-threaded
//! reactor sized for targets with a few hundred bytes of spare RAM.
//!
//! ### Key submodules:
//! - `pool`: fixed packet arena with reference counting and window slides
//! - `ring`: lock-free SPSC ring queues shared with interrupt context
//! - `wheel`: cascading 16-bucket timer wheel with an on-demand tick source
//! - `sched`: dual-ring cooperative scheduler with irq admission control
//! - `events`: readiness dispatch with pool-exhaustion backpressure
//!
//! The only concurrency in the model is between an interrupt handler and the
//! run loop; interrupt handlers may only push into a ring, arm or cancel a
//! timer, or schedule a task. Everything else runs in task context and never
//! blocks.

pub mod error;
pub mod events;
pub mod pool;
pub mod ring;
pub mod sched;
pub mod wheel;

pub mod prelude {
    pub use crate::error::CoreError;
    pub use crate::events::{dispatch, EventId, Events, Ready};
    pub use crate::pool::{PacketPool, PktId};
    pub use crate::ring::SpscRing;
    pub use crate::sched::{IrqGate, IrqHandle, NullGate, OverflowPolicy, Scheduler, Task};
    pub use crate::wheel::{ManualTickSource, TickSource, TimerId, TimerWheel, WHEEL_BUCKETS};
}

pub use error::CoreError;
