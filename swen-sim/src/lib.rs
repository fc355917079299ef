//! # swen-sim
//!
//! Deterministic simulation for the SWEN stack: a loopback radio medium
//! with pluggable per-direction loss models, virtual clocks, and a two-node
//! harness that builds fully wired nodes straight from a `SwenConfig`.
//!
//! Everything here is seeded; a failing scenario replays byte-for-byte.

pub mod clock;
pub mod harness;
pub mod loopback;
pub mod loss;

pub use clock::VirtualClock;
pub use harness::{node_config, NodePair};
pub use loopback::{LoopbackLink, LoopbackRadio, TraceEntry};
pub use loss::{DropAll, DropNth, LossModel, NoLoss, RandomLoss};
