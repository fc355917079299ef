//! # swen-l3
//!
//! SWEN association layer: reliable, optionally XTEA-encrypted logical
//! connections between two radio node addresses, driven by a single-threaded
//! reactor.
//!
//! An association is bound once per peer and then cycled through a
//! three-way handshake (`AssocSyn`, `AssocSynAck`, `AssocComplete`), a
//! connected phase exchanging acknowledged `Data` frames, and a symmetric
//! `Disassoc` teardown. Every non-one-shot frame stays on a retransmission
//! list until acked; the retry timer resends it byte-identically and gives
//! up, with an error event, after a configurable budget.
//!
//! The application talks to [`node::Node`] and hears back through readiness
//! events (read, write, error, hangup) on the endpoint registered at bind
//! time.

pub mod assoc;
pub mod error;
pub mod node;
pub mod proto;
pub mod xtea;

pub use assoc::{AssocState, Association, TxEntry, ACK_WINDOW};
pub use error::L3Error;
pub use node::{Node, NodeConfig};
pub use proto::{L3Hdr, Op, ProtoError};
pub use xtea::Xtea;
