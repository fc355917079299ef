//! # swen-link
//!
//! SWEN datagram link layer: addressed, checksummed framing over a radio
//! driver, plus the non-volatile generic-command learn/replay log.
//!
//! The driver below hands the link fully-framed byte packets; the link
//! verifies addressing and checksum and dispatches by protocol number.
//! Frames too short to be SWEN at all are offered to the generic-command
//! matcher, so raw learned remote codes coexist with the protocol stack on
//! the same radio.

pub mod frame;
pub mod generic_cmd;
pub mod iface;

pub use frame::{FrameError, FrameHeader, ADDR_BROADCAST, HDR_LEN};
pub use generic_cmd::{CmdError, CommandLog, MemNvStore, NvStore};
pub use iface::{IfaceStats, Interface, LinkError, RadioDriver, RxProducer};

/// Protocol number carried by SWEN-L3 association frames.
pub const PROTO_L3: u8 = 0x01;
