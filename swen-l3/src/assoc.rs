//! ## swen-l3::assoc
//! **Association state and retransmission bookkeeping**
//!
//! An association is bound once and lives across many connect/disconnect
//! cycles. Its retransmission list carries explicit `{packet, retries, seq}`
//! entries instead of smuggling control metadata into spare buffer bytes,
//! and its receive queue holds delivered-but-unconsumed pool packets.

use std::collections::VecDeque;

use swen_core::events::EventId;
use swen_core::pool::PktId;
use swen_core::wheel::TimerId;

/// Acknowledgment sliding-window tolerance: an ack retires a sequence id
/// when `(ack - seq) mod 256 < ACK_WINDOW`.
pub const ACK_WINDOW: u8 = 3;

#[inline]
pub fn in_ack_window(ack: u8, seq: u8) -> bool {
    ack.wrapping_sub(seq) < ACK_WINDOW
}

/// Association protocol state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssocState {
    Closed,
    Connecting,
    ConnComplete,
    Connected,
    Closing,
}

/// One unacknowledged outbound packet. The packet holds the fully framed
/// bytes, so a resend is byte-identical to the original transmission.
#[derive(Debug, Clone, Copy)]
pub struct TxEntry {
    pub pkt: PktId,
    pub seq: u8,
    pub retries: u8,
}

/// An SWEN-L3 logical connection to one peer address.
pub struct Association {
    pub peer: u8,
    pub iface: usize,
    pub state: AssocState,
    /// Last sequence id consumed locally.
    pub seq_id: u8,
    /// Last peer sequence id we have acknowledged (valid once `synced`).
    pub peer_seq: u8,
    pub synced: bool,
    pub retrans: Vec<TxEntry>,
    pub rxq: VecDeque<PktId>,
    pub event: EventId,
    pub timer: TimerId,
    /// A deferred-ack task is queued; further data acks coalesce into it.
    pub ack_pending: bool,
}

impl Association {
    pub fn new(peer: u8, iface: usize, event: EventId, timer: TimerId) -> Self {
        Self {
            peer,
            iface,
            state: AssocState::Closed,
            seq_id: 0,
            peer_seq: 0,
            synced: false,
            retrans: Vec::new(),
            rxq: VecDeque::new(),
            event,
            timer,
            ack_pending: false,
        }
    }

    /// Claims the next local sequence id.
    #[inline]
    pub fn next_seq(&mut self) -> u8 {
        self.seq_id = self.seq_id.wrapping_add(1);
        self.seq_id
    }

    /// Removes acknowledged entries, returning their packets for release.
    pub fn retire_acked(&mut self, ack: u8) -> Vec<PktId> {
        let mut retired = Vec::new();
        self.retrans.retain(|entry| {
            if in_ack_window(ack, entry.seq) {
                retired.push(entry.pkt);
                false
            } else {
                true
            }
        });
        retired
    }

    /// True if the peer sequence id was already acknowledged (a duplicate).
    #[inline]
    pub fn already_acked(&self, seq: u8) -> bool {
        self.synced && in_ack_window(self.peer_seq, seq)
    }
}
