//! ## swen-core::pool
//! **Fixed packet arena with reference counting**
//!
//! All packet buffers are preallocated at construction; everything above the
//! pool borrows and returns them by slot index. A packet carries a logical
//! window (`skip`, `len`) inside its backing buffer so protocol layers can
//! insert and strip headers by sliding the window instead of copying.
//!
//! Allocation failure is a normal condition (`None`); callers defer work and
//! retry when a buffer is reclaimed.

use tracing::trace;

use crate::error::CoreError;
use crate::ring::SpscRing;

/// Handle to a pool slot. Copyable; ownership is tracked by the slot's
/// reference count, not by the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PktId(u8);

impl PktId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

struct Slot {
    buf: Box<[u8]>,
    skip: usize,
    len: usize,
    refs: u8,
}

impl Slot {
    fn new(size: usize) -> Self {
        Self {
            buf: vec![0u8; size].into_boxed_slice(),
            skip: 0,
            len: 0,
            refs: 0,
        }
    }

    #[inline]
    fn reset(&mut self) {
        self.skip = 0;
        self.len = 0;
    }
}

/// Fixed arena of packet buffers with a free ring and per-slot refcounts.
///
/// One extra slot can be reserved as an emergency buffer so in-flight
/// protocol control messages (final acks) can still be sent when the pool is
/// otherwise exhausted. The emergency slot is never pushed onto the normal
/// free ring.
pub struct PacketPool {
    slots: Vec<Slot>,
    free: SpscRing<u8>,
    pkt_size: usize,
    in_use: usize,
    emergency: Option<u8>,
    emergency_free: bool,
}

impl PacketPool {
    /// Creates a pool of `count` packets of `pkt_size` bytes each, plus one
    /// emergency packet if `emergency` is set.
    ///
    /// # Panics
    /// Panics if `count` is zero, exceeds 254 or `pkt_size` is zero.
    pub fn new(count: usize, pkt_size: usize, emergency: bool) -> Self {
        assert!(count > 0, "pool must hold at least one packet");
        assert!(count <= 254, "slot indices are u8");
        assert!(pkt_size > 0, "packet size must be non-zero");

        let total = count + usize::from(emergency);
        let mut slots = Vec::with_capacity(total);
        for _ in 0..total {
            slots.push(Slot::new(pkt_size));
        }

        // Ring needs one reserved slot, so round count + 1 up.
        let free = SpscRing::with_capacity((count + 1).next_power_of_two())
            .expect("rounded capacity is a power of two");
        for i in 0..count {
            free.try_push(i as u8).expect("free ring sized for all slots");
        }

        Self {
            slots,
            free,
            pkt_size,
            in_use: 0,
            emergency: emergency.then(|| count as u8),
            emergency_free: emergency,
        }
    }

    /// Allocates a packet with reference count 1, or `None` if the pool is
    /// empty.
    pub fn alloc(&mut self) -> Option<PktId> {
        let idx = self.free.try_pop()?;
        let slot = &mut self.slots[idx as usize];
        debug_assert_eq!(slot.refs, 0, "allocated a slot that is still live");
        slot.refs = 1;
        slot.reset();
        self.in_use += 1;
        Some(PktId(idx))
    }

    /// Allocates the reserved emergency packet, if configured and free.
    pub fn alloc_emergency(&mut self) -> Option<PktId> {
        let idx = self.emergency?;
        if !self.emergency_free {
            return None;
        }
        self.emergency_free = false;
        let slot = &mut self.slots[idx as usize];
        slot.refs = 1;
        slot.reset();
        self.in_use += 1;
        Some(PktId(idx))
    }

    /// Increments the packet's reference count ("retain"). Used when a packet
    /// must live simultaneously in a retransmission list and a driver queue.
    pub fn retain(&mut self, pkt: PktId) {
        let slot = &mut self.slots[pkt.index()];
        debug_assert!(slot.refs > 0, "retain of a free packet");
        slot.refs += 1;
    }

    /// Decrements the reference count; at zero the window is reset and the
    /// slot returned to the free ring. Returns `true` when a buffer was
    /// actually reclaimed, so the owning reactor can re-arm producers blocked
    /// on exhaustion.
    pub fn free(&mut self, pkt: PktId) -> bool {
        let idx = pkt.index();
        let slot = &mut self.slots[idx];
        debug_assert!(slot.refs > 0, "double free of packet slot {idx}");
        if slot.refs == 0 {
            return false;
        }
        slot.refs -= 1;
        if slot.refs > 0 {
            return false;
        }

        slot.reset();
        self.in_use -= 1;
        if self.emergency == Some(pkt.0) {
            self.emergency_free = true;
        } else {
            // Cannot fail: the ring is sized for every normal slot.
            let _ = self.free.try_push(pkt.0);
        }
        trace!(slot = idx, "packet reclaimed");
        true
    }

    /// Current reference count of a slot (0 means free).
    #[inline]
    pub fn refs(&self, pkt: PktId) -> u8 {
        self.slots[pkt.index()].refs
    }

    /// Logical data window of the packet.
    #[inline]
    pub fn data(&self, pkt: PktId) -> &[u8] {
        let slot = &self.slots[pkt.index()];
        &slot.buf[slot.skip..slot.skip + slot.len]
    }

    #[inline]
    pub fn data_mut(&mut self, pkt: PktId) -> &mut [u8] {
        let slot = &mut self.slots[pkt.index()];
        &mut slot.buf[slot.skip..slot.skip + slot.len]
    }

    /// Appends bytes at the end of the logical window.
    pub fn put(&mut self, pkt: PktId, bytes: &[u8]) -> Result<(), CoreError> {
        let slot = &mut self.slots[pkt.index()];
        let end = slot.skip + slot.len;
        if end + bytes.len() > slot.buf.len() {
            return Err(CoreError::WindowOutOfBounds);
        }
        slot.buf[end..end + bytes.len()].copy_from_slice(bytes);
        slot.len += bytes.len();
        Ok(())
    }

    /// Slides the window start by `delta` bytes. A positive delta strips a
    /// header (the window shrinks from the front); a negative delta exposes
    /// header space before the current window.
    pub fn adjust(&mut self, pkt: PktId, delta: isize) -> Result<(), CoreError> {
        let slot = &mut self.slots[pkt.index()];
        let skip = slot.skip as isize + delta;
        let len = slot.len as isize - delta;
        if skip < 0 || len < 0 || (skip + len) as usize > slot.buf.len() {
            return Err(CoreError::WindowOutOfBounds);
        }
        slot.skip = skip as usize;
        slot.len = len as usize;
        Ok(())
    }

    /// Places the window at `skip` with length `len`.
    pub fn set_window(&mut self, pkt: PktId, skip: usize, len: usize) -> Result<(), CoreError> {
        let slot = &mut self.slots[pkt.index()];
        if skip + len > slot.buf.len() {
            return Err(CoreError::WindowOutOfBounds);
        }
        slot.skip = skip;
        slot.len = len;
        Ok(())
    }

    #[inline]
    pub fn window(&self, pkt: PktId) -> (usize, usize) {
        let slot = &self.slots[pkt.index()];
        (slot.skip, slot.len)
    }

    #[inline]
    pub fn pkt_size(&self) -> usize {
        self.pkt_size
    }

    /// Number of packets currently handed out (emergency included).
    #[inline]
    pub fn in_use(&self) -> usize {
        self.in_use
    }

    /// True when `alloc()` would fail.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.free.is_empty()
    }
}
