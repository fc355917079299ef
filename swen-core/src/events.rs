//! ## swen-core::events
//! **Readiness-based event dispatch**
//!
//! Each endpoint exposes a `wanted` mask (what its owner cares about) and an
//! `available` mask (what is currently true). Dispatch repeatedly invokes the
//! endpoint callback with the intersection, re-deriving `available` through
//! the endpoint's refresh hook after every call, so write readiness is
//! synthesized from pool occupancy rather than stored.
//!
//! Endpoints that want to write while the packet pool is exhausted park on a
//! retry list; the owning reactor re-dispatches them whenever a packet is
//! reclaimed. This is the backpressure bridge between the pool and the
//! protocol layers above it.

use std::ops::{BitAnd, BitOr};

/// Level-triggered readiness bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ready(u8);

impl Ready {
    pub const EMPTY: Ready = Ready(0);
    pub const READ: Ready = Ready(1 << 0);
    pub const WRITE: Ready = Ready(1 << 1);
    pub const ERROR: Ready = Ready(1 << 2);
    pub const HANGUP: Ready = Ready(1 << 3);

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn contains(self, other: Ready) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn intersects(self, other: Ready) -> bool {
        self.0 & other.0 != 0
    }

    #[inline]
    pub fn insert(&mut self, other: Ready) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn remove(&mut self, other: Ready) {
        self.0 &= !other.0;
    }
}

impl BitOr for Ready {
    type Output = Ready;
    #[inline]
    fn bitor(self, rhs: Ready) -> Ready {
        Ready(self.0 | rhs.0)
    }
}

impl BitAnd for Ready {
    type Output = Ready;
    #[inline]
    fn bitand(self, rhs: Ready) -> Ready {
        Ready(self.0 & rhs.0)
    }
}

/// Endpoint callback: `(context, endpoint, wanted & available)`.
pub type EventFn<C> = fn(&mut C, EventId, Ready);

/// Re-derives an endpoint's `available` mask from its receive-queue
/// emptiness and packet-pool occupancy.
pub type RefreshFn<C> = fn(&mut C, EventId) -> Ready;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(usize);

impl EventId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

struct Endpoint<C> {
    wanted: Ready,
    available: Ready,
    cb: EventFn<C>,
    refresh: RefreshFn<C>,
    retrying: bool,
}

/// Registry of readiness endpoints. Lifetime of an endpoint matches its
/// owning association or socket; the registry itself never shrinks.
pub struct Events<C> {
    endpoints: Vec<Endpoint<C>>,
    retry: Vec<EventId>,
}

impl<C> Default for Events<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Events<C> {
    pub fn new() -> Self {
        Self {
            endpoints: Vec::new(),
            retry: Vec::new(),
        }
    }

    pub fn register(&mut self, cb: EventFn<C>, refresh: RefreshFn<C>) -> EventId {
        self.endpoints.push(Endpoint {
            wanted: Ready::EMPTY,
            available: Ready::EMPTY,
            cb,
            refresh,
            retrying: false,
        });
        EventId(self.endpoints.len() - 1)
    }

    /// Adds bits to the endpoint's `wanted` mask.
    pub fn set_mask(&mut self, id: EventId, mask: Ready) {
        self.endpoints[id.0].wanted.insert(mask);
    }

    /// Removes bits from the endpoint's `wanted` mask.
    pub fn clear_mask(&mut self, id: EventId, mask: Ready) {
        self.endpoints[id.0].wanted.remove(mask);
    }

    #[inline]
    pub fn wanted(&self, id: EventId) -> Ready {
        self.endpoints[id.0].wanted
    }

    /// Parks an endpoint that wants to write while the pool is exhausted.
    pub fn block_write(&mut self, id: EventId) {
        let ep = &mut self.endpoints[id.0];
        if !ep.retrying {
            ep.retrying = true;
            self.retry.push(id);
        }
    }

    /// Drains the pool-exhaustion retry list. The caller re-dispatches a
    /// WRITE event to each endpoint; called whenever a packet is freed.
    pub fn take_write_blocked(&mut self) -> Vec<EventId> {
        for id in &self.retry {
            self.endpoints[id.0].retrying = false;
        }
        std::mem::take(&mut self.retry)
    }

    fn unlink_retry(&mut self, id: EventId) {
        if self.endpoints[id.0].retrying {
            self.endpoints[id.0].retrying = false;
            self.retry.retain(|e| *e != id);
        }
    }
}

/// Delivers `ready` to an endpoint and runs the level-triggered dispatch
/// loop: while `wanted & available` is non-empty the callback is invoked
/// with the intersection, and `available` is re-derived through the refresh
/// hook after each call. The callback must consume the condition or clear
/// its mask to terminate the loop.
///
/// `proj` projects the registry out of the context so callbacks can re-enter
/// the context mutably.
pub fn dispatch<C>(ctx: &mut C, proj: fn(&mut C) -> &mut Events<C>, id: EventId, ready: Ready) {
    {
        let events = proj(ctx);
        if ready.intersects(Ready::ERROR | Ready::HANGUP) {
            // A dead endpoint is not coming back for a write retry.
            events.endpoints[id.0].available.remove(Ready::WRITE);
            events.unlink_retry(id);
        }
        events.endpoints[id.0].available.insert(ready);
    }

    loop {
        let (cb, hits) = {
            let ep = &proj(ctx).endpoints[id.0];
            let hits = ep.wanted & ep.available;
            if hits.is_empty() {
                return;
            }
            (ep.cb, hits)
        };
        cb(ctx, id, hits);
        let refresh = proj(ctx).endpoints[id.0].refresh;
        let available = refresh(ctx, id);
        proj(ctx).endpoints[id.0].available = available;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ctx {
        events: Events<Ctx>,
        rx_pending: usize,
        pool_free: bool,
        delivered: Vec<(usize, Ready)>,
    }

    fn proj(ctx: &mut Ctx) -> &mut Events<Ctx> {
        &mut ctx.events
    }

    fn consume_one(ctx: &mut Ctx, id: EventId, ready: Ready) {
        ctx.delivered.push((id.index(), ready));
        if ready.contains(Ready::READ) && ctx.rx_pending > 0 {
            ctx.rx_pending -= 1;
        }
        if ready.contains(Ready::WRITE) {
            // A writer is notified once and re-arms the mask when it next
            // has data to send.
            ctx.events.clear_mask(id, Ready::WRITE);
        }
        if ready.intersects(Ready::ERROR | Ready::HANGUP) {
            ctx.events.clear_mask(id, Ready::ERROR | Ready::HANGUP);
        }
    }

    fn refresh(ctx: &mut Ctx, _id: EventId) -> Ready {
        let mut ready = Ready::EMPTY;
        if ctx.rx_pending > 0 {
            ready.insert(Ready::READ);
        }
        if ctx.pool_free {
            ready.insert(Ready::WRITE);
        }
        ready
    }

    fn ctx() -> Ctx {
        Ctx {
            events: Events::new(),
            rx_pending: 0,
            pool_free: false,
            delivered: Vec::new(),
        }
    }

    #[test]
    fn dispatch_loops_until_consumed() {
        let mut c = ctx();
        let id = c.events.register(consume_one, refresh);
        c.events.set_mask(id, Ready::READ);
        c.rx_pending = 3;
        dispatch(&mut c, proj, id, Ready::READ);
        // One callback per queued packet; loop ends when refresh reports
        // nothing left to read.
        assert_eq!(c.delivered.len(), 3);
        assert_eq!(c.rx_pending, 0);
    }

    #[test]
    fn unwanted_events_are_not_delivered() {
        let mut c = ctx();
        let id = c.events.register(consume_one, refresh);
        c.rx_pending = 1;
        dispatch(&mut c, proj, id, Ready::READ);
        assert!(c.delivered.is_empty());
        // Raising the mask later delivers the still-available condition.
        c.events.set_mask(id, Ready::READ);
        dispatch(&mut c, proj, id, Ready::EMPTY);
        assert_eq!(c.delivered.len(), 1);
    }

    #[test]
    fn error_clears_pending_write_and_retry_link() {
        let mut c = ctx();
        let id = c.events.register(consume_one, refresh);
        c.events.set_mask(id, Ready::WRITE | Ready::ERROR);
        c.events.block_write(id);
        dispatch(&mut c, proj, id, Ready::ERROR);
        assert_eq!(c.delivered, vec![(id.index(), Ready::ERROR)]);
        assert!(c.events.take_write_blocked().is_empty());
    }

    #[test]
    fn write_blocked_endpoints_resume_once() {
        let mut c = ctx();
        let id = c.events.register(consume_one, refresh);
        c.events.set_mask(id, Ready::WRITE);
        c.events.block_write(id);
        c.events.block_write(id); // no duplicate entries
        let blocked = c.events.take_write_blocked();
        assert_eq!(blocked, vec![id]);
        assert!(c.events.take_write_blocked().is_empty());

        c.pool_free = true;
        for id in blocked {
            dispatch(&mut c, proj, id, Ready::WRITE);
        }
        assert_eq!(c.delivered.len(), 1);
    }

    #[test]
    fn ready_mask_operations() {
        let mut mask = Ready::READ | Ready::WRITE;
        assert!(mask.contains(Ready::READ));
        assert!(mask.intersects(Ready::WRITE | Ready::ERROR));
        assert!(!mask.contains(Ready::READ | Ready::ERROR));
        mask.remove(Ready::READ);
        assert_eq!(mask, Ready::WRITE);
        mask.insert(Ready::HANGUP);
        assert!(mask.contains(Ready::HANGUP));
    }
}
