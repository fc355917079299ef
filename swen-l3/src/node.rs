//! ## swen-l3::node
//! **The association reactor**
//!
//! `Node` owns the whole runtime substrate (packet pool, timer wheel,
//! scheduler, event registry), the link interfaces and the association
//! registry, and runs every piece of protocol logic in task context. The
//! host drives it by calling `poll()` whenever interrupts delivered work and
//! `advance_ticks()` from its tick source; when `idle()` is true the host
//! may sleep until the next interrupt.
//!
//! `Node` is generic over an application state `A` so event callbacks,
//! which are plain function pointers, can reach application data through
//! the node itself.

use std::collections::HashMap;

use bytes::Bytes;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, trace, warn};

use swen_core::events::{dispatch, EventFn, EventId, Events, Ready};
use swen_core::pool::{PacketPool, PktId};
use swen_core::sched::{IrqHandle, NullGate, OverflowPolicy, Scheduler, Task};
use swen_core::wheel::{ManualTickSource, TickSource, TimerWheel};
use swen_link::frame::{self, FrameHeader};
use swen_link::{CommandLog, Interface, NvStore, PROTO_L3};
use swen_telemetry::MetricsRecorder;

use crate::assoc::{in_ack_window, AssocState, Association, TxEntry};
use crate::error::L3Error;
use crate::proto::{self, L3Hdr, Op};
use crate::xtea::Xtea;

/// Runtime sizing and protocol knobs. Ring capacities must be powers of
/// two.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub pool_packets: usize,
    pub pkt_size: usize,
    /// Reserve one extra packet for protocol control frames under
    /// exhaustion.
    pub emergency: bool,
    pub irq_ring: usize,
    pub task_ring: usize,
    pub high_water: usize,
    pub overflow: OverflowPolicy,
    /// Retry budget for every non-one-shot op.
    pub retry_max: u8,
    /// Retry interval in wheel ticks (1 s at the default tick rate).
    pub retry_interval_ticks: u32,
    /// Seed for the association-syn jitter.
    pub seed: u64,
    /// Optional XTEA association key; `None` sends plaintext headers.
    pub key: Option<[u8; 16]>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            pool_packets: 16,
            pkt_size: 128,
            emergency: true,
            irq_ring: 16,
            task_ring: 16,
            high_water: 12,
            overflow: OverflowPolicy::Drop,
            retry_max: 15,
            retry_interval_ticks: 8,
            seed: 42,
            key: None,
        }
    }
}

/// Single-threaded reactor for the SWEN radio stack.
pub struct Node<A = ()> {
    pub pool: PacketPool,
    pub wheel: TimerWheel<Node<A>>,
    pub sched: Scheduler<Node<A>>,
    pub events: Events<Node<A>>,
    pub metrics: MetricsRecorder,
    pub app: A,
    ifaces: Vec<Interface>,
    assocs: HashMap<u8, Association>,
    event_peers: Vec<u8>,
    cmd_log: Option<CommandLog<Box<dyn NvStore>>>,
    matched_cmds: Vec<u8>,
    cipher: Option<Xtea>,
    cfg: NodeConfig,
    rng: SmallRng,
}

impl<A> Node<A> {
    pub fn new(cfg: NodeConfig, app: A) -> Result<Self, L3Error> {
        Self::with_tick_source(cfg, app, Box::new(ManualTickSource))
    }

    pub fn with_tick_source(
        cfg: NodeConfig,
        app: A,
        tick_source: Box<dyn TickSource>,
    ) -> Result<Self, L3Error> {
        let sched = Scheduler::new(
            cfg.irq_ring,
            cfg.task_ring,
            cfg.high_water,
            cfg.overflow,
            std::sync::Arc::new(NullGate),
        )?;
        Ok(Self {
            pool: PacketPool::new(cfg.pool_packets, cfg.pkt_size, cfg.emergency),
            wheel: TimerWheel::new(tick_source),
            sched,
            events: Events::new(),
            metrics: MetricsRecorder::new(),
            app,
            ifaces: Vec::new(),
            assocs: HashMap::new(),
            event_peers: Vec::new(),
            cmd_log: None,
            matched_cmds: Vec::new(),
            cipher: cfg.key.as_ref().map(Xtea::new),
            rng: SmallRng::seed_from_u64(cfg.seed),
            cfg,
        })
    }

    pub fn add_iface(&mut self, iface: Interface) -> usize {
        self.ifaces.push(iface);
        self.ifaces.len() - 1
    }

    pub fn iface(&self, idx: usize) -> &Interface {
        &self.ifaces[idx]
    }

    /// Attaches the generic-command log so unframeable receptions can match
    /// learned raw codes.
    pub fn set_cmd_log(&mut self, store: Box<dyn NvStore>) {
        self.cmd_log = Some(CommandLog::open(store));
    }

    pub fn cmd_log_mut(&mut self) -> Option<&mut CommandLog<Box<dyn NvStore>>> {
        self.cmd_log.as_mut()
    }

    /// Generic commands matched since the last call.
    pub fn take_matched_cmds(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.matched_cmds)
    }

    /// Interrupt-side handle for scheduling tasks (e.g. a driver signalling
    /// a completed reception).
    pub fn irq_handle(&self) -> IrqHandle<Node<A>> {
        self.sched.irq_handle()
    }

    // ---- application-facing association API -----------------------------

    /// Binds an association for `peer` over `iface` and registers its event
    /// callback. The association starts `Closed` and persists across
    /// connect/disconnect cycles.
    pub fn bind(&mut self, iface: usize, peer: u8, cb: EventFn<Self>) -> Result<(), L3Error> {
        if self.assocs.contains_key(&peer) {
            return Err(L3Error::AlreadyBound);
        }
        let event = self.events.register(cb, Self::assoc_refresh);
        self.event_peers.push(peer);
        debug_assert_eq!(self.event_peers.len(), event.index() + 1);
        let timer = self.wheel.register(Self::retrans_timer, peer as usize);
        self.assocs
            .insert(peer, Association::new(peer, iface, event, timer));
        debug!(peer, iface, "association bound");
        Ok(())
    }

    /// Peer address owning an event endpoint.
    pub fn peer_of(&self, id: EventId) -> u8 {
        self.event_peers[id.index()]
    }

    pub fn assoc_state(&self, peer: u8) -> Option<AssocState> {
        self.assocs.get(&peer).map(|a| a.state)
    }

    pub fn set_event_mask(&mut self, peer: u8, mask: Ready) -> Result<(), L3Error> {
        let event = self.assocs.get(&peer).ok_or(L3Error::NotBound)?.event;
        self.events.set_mask(event, mask);
        Ok(())
    }

    pub fn clear_event_mask(&mut self, peer: u8, mask: Ready) -> Result<(), L3Error> {
        let event = self.assocs.get(&peer).ok_or(L3Error::NotBound)?.event;
        self.events.clear_mask(event, mask);
        Ok(())
    }

    /// Starts the handshake: sends `AssocSyn` and arms retransmission. The
    /// first attempt is jittered by a random 5-10x multiplier so two nodes
    /// associating simultaneously desynchronize.
    pub fn associate(&mut self, peer: u8) -> Result<(), L3Error> {
        let assoc = self.assocs.get_mut(&peer).ok_or(L3Error::NotBound)?;
        if assoc.state != AssocState::Closed {
            return Err(L3Error::BadState);
        }
        assoc.state = AssocState::Connecting;
        let hdr = L3Hdr {
            op: Op::AssocSyn,
            seq: assoc.seq_id,
            ack: 0,
        };
        let timer = assoc.timer;
        info!(peer, seq = hdr.seq, "associating");
        // Jitter the first retry so two nodes associating at the same
        // moment desynchronize.
        let jitter = self.rng.random_range(5..=10u32);
        if let Err(err) = self.send_op(peer, hdr, &[], false) {
            if let Some(assoc) = self.assocs.get_mut(&peer) {
                assoc.state = AssocState::Closed;
            }
            return Err(err);
        }
        self.wheel
            .rearm(timer, self.cfg.retry_interval_ticks * jitter);
        Ok(())
    }

    /// Queues one payload for reliable delivery. Fails with `PoolExhausted`
    /// when no packet is available; the caller is then parked on write
    /// readiness and re-armed once a packet is reclaimed.
    pub fn send(&mut self, peer: u8, payload: &[u8]) -> Result<(), L3Error> {
        if payload.len() > self.max_payload() {
            return Err(L3Error::PayloadTooLarge);
        }
        let assoc = self.assocs.get_mut(&peer).ok_or(L3Error::NotBound)?;
        if assoc.state != AssocState::Connected {
            return Err(L3Error::NotConnected);
        }
        let hdr = L3Hdr {
            op: Op::Data,
            seq: assoc.next_seq(),
            ack: assoc.peer_seq,
        };
        if let Err(err) = self.send_op(peer, hdr, payload, false) {
            // Sequence ids must stay gapless; give the unsent one back.
            if let Some(assoc) = self.assocs.get_mut(&peer) {
                assoc.seq_id = assoc.seq_id.wrapping_sub(1);
            }
            return Err(err);
        }
        Ok(())
    }

    /// Pops the next delivered payload, releasing its pool packet.
    pub fn get_packet(&mut self, peer: u8) -> Option<Bytes> {
        let pkt = self.assocs.get_mut(&peer)?.rxq.pop_front()?;
        let payload = Bytes::copy_from_slice(self.pool.data(pkt));
        self.free_pkt(pkt);
        Some(payload)
    }

    /// Starts symmetric teardown; `Hangup` is raised once the peer acks.
    pub fn disassociate(&mut self, peer: u8) -> Result<(), L3Error> {
        let assoc = self.assocs.get_mut(&peer).ok_or(L3Error::NotBound)?;
        if assoc.state != AssocState::Connected {
            return Err(L3Error::NotConnected);
        }
        assoc.state = AssocState::Closing;
        let hdr = L3Hdr {
            op: Op::Disassoc,
            seq: assoc.next_seq(),
            ack: assoc.peer_seq,
        };
        info!(peer, "disassociating");
        if let Err(err) = self.send_op(peer, hdr, &[], false) {
            if let Some(assoc) = self.assocs.get_mut(&peer) {
                assoc.state = AssocState::Connected;
                assoc.seq_id = assoc.seq_id.wrapping_sub(1);
            }
            return Err(err);
        }
        Ok(())
    }

    /// Unbinds every association and frees its pending packets.
    pub fn shutdown(&mut self) {
        let peers: Vec<u8> = self.assocs.keys().copied().collect();
        for peer in peers {
            self.reset_assoc(peer);
            self.assocs.remove(&peer);
        }
    }

    // ---- run loop -------------------------------------------------------

    /// Schedules receive processing for every interface with pending frames
    /// and drains the task rings.
    pub fn poll(&mut self) {
        for idx in 0..self.ifaces.len() {
            if self.ifaces[idx].rx_pending() {
                let _ = self.sched.schedule(Task::new(Self::process_rx_task, idx));
            }
        }
        while let Some(task) = self.sched.next() {
            (task.run)(self, task.arg);
        }
    }

    /// Advances the timer wheel `n` ticks, running expired callbacks and any
    /// work they schedule.
    pub fn advance_ticks(&mut self, n: u32) {
        for _ in 0..n {
            let due = self.wheel.tick();
            for expired in due {
                (expired.cb)(self, expired.arg);
            }
            self.poll();
        }
    }

    /// True when no deferred work is queued; the host may sleep until the
    /// next interrupt.
    pub fn idle(&self) -> bool {
        self.sched.idle()
    }

    /// Largest payload that fits one packet after framing, envelope and
    /// cipher padding.
    pub fn max_payload(&self) -> usize {
        let overhead = frame::HDR_LEN + self.l3_overhead();
        let mut max = self.cfg.pkt_size.saturating_sub(overhead);
        if self.cipher.is_some() {
            max = max.saturating_sub(proto::pad_len(self.l3_overhead() + max));
            // The envelope length byte limits the encrypted unit to 255.
            max = max.min(255 - (1 + proto::HDR_LEN));
        }
        max
    }

    fn l3_overhead(&self) -> usize {
        if self.cipher.is_some() {
            1 + proto::HDR_LEN
        } else {
            proto::HDR_LEN
        }
    }

    // ---- transmit path --------------------------------------------------

    /// Builds a fully framed packet: payload first, then the association
    /// header, optional encrypted envelope and link header are laid in by
    /// sliding the packet window forward. No byte is ever copied to make
    /// room for a header.
    fn build_frame(
        &mut self,
        iface: usize,
        peer: u8,
        hdr: L3Hdr,
        payload: &[u8],
        emergency_ok: bool,
    ) -> Result<PktId, L3Error> {
        let pkt = match self.pool.alloc() {
            Some(pkt) => pkt,
            None => {
                self.metrics.pool_exhaustion.inc();
                let fallback = if emergency_ok {
                    self.pool.alloc_emergency()
                } else {
                    None
                };
                fallback.ok_or(L3Error::PoolExhausted)?
            }
        };

        let headroom = frame::HDR_LEN + self.l3_overhead();
        let result: Result<(), swen_core::error::CoreError> = (|| {
            self.pool.set_window(pkt, headroom, 0)?;
            self.pool.put(pkt, payload)?;

            self.pool.adjust(pkt, -(proto::HDR_LEN as isize))?;
            self.pool.data_mut(pkt)[..proto::HDR_LEN].copy_from_slice(&proto::encode_hdr(hdr));

            if let Some(cipher) = &self.cipher {
                self.pool.adjust(pkt, -1)?;
                let total = self.pool.data(pkt).len();
                self.pool.data_mut(pkt)[0] = total as u8;
                let pad = proto::pad_len(total);
                self.pool.put(pkt, &[0u8; 8][..pad])?;
                cipher.encrypt_in_place(self.pool.data_mut(pkt));
            }

            self.pool.adjust(pkt, -(frame::HDR_LEN as isize))?;
            let link_hdr = FrameHeader {
                to: peer,
                from: self.ifaces[iface].addr(),
                proto: PROTO_L3,
            };
            frame::write_header(self.pool.data_mut(pkt), link_hdr);
            Ok(())
        })();

        if result.is_err() {
            self.free_pkt(pkt);
            return Err(L3Error::PayloadTooLarge);
        }
        Ok(pkt)
    }

    /// Hands a framed packet to the driver. The driver queue holds its own
    /// reference for the duration of the call.
    fn xmit(&mut self, iface: usize, pkt: PktId) {
        self.pool.retain(pkt);
        let sent = {
            let frame_bytes = self.pool.data(pkt);
            self.ifaces[iface].send_frame(frame_bytes)
        };
        match sent {
            Ok(()) => self.metrics.frames_tx.inc(),
            Err(err) => warn!(%err, "driver refused frame"),
        }
        self.free_pkt(pkt);
    }

    /// Builds and sends one op. Non-one-shot ops join the retransmission
    /// list and keep their packet alive until acked.
    fn send_op(
        &mut self,
        peer: u8,
        hdr: L3Hdr,
        payload: &[u8],
        emergency_ok: bool,
    ) -> Result<(), L3Error> {
        let (iface, timer) = {
            let assoc = self.assocs.get(&peer).ok_or(L3Error::NotBound)?;
            (assoc.iface, assoc.timer)
        };
        let pkt = match self.build_frame(iface, peer, hdr, payload, emergency_ok) {
            Ok(pkt) => pkt,
            Err(L3Error::PoolExhausted) => {
                let event = self.assocs[&peer].event;
                self.events.block_write(event);
                return Err(L3Error::PoolExhausted);
            }
            Err(err) => return Err(err),
        };

        trace!(peer, op = ?hdr.op, seq = hdr.seq, ack = hdr.ack, "l3 tx");
        if hdr.op.is_one_shot() {
            self.xmit(iface, pkt);
            self.free_pkt(pkt);
        } else {
            let assoc = self.assocs.get_mut(&peer).ok_or(L3Error::NotBound)?;
            assoc.retrans.push(TxEntry {
                pkt,
                seq: hdr.seq,
                retries: 0,
            });
            self.xmit(iface, pkt);
            if !self.wheel.is_armed(timer) {
                self.wheel.arm(timer, self.cfg.retry_interval_ticks);
            }
        }
        Ok(())
    }

    fn send_ack(&mut self, peer: u8) {
        let Some(assoc) = self.assocs.get(&peer) else {
            return;
        };
        let hdr = L3Hdr {
            op: Op::Ack,
            seq: assoc.seq_id,
            ack: assoc.peer_seq,
        };
        // Acks may use the emergency packet: the peer's retry timer cannot
        // make progress without them.
        if let Err(err) = self.send_op(peer, hdr, &[], true) {
            debug!(peer, %err, "ack deferred by pool exhaustion");
        }
    }

    // ---- timers and tasks -----------------------------------------------

    fn retrans_timer(node: &mut Node<A>, arg: usize) {
        let peer = arg as u8;
        let Some(assoc) = node.assocs.get_mut(&peer) else {
            return;
        };
        if assoc.retrans.is_empty() {
            return;
        }

        let mut exhausted = false;
        for entry in &mut assoc.retrans {
            entry.retries += 1;
            if entry.retries > node.cfg.retry_max {
                exhausted = true;
            }
        }

        if exhausted {
            warn!(peer, "retry budget exhausted, restarting association");
            let event = assoc.event;
            node.reset_assoc(peer);
            dispatch(node, Self::events_proj, event, Ready::ERROR);
            let _ = node.associate(peer);
            return;
        }

        let iface = assoc.iface;
        let timer = assoc.timer;
        let pkts: Vec<PktId> = assoc.retrans.iter().map(|e| e.pkt).collect();
        for pkt in pkts {
            node.metrics.retransmissions.inc();
            node.xmit(iface, pkt);
        }
        node.wheel.arm(timer, node.cfg.retry_interval_ticks);
    }

    /// One-shot task coalescing acks for back-to-back data frames.
    fn deferred_ack_task(node: &mut Node<A>, arg: usize) {
        let peer = arg as u8;
        let Some(assoc) = node.assocs.get_mut(&peer) else {
            return;
        };
        if !assoc.ack_pending {
            return;
        }
        assoc.ack_pending = false;
        node.send_ack(peer);
    }

    fn process_rx_task(node: &mut Node<A>, arg: usize) {
        let iface = arg;
        while let Some(raw) = node.ifaces[iface].poll_rx() {
            node.metrics.frames_rx.inc();
            node.link_input(iface, &raw);
        }
    }

    // ---- receive path ---------------------------------------------------

    fn link_input(&mut self, iface: usize, raw: &[u8]) {
        let local = self.ifaces[iface].addr();
        match frame::parse(raw, local) {
            Ok((hdr, off)) if hdr.proto == PROTO_L3 => {
                self.l3_input(iface, hdr.from, &raw[off..]);
            }
            Ok((hdr, _)) => {
                trace!(proto = hdr.proto, "frame for unknown protocol dropped");
            }
            Err(frame::FrameError::TooShort) => {
                // Not SWEN at all: maybe a learned raw remote code.
                if let Some(cmd) = self.cmd_log.as_ref().and_then(|log| log.match_payload(raw)) {
                    info!(cmd, "generic command matched");
                    self.matched_cmds.push(cmd);
                }
            }
            Err(err) => {
                self.metrics.checksum_drops.inc();
                trace!(%err, "frame dropped");
            }
        }
    }

    fn l3_input(&mut self, iface: usize, from: u8, bytes: &[u8]) {
        let (hdr, payload) = if let Some(cipher) = &self.cipher {
            let mut envelope = bytes.to_vec();
            match proto::open_envelope(cipher, &mut envelope) {
                Ok((hdr, payload)) => (hdr, payload.to_vec()),
                Err(err) => {
                    trace!(from, %err, "envelope dropped");
                    return;
                }
            }
        } else {
            match proto::parse_hdr(bytes) {
                Ok(hdr) => (hdr, bytes[proto::HDR_LEN..].to_vec()),
                Err(err) => {
                    trace!(from, %err, "header dropped");
                    return;
                }
            }
        };

        if !self.assocs.contains_key(&from) {
            trace!(from, "frame from unbound peer dropped");
            return;
        }
        if self.assocs[&from].iface != iface {
            trace!(from, "frame on wrong interface dropped");
            return;
        }

        trace!(from, op = ?hdr.op, seq = hdr.seq, ack = hdr.ack, "l3 rx");
        match hdr.op {
            Op::AssocSyn => self.on_syn(from, hdr),
            Op::AssocSynAck => self.on_syn_ack(from, hdr),
            Op::AssocComplete => self.on_complete(from, hdr),
            Op::Ack => self.on_ack(from, hdr),
            Op::Data => self.on_data(from, hdr, &payload),
            Op::Disassoc => self.on_disassoc(from, hdr),
        }
    }

    fn on_syn(&mut self, peer: u8, hdr: L3Hdr) {
        let (duplicate, stale) = {
            let Some(assoc) = self.assocs.get(&peer) else {
                return;
            };
            let duplicate = assoc.synced && hdr.seq == assoc.peer_seq;
            let stale = !duplicate
                && !matches!(assoc.state, AssocState::Closed | AssocState::Connecting);
            (duplicate, stale)
        };
        if stale {
            // A fresh syn on a live association means the peer restarted.
            info!(peer, "peer restarted, dropping stale association state");
            self.reset_assoc(peer);
        }
        let reply = {
            let Some(assoc) = self.assocs.get_mut(&peer) else {
                return;
            };
            if !duplicate {
                assoc.peer_seq = hdr.seq;
                assoc.synced = true;
                assoc.state = AssocState::Connecting;
            }
            L3Hdr {
                op: Op::AssocSynAck,
                seq: assoc.seq_id,
                ack: hdr.seq,
            }
        };
        if let Err(err) = self.send_op(peer, reply, &[], true) {
            debug!(peer, %err, "syn-ack deferred");
        }
    }

    fn on_syn_ack(&mut self, peer: u8, hdr: L3Hdr) {
        let Some(assoc) = self.assocs.get_mut(&peer) else {
            return;
        };
        if assoc.state != AssocState::Connecting || hdr.ack != assoc.seq_id {
            return;
        }
        assoc.peer_seq = hdr.seq;
        assoc.synced = true;
        assoc.state = AssocState::ConnComplete;
        let ack = assoc.peer_seq.wrapping_add(1);
        let reply = L3Hdr {
            op: Op::AssocComplete,
            seq: assoc.next_seq(),
            ack,
        };
        let retired = assoc.retire_acked(hdr.ack);
        let timer = assoc.timer;
        self.release_all(retired);
        self.wheel.disarm(timer);
        if let Err(err) = self.send_op(peer, reply, &[], false) {
            debug!(peer, %err, "assoc-complete deferred");
        }
    }

    fn on_complete(&mut self, peer: u8, hdr: L3Hdr) {
        let Some(assoc) = self.assocs.get_mut(&peer) else {
            return;
        };
        if assoc.synced && hdr.seq == assoc.peer_seq {
            // Our ack got lost and the peer retransmitted. Just re-ack.
            self.send_ack(peer);
            return;
        }
        let handshaking = matches!(
            assoc.state,
            AssocState::Connecting | AssocState::ConnComplete
        );
        if !handshaking
            || hdr.seq != assoc.peer_seq.wrapping_add(1)
            || !in_ack_window(hdr.ack, assoc.seq_id)
        {
            return;
        }

        // Retires our own pending complete in a simultaneous open; a plain
        // responder has nothing queued and this is a no-op.
        let retired = assoc.retire_acked(hdr.ack);
        assoc.peer_seq = hdr.seq;
        assoc.state = AssocState::Connected;
        let event = assoc.event;
        let timer = assoc.timer;
        let empty = assoc.retrans.is_empty();
        info!(peer, "association established");
        self.release_all(retired);
        if empty {
            self.wheel.disarm(timer);
        }
        self.send_ack(peer);
        dispatch(self, Self::events_proj, event, Ready::WRITE);
    }

    fn on_ack(&mut self, peer: u8, hdr: L3Hdr) {
        let Some(assoc) = self.assocs.get_mut(&peer) else {
            return;
        };
        let retired = assoc.retire_acked(hdr.ack);
        if retired.is_empty() {
            return;
        }
        let timer = assoc.timer;
        let event = assoc.event;
        let empty = assoc.retrans.is_empty();

        let notify = match assoc.state {
            AssocState::Connecting | AssocState::ConnComplete => {
                assoc.state = AssocState::Connected;
                info!(peer, "association established");
                Some(Ready::WRITE)
            }
            AssocState::Closing if empty => {
                assoc.state = AssocState::Closed;
                assoc.synced = false;
                info!(peer, "association closed");
                Some(Ready::HANGUP)
            }
            _ => None,
        };

        self.release_all(retired);
        if empty {
            self.wheel.disarm(timer);
        }
        if notify == Some(Ready::HANGUP) {
            self.flush_rxq(peer);
        }
        if let Some(ready) = notify {
            dispatch(self, Self::events_proj, event, ready);
        }
    }

    fn on_data(&mut self, peer: u8, hdr: L3Hdr, payload: &[u8]) {
        let Some(assoc) = self.assocs.get_mut(&peer) else {
            return;
        };
        if assoc.state != AssocState::Connected {
            return;
        }
        if assoc.already_acked(hdr.seq) {
            // Duplicate: our ack was lost, answer immediately.
            self.send_ack(peer);
            return;
        }
        if hdr.seq != assoc.peer_seq.wrapping_add(1) {
            // Outside the expected window; let the peer's timer recover.
            return;
        }

        let Some(pkt) = self.pool.alloc() else {
            // No buffer to hold it; drop and let the retransmission redeliver.
            self.metrics.pool_exhaustion.inc();
            return;
        };
        if self.pool.put(pkt, payload).is_err() {
            self.free_pkt(pkt);
            return;
        }

        let Some(assoc) = self.assocs.get_mut(&peer) else {
            return;
        };
        assoc.peer_seq = hdr.seq;
        assoc.rxq.push_back(pkt);
        let event = assoc.event;
        if !assoc.ack_pending {
            assoc.ack_pending = true;
            let queued = self
                .sched
                .schedule(Task::new(Self::deferred_ack_task, peer as usize));
            if queued.is_err() {
                // Ring full; fall back to an immediate ack.
                if let Some(assoc) = self.assocs.get_mut(&peer) {
                    assoc.ack_pending = false;
                }
                self.send_ack(peer);
            }
        }
        dispatch(self, Self::events_proj, event, Ready::READ);
    }

    fn on_disassoc(&mut self, peer: u8, hdr: L3Hdr) {
        let Some(assoc) = self.assocs.get_mut(&peer) else {
            return;
        };
        if assoc.already_acked(hdr.seq) {
            self.send_ack(peer);
            return;
        }
        if hdr.seq != assoc.peer_seq.wrapping_add(1) {
            return;
        }
        assoc.peer_seq = hdr.seq;
        let event = assoc.event;
        info!(peer, "peer disassociated");
        self.send_ack(peer);
        self.reset_assoc(peer);
        dispatch(self, Self::events_proj, event, Ready::HANGUP);
    }

    // ---- shared plumbing ------------------------------------------------

    fn events_proj(node: &mut Node<A>) -> &mut Events<Node<A>> {
        &mut node.events
    }

    /// Synthesized readiness: read from queue occupancy, write from pool
    /// occupancy. Error/hangup are one-shot and never re-derived.
    fn assoc_refresh(node: &mut Node<A>, id: EventId) -> Ready {
        let peer = node.event_peers[id.index()];
        let mut ready = Ready::EMPTY;
        let Some(assoc) = node.assocs.get(&peer) else {
            return ready;
        };
        if !assoc.rxq.is_empty() {
            ready.insert(Ready::READ);
        }
        if assoc.state == AssocState::Connected && !node.pool.is_exhausted() {
            ready.insert(Ready::WRITE);
        }
        ready
    }

    /// Frees a packet and, if a buffer actually returned to the pool,
    /// re-dispatches write readiness to endpoints parked on exhaustion.
    fn free_pkt(&mut self, pkt: PktId) {
        if self.pool.free(pkt) {
            self.resume_write_events();
        }
    }

    fn resume_write_events(&mut self) {
        for id in self.events.take_write_blocked() {
            dispatch(self, Self::events_proj, id, Ready::WRITE);
        }
    }

    fn release_all(&mut self, pkts: Vec<PktId>) {
        for pkt in pkts {
            self.free_pkt(pkt);
        }
    }

    fn flush_rxq(&mut self, peer: u8) {
        let Some(assoc) = self.assocs.get_mut(&peer) else {
            return;
        };
        let pkts: Vec<PktId> = assoc.rxq.drain(..).collect();
        self.release_all(pkts);
    }

    /// Returns an association to `Closed`, releasing every pending packet
    /// and cancelling its timer. The binding itself survives.
    fn reset_assoc(&mut self, peer: u8) {
        let Some(assoc) = self.assocs.get_mut(&peer) else {
            return;
        };
        let timer = assoc.timer;
        let tx: Vec<PktId> = assoc.retrans.drain(..).map(|e| e.pkt).collect();
        assoc.state = AssocState::Closed;
        // A stale sync record would make the next handshake's syn look like
        // a duplicate; the next connection starts from scratch.
        assoc.synced = false;
        assoc.ack_pending = false;
        self.release_all(tx);
        self.flush_rxq(peer);
        self.wheel.disarm(timer);
    }
}
