//! In-memory radio medium connecting two interfaces.
//!
//! Each direction carries its own loss model; every transmission, dropped
//! or not, is recorded in a shared trace so tests can assert on the exact
//! byte sequences that crossed the air.

use std::sync::{Arc, Mutex};

use tracing::trace;

use swen_link::iface::RadioDriver;
use swen_link::{Interface, LinkError, RxProducer};

use crate::loss::LossModel;

/// One transmission over the simulated medium.
#[derive(Debug, Clone)]
pub struct TraceEntry {
    /// Driver label, `'a'` or `'b'`.
    pub sender: char,
    pub frame: Vec<u8>,
    pub dropped: bool,
}

type SharedTrace = Arc<Mutex<Vec<TraceEntry>>>;
type ProducerSlot = Arc<Mutex<Option<RxProducer>>>;

/// Bidirectional loopback link between two nodes' interfaces.
///
/// Built in two steps because each driver needs the opposite interface's rx
/// producer: take the drivers first, construct both interfaces, then attach
/// them.
pub struct LoopbackLink {
    trace: SharedTrace,
    to_a: ProducerSlot,
    to_b: ProducerSlot,
}

impl Default for LoopbackLink {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackLink {
    pub fn new() -> Self {
        Self {
            trace: Arc::new(Mutex::new(Vec::new())),
            to_a: Arc::new(Mutex::new(None)),
            to_b: Arc::new(Mutex::new(None)),
        }
    }

    /// Driver for node A; its transmissions land in node B's rx ring.
    pub fn driver_a(&self, loss: Box<dyn LossModel>) -> LoopbackRadio {
        LoopbackRadio {
            sender: 'a',
            peer: self.to_b.clone(),
            loss,
            trace: self.trace.clone(),
        }
    }

    /// Driver for node B; its transmissions land in node A's rx ring.
    pub fn driver_b(&self, loss: Box<dyn LossModel>) -> LoopbackRadio {
        LoopbackRadio {
            sender: 'b',
            peer: self.to_a.clone(),
            loss,
            trace: self.trace.clone(),
        }
    }

    /// Wires node A's interface as the receive side of `driver_b`.
    pub fn attach_a(&self, iface: &Interface) {
        *self.to_a.lock().expect("producer slot") = Some(iface.rx_producer());
    }

    /// Wires node B's interface as the receive side of `driver_a`.
    pub fn attach_b(&self, iface: &Interface) {
        *self.to_b.lock().expect("producer slot") = Some(iface.rx_producer());
    }

    /// Snapshot of every transmission so far.
    pub fn trace(&self) -> Vec<TraceEntry> {
        self.trace.lock().expect("trace").clone()
    }

    /// Frames that actually reached the far side, in order.
    pub fn delivered(&self) -> Vec<Vec<u8>> {
        self.trace
            .lock()
            .expect("trace")
            .iter()
            .filter(|e| !e.dropped)
            .map(|e| e.frame.clone())
            .collect()
    }
}

/// Radio driver backed by the loopback medium.
pub struct LoopbackRadio {
    sender: char,
    peer: ProducerSlot,
    loss: Box<dyn LossModel>,
    trace: SharedTrace,
}

impl RadioDriver for LoopbackRadio {
    fn send(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        let dropped = self.loss.should_drop(frame);
        self.trace.lock().expect("trace").push(TraceEntry {
            sender: self.sender,
            frame: frame.to_vec(),
            dropped,
        });
        if dropped {
            trace!(sender = %self.sender, len = frame.len(), "medium dropped frame");
            return Ok(());
        }
        let slot = self.peer.lock().expect("producer slot");
        let Some(producer) = slot.as_ref() else {
            // Far side not attached yet; behaves like an empty channel.
            return Ok(());
        };
        producer.deliver(frame.to_vec())
    }
}
