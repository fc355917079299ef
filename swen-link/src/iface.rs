//! ## swen-link::iface
//! **Radio interface bookkeeping**
//!
//! The driver below the link layer is a capability resolved once at
//! interface construction. Its receive side runs in interrupt context and
//! may only push fully-framed byte packets into the interface's rx ring; the
//! link layer drains that ring in task context.

use thiserror::Error;
use tracing::debug;

use swen_core::ring::SpscRing;

/// Errors surfaced by the link layer and its drivers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// The driver could not accept the frame right now.
    #[error("driver busy")]
    DriverBusy,
    #[error("frame exceeds driver MTU")]
    FrameTooLarge,
    #[error("interface rx ring full, frame dropped")]
    RxOverrun,
}

/// Non-blocking transmit capability supplied by the radio driver.
///
/// `send` either queues the whole frame for transmission or fails; it must
/// be safe to call from task context at any time.
pub trait RadioDriver: Send {
    fn send(&mut self, frame: &[u8]) -> Result<(), LinkError>;
}

/// Per-interface frame and byte counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct IfaceStats {
    pub tx_frames: u64,
    pub tx_bytes: u64,
    pub rx_frames: u64,
    pub rx_bytes: u64,
}

/// Handle for the driver's receive interrupt: pushes framed byte packets
/// into the interface rx ring. `Send`, cloneable, ISR-safe.
pub struct RxProducer {
    ring: SpscRing<Vec<u8>>,
}

impl Clone for RxProducer {
    fn clone(&self) -> Self {
        Self {
            ring: self.ring.share(),
        }
    }
}

impl RxProducer {
    /// Delivers one received frame. Dropping on overrun is the only option
    /// in interrupt context.
    pub fn deliver(&self, frame: Vec<u8>) -> Result<(), LinkError> {
        self.ring.try_push(frame).map_err(|_| LinkError::RxOverrun)
    }
}

/// One radio interface: local address, driver capability, rx ring and
/// counters.
pub struct Interface {
    addr: u8,
    driver: Box<dyn RadioDriver>,
    rx: SpscRing<Vec<u8>>,
    stats: IfaceStats,
}

impl Interface {
    pub fn new(addr: u8, driver: Box<dyn RadioDriver>, rx_capacity: usize) -> Self {
        let rx = SpscRing::with_capacity(rx_capacity).expect("rx capacity must be a power of two");
        Self {
            addr,
            driver,
            rx,
            stats: IfaceStats::default(),
        }
    }

    #[inline]
    pub fn addr(&self) -> u8 {
        self.addr
    }

    /// Interrupt-side producer for the driver's receive path.
    pub fn rx_producer(&self) -> RxProducer {
        RxProducer {
            ring: self.rx.share(),
        }
    }

    /// True if received frames are waiting in the rx ring.
    #[inline]
    pub fn rx_pending(&self) -> bool {
        !self.rx.is_empty()
    }

    /// Pulls the next received frame out of the rx ring (task context).
    pub fn poll_rx(&mut self) -> Option<Vec<u8>> {
        let frame = self.rx.try_pop()?;
        self.stats.rx_frames += 1;
        self.stats.rx_bytes += frame.len() as u64;
        Some(frame)
    }

    /// Hands a fully-framed packet to the driver.
    pub fn send_frame(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        self.driver.send(frame)?;
        self.stats.tx_frames += 1;
        self.stats.tx_bytes += frame.len() as u64;
        debug!(to = frame.first(), len = frame.len(), "frame sent");
        Ok(())
    }

    #[inline]
    pub fn stats(&self) -> IfaceStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct CapturingDriver {
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl RadioDriver for CapturingDriver {
        fn send(&mut self, frame: &[u8]) -> Result<(), LinkError> {
            self.sent.lock().unwrap().push(frame.to_vec());
            Ok(())
        }
    }

    #[test]
    fn send_updates_stats() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut iface = Interface::new(
            0x21,
            Box::new(CapturingDriver { sent: sent.clone() }),
            8,
        );
        iface.send_frame(&[1, 2, 3]).unwrap();
        iface.send_frame(&[4, 5]).unwrap();
        assert_eq!(iface.stats().tx_frames, 2);
        assert_eq!(iface.stats().tx_bytes, 5);
        assert_eq!(sent.lock().unwrap().len(), 2);
    }

    #[test]
    fn rx_flows_through_ring() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut iface = Interface::new(0x21, Box::new(CapturingDriver { sent }), 8);
        let producer = iface.rx_producer();
        assert!(!iface.rx_pending());
        producer.deliver(vec![0xAA, 0xBB]).unwrap();
        assert!(iface.rx_pending());
        assert_eq!(iface.poll_rx(), Some(vec![0xAA, 0xBB]));
        assert_eq!(iface.poll_rx(), None);
        assert_eq!(iface.stats().rx_frames, 1);
        assert_eq!(iface.stats().rx_bytes, 2);
    }

    #[test]
    fn rx_overrun_drops() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let iface = Interface::new(0x21, Box::new(CapturingDriver { sent }), 2);
        let producer = iface.rx_producer();
        producer.deliver(vec![1]).unwrap();
        assert_eq!(producer.deliver(vec![2]), Err(LinkError::RxOverrun));
    }
}
