//! ## swen-telemetry::metrics
//! **Prometheus counters for the radio stack**

use prometheus::{Counter, Registry};

/// Stack-wide counters. Cloning shares the underlying registry.
#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub frames_tx: Counter,
    pub frames_rx: Counter,
    pub checksum_drops: Counter,
    pub retransmissions: Counter,
    pub pool_exhaustion: Counter,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecorder {
    pub fn new() -> Self {
        let registry = Registry::new();
        let frames_tx = Counter::new("swen_frames_tx_total", "Frames handed to the radio driver")
            .expect("valid counter opts");
        let frames_rx =
            Counter::new("swen_frames_rx_total", "Frames pulled from interface rx rings")
                .expect("valid counter opts");
        let checksum_drops = Counter::new(
            "swen_checksum_drops_total",
            "Frames dropped for bad checksum or address",
        )
        .expect("valid counter opts");
        let retransmissions = Counter::new(
            "swen_retransmissions_total",
            "Association packets resent by the retry timer",
        )
        .expect("valid counter opts");
        let pool_exhaustion = Counter::new(
            "swen_pool_exhaustion_total",
            "Allocation attempts that found the packet pool empty",
        )
        .expect("valid counter opts");

        for c in [
            &frames_tx,
            &frames_rx,
            &checksum_drops,
            &retransmissions,
            &pool_exhaustion,
        ] {
            registry
                .register(Box::new(c.clone()))
                .expect("counter registers once");
        }

        Self {
            registry,
            frames_tx,
            frames_rx,
            checksum_drops,
            retransmissions,
            pool_exhaustion,
        }
    }

    /// Renders all counters in the Prometheus text format.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_and_render() {
        let metrics = MetricsRecorder::new();
        metrics.frames_tx.inc();
        metrics.frames_tx.inc();
        metrics.retransmissions.inc();
        assert_eq!(metrics.frames_tx.get() as u64, 2);
        let text = metrics.gather().unwrap();
        assert!(text.contains("swen_frames_tx_total 2"));
        assert!(text.contains("swen_retransmissions_total 1"));
    }
}
