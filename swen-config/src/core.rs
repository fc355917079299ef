//! Runtime substrate sizing: packet pool, scheduler rings, timer tick rate.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

/// Core runtime configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct CoreConfig {
    /// Number of packets in the pool (slot indices are u8).
    #[serde(default = "default_pool_packets")]
    #[validate(range(min = 1, max = 254))]
    pub pool_packets: usize,

    /// Backing buffer size of each packet, in bytes.
    #[serde(default = "default_pkt_size")]
    #[validate(range(min = 16, max = 2048))]
    pub pkt_size: usize,

    /// Reserve one extra packet for protocol control frames under
    /// exhaustion.
    #[serde(default = "default_true")]
    pub emergency_packet: bool,

    /// Capacity of the interrupt-context task ring (power of two).
    #[serde(default = "default_ring")]
    #[validate(range(min = 2, max = 65536))]
    #[validate(custom(function = validation::validate_power_of_two))]
    pub irq_ring: usize,

    /// Capacity of the task-context ring (power of two).
    #[serde(default = "default_ring")]
    #[validate(range(min = 2, max = 65536))]
    #[validate(custom(function = validation::validate_power_of_two))]
    pub task_ring: usize,

    /// Irq-ring occupancy at which the interrupt source is masked.
    #[serde(default = "default_high_water")]
    pub high_water: usize,

    /// What to do when a task ring is full: `drop` or `abort`.
    #[serde(default = "default_overflow")]
    #[validate(custom(function = validation::validate_overflow_policy))]
    pub overflow: String,

    /// Hardware timer ticks per second; the wheel advances one bucket per
    /// tick.
    #[serde(default = "default_ticks_per_second")]
    #[validate(range(min = 1, max = 1000))]
    pub ticks_per_second: u32,
}

fn default_pool_packets() -> usize {
    16
}

fn default_pkt_size() -> usize {
    128
}

fn default_true() -> bool {
    true
}

fn default_ring() -> usize {
    16
}

fn default_high_water() -> usize {
    12
}

fn default_overflow() -> String {
    "drop".into()
}

fn default_ticks_per_second() -> u32 {
    8
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            pool_packets: default_pool_packets(),
            pkt_size: default_pkt_size(),
            emergency_packet: default_true(),
            irq_ring: default_ring(),
            task_ring: default_ring(),
            high_water: default_high_water(),
            overflow: default_overflow(),
            ticks_per_second: default_ticks_per_second(),
        }
    }
}
