//! Link-layer configuration: interface rx rings and the generic-command
//! log.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct LinkConfig {
    /// Capacity of each interface's receive ring (power of two).
    #[serde(default = "default_rx_ring")]
    #[validate(range(min = 2, max = 4096))]
    #[validate(custom(function = validation::validate_power_of_two))]
    pub rx_ring: usize,

    /// Size in bytes of the non-volatile generic-command log.
    #[serde(default = "default_cmd_log_size")]
    #[validate(range(min = 16, max = 65536))]
    pub cmd_log_size: usize,
}

fn default_rx_ring() -> usize {
    16
}

fn default_cmd_log_size() -> usize {
    512
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            rx_ring: default_rx_ring(),
            cmd_log_size: default_cmd_log_size(),
        }
    }
}
