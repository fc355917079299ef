//! Association-layer configuration: retry budget, timing, encryption key.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::ConfigError;
use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct L3Config {
    /// Times a frame is resent before the association errors and restarts.
    #[serde(default = "default_retry_max")]
    #[validate(range(min = 1, max = 100))]
    pub retry_max: u8,

    /// Ticks between retransmissions (one second at the default tick rate).
    #[serde(default = "default_retry_interval_ticks")]
    #[validate(range(min = 1, max = 1024))]
    pub retry_interval_ticks: u32,

    /// Seed for the association-syn jitter.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Optional 16-byte XTEA association key, 32 hex characters. Absent
    /// means plaintext association headers.
    #[serde(default)]
    #[validate(custom(function = validation::validate_key_hex))]
    pub key: Option<String>,
}

fn default_retry_max() -> u8 {
    15
}

fn default_retry_interval_ticks() -> u32 {
    8
}

fn default_seed() -> u64 {
    42
}

impl Default for L3Config {
    fn default() -> Self {
        Self {
            retry_max: default_retry_max(),
            retry_interval_ticks: default_retry_interval_ticks(),
            seed: default_seed(),
            key: None,
        }
    }
}

impl L3Config {
    /// Decodes the configured key, if any.
    pub fn key_bytes(&self) -> Result<Option<[u8; 16]>, ConfigError> {
        let Some(key) = &self.key else {
            return Ok(None);
        };
        let bytes = hex::decode(key).map_err(|_| ConfigError::BadKey)?;
        let key: [u8; 16] = bytes.try_into().map_err(|_| ConfigError::BadKey)?;
        Ok(Some(key))
    }
}
