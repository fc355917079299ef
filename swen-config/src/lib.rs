//! # swen-config
//!
//! Hierarchical configuration for the SWEN radio stack.
//!
//! Values merge in order: built-in defaults, `config/swen.yaml` if present,
//! then `SWEN_*` environment variables (section and field separated by
//! `__`, e.g. `SWEN_CORE__POOL_PACKETS=32`). Every loaded configuration is
//! validated before use.

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod core;
mod error;
mod l3;
mod link;
mod validation;

pub use crate::core::CoreConfig;
pub use error::ConfigError;
pub use l3::L3Config;
pub use link::LinkConfig;

/// Top-level configuration container for all SWEN components.
#[derive(Debug, Serialize, Deserialize, Validate, Default)]
pub struct SwenConfig {
    /// Runtime substrate sizing (packet pool, rings, tick rate).
    #[validate(nested)]
    pub core: CoreConfig,

    /// Link-layer parameters (rx rings, generic-command log).
    #[validate(nested)]
    pub link: LinkConfig,

    /// Association-layer parameters (retries, timing, key).
    #[validate(nested)]
    pub l3: L3Config,
}

impl SwenConfig {
    /// Loads configuration from `config/swen.yaml` (if present) and the
    /// environment, on top of built-in defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(SwenConfig::default()));
        if Path::new("config/swen.yaml").exists() {
            figment = figment.merge(Yaml::file("config/swen.yaml"));
        }
        figment
            .merge(Env::prefixed("SWEN_").split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }

    /// Loads configuration from a specific file.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(path)));
        }

        Figment::from(Serialized::defaults(SwenConfig::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("SWEN_").split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }
}
