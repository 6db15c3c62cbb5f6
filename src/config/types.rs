//! Configuration types

use crate::device::{BATCH_SIZE, DEFAULT_MTU};
use crate::telemetry::LogConfig;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Default capacity of the per-direction packet queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 2048;

/// User-defined configuration (config.toml)
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub forwarding: ForwardingConfig,
    /// Exactly two interfaces; the first (by name) is endpoint A
    #[serde(default = "default_interfaces")]
    pub interfaces: BTreeMap<String, InterfaceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log: LogConfig::default(),
            forwarding: ForwardingConfig::default(),
            interfaces: default_interfaces(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardingMode {
    /// Read a batch, write the same batch
    #[default]
    Direct,
    /// Reader and writer tasks joined by a bounded queue
    Queued,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ForwardingConfig {
    #[serde(default)]
    pub mode: ForwardingMode,
    /// Recycle packet buffers through a shared pool (queued mode only)
    #[serde(default)]
    pub pooled: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            mode: ForwardingMode::default(),
            pooled: false,
            batch_size: default_batch_size(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl ForwardingConfig {
    pub fn direct() -> Self {
        Self::default()
    }

    pub fn queued(pooled: bool) -> Self {
        Self {
            mode: ForwardingMode::Queued,
            pooled,
            ..Self::default()
        }
    }

    /// Pooling only takes effect together with the queued pipeline
    pub fn uses_pool(&self) -> bool {
        self.mode == ForwardingMode::Queued && self.pooled
    }

    /// Apply the `--queued` / `--pooled` command line switches.
    ///
    /// Switches only turn features on. `pooled` never changes the mode.
    pub fn apply_flags(&mut self, queued: bool, pooled: bool) {
        if queued {
            self.mode = ForwardingMode::Queued;
        }
        if pooled {
            self.pooled = true;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InterfaceConfig {
    /// Address in CIDR notation, e.g. "10.0.1.1/24"
    pub address: String,
    pub mtu: Option<u16>,
}

impl InterfaceConfig {
    pub fn mtu(&self) -> u16 {
        self.mtu.unwrap_or(DEFAULT_MTU)
    }
}

fn default_batch_size() -> usize {
    BATCH_SIZE
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_interfaces() -> BTreeMap<String, InterfaceConfig> {
    BTreeMap::from([
        (
            "tun11".to_string(),
            InterfaceConfig {
                address: "10.0.1.1/24".to_string(),
                mtu: Some(DEFAULT_MTU),
            },
        ),
        (
            "tun22".to_string(),
            InterfaceConfig {
                address: "10.0.2.1/24".to_string(),
                mtu: Some(DEFAULT_MTU),
            },
        ),
    ])
}
