//! Configuration management for the banknote simulator

use crate::crypto::{CryptoService, WorkerPool};
use crate::error::ChainError;
use crate::validator::NetworkParams;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "banknote.toml";

/// Upper bound on simulated transfers per run.
pub const MAX_TRANSFERS: u32 = 1000;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub crypto: CryptoConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_node_count")]
    pub node_count: u32,
    #[serde(default = "default_avg_connections")]
    pub avg_connections: f64,
    #[serde(default = "default_max_delay")]
    pub max_delay: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CryptoConfig {
    /// Worker threads for batched crypto; 0 picks `min(available_parallelism, 8)`.
    #[serde(default)]
    pub workers: usize,
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
    #[serde(default = "default_offload")]
    pub offload: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Path to a chain definition file; empty uses the built-in definition.
    #[serde(default)]
    pub definition: String,
    #[serde(default = "default_serial")]
    pub serial: String,
    #[serde(default = "default_transfers")]
    pub transfers: u32,
    #[serde(default = "default_receive_delay")]
    pub receive_delay: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            node_count: default_node_count(),
            avg_connections: default_avg_connections(),
            max_delay: default_max_delay(),
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            task_timeout_secs: default_task_timeout_secs(),
            offload: default_offload(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            definition: String::new(),
            serial: default_serial(),
            transfers: default_transfers(),
            receive_delay: default_receive_delay(),
        }
    }
}

impl NetworkConfig {
    pub fn params(&self) -> NetworkParams {
        NetworkParams::new(self.node_count, self.avg_connections, self.max_delay)
    }
}

impl CryptoConfig {
    /// Builds the crypto service this configuration describes.
    pub fn build_service(&self) -> Result<CryptoService, ChainError> {
        let service = CryptoService::new()
            .with_task_timeout(Duration::from_secs(self.task_timeout_secs));
        if !self.offload {
            return Ok(service);
        }
        let workers = match self.workers {
            0 => WorkerPool::default_size(),
            n => n,
        };
        let pool = WorkerPool::new(workers)?;
        Ok(service.with_executor(Arc::new(pool)))
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), ChainError> {
        if self.crypto.task_timeout_secs == 0 {
            return Err(ChainError::Config(
                "crypto.task_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.simulation.transfers > MAX_TRANSFERS {
            return Err(ChainError::Config(format!(
                "simulation.transfers must be at most {}",
                MAX_TRANSFERS
            )));
        }
        if self.simulation.serial.trim().is_empty() {
            return Err(ChainError::Config("simulation.serial must be set".to_string()));
        }
        Ok(())
    }

    pub fn from_toml(input: &str) -> Result<Self, ChainError> {
        let config: SimConfig =
            toml::from_str(input).map_err(|e| ChainError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

/// Loads `path`, falling back to defaults when the file does not exist.
pub fn load_config(path: impl AsRef<Path>) -> Result<SimConfig, ChainError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(SimConfig::default());
    }
    let config_str = fs::read_to_string(path)?;
    SimConfig::from_toml(&config_str)
}

fn default_node_count() -> u32 {
    10
}

fn default_avg_connections() -> f64 {
    3.0
}

fn default_max_delay() -> f64 {
    9.0
}

fn default_task_timeout_secs() -> u64 {
    30
}

fn default_offload() -> bool {
    true
}

fn default_serial() -> String {
    "1".to_string()
}

fn default_transfers() -> u32 {
    3
}

fn default_receive_delay() -> u64 {
    5
}
