//! Core-facing configuration, independent of how it was sourced (CLI
//! flags, environment, or a config file) — that sourcing lives in the
//! `agentd` binary's CLI layer.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    pub host: String,
    pub port: u16,
    pub device_name: String,
    #[serde(default)]
    pub additional_devices: Vec<String>,
    #[serde(default = "default_true")]
    pub auto_available: bool,
    #[serde(default)]
    pub relative_time: bool,
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_reconnect_interval_ms() -> u64 {
    10_000
}

impl AdapterConfig {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub buffer_size: usize,
    pub max_assets: usize,
    pub checkpoint_frequency: usize,
    pub legacy_timeout_ms: u64,
    pub ignore_timestamps: bool,
    pub conversion_required: bool,
    pub upcase_data_item_value: bool,
    pub filter_duplicates: bool,
    pub max_sample_count: usize,
    pub adapters: Vec<AdapterConfig>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            buffer_size: 131_072,
            max_assets: 1024,
            checkpoint_frequency: 131_072 / 16,
            legacy_timeout_ms: 600_000,
            ignore_timestamps: false,
            conversion_required: true,
            upcase_data_item_value: false,
            filter_duplicates: true,
            max_sample_count: 100_000,
            adapters: Vec::new(),
        }
    }
}

impl AgentConfig {
    /// Validate cross-field invariants the CLI/env layer can't express on
    /// its own (e.g. stride must evenly divide the buffer).
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(AgentError::ConfigError("buffer_size must be non-zero".into()));
        }
        if self.checkpoint_frequency == 0 {
            return Err(AgentError::ConfigError("checkpoint_frequency must be non-zero".into()));
        }
        if self.buffer_size % self.checkpoint_frequency != 0 {
            return Err(AgentError::ConfigError(
                "checkpoint_frequency must evenly divide buffer_size".into(),
            ));
        }
        if self.max_assets == 0 {
            return Err(AgentError::ConfigError("max_assets must be non-zero".into()));
        }
        Ok(())
    }

    pub fn legacy_timeout(&self) -> Duration {
        Duration::from_millis(self.legacy_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(AgentConfig::default().validate().is_ok());
    }

    #[test]
    fn non_dividing_stride_is_rejected() {
        let mut cfg = AgentConfig::default();
        cfg.buffer_size = 100;
        cfg.checkpoint_frequency = 7;
        assert!(cfg.validate().is_err());
    }
}
