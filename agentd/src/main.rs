//! Composition root: parses CLI flags, loads the device catalog, wires the
//! core `Agent` facade to the adapter pool and the HTTP surface. Grounded
//! on the teacher's `node/src/main.rs`: parse opts, init logging first
//! thing, build components, run until a signal.

mod cli;
mod device_config;
mod logging;

use std::sync::Arc;

use clap::Parser;
use mtc_core::adapter::client::AdapterPool;
use mtc_core::agent::Agent;
use mtc_core::config::{AdapterConfig, AgentConfig};
use mtc_api::serialize::JsonDocumentSerializer;

use crate::cli::RunOpts;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = RunOpts::parse();
    logging::init(opts.log_json, opts.log_color);

    let catalog = Arc::new(device_config::load(&opts.device_config)?);

    let buffer_size = opts.buffer_size;
    let config = AgentConfig {
        buffer_size,
        max_assets: opts.max_assets,
        checkpoint_frequency: opts.checkpoint_frequency.unwrap_or_else(|| (buffer_size / 16).max(1)),
        legacy_timeout_ms: opts.legacy_timeout_ms,
        ignore_timestamps: opts.ignore_timestamps,
        upcase_data_item_value: opts.upcase_data_item_value,
        filter_duplicates: !opts.no_filter_duplicates,
        adapters: opts
            .adapters
            .iter()
            .map(|a| AdapterConfig {
                host: a.host.clone(),
                port: a.port,
                device_name: a.device_name.clone(),
                additional_devices: Vec::new(),
                auto_available: true,
                relative_time: false,
                reconnect_interval_ms: opts.reconnect_interval_ms,
            })
            .collect(),
        ..AgentConfig::default()
    };

    let instance_id = chrono::Utc::now().timestamp_millis();
    let agent_config = Arc::new(config.clone());
    let agent = Arc::new(Agent::new(config.clone(), catalog.clone(), instance_id)?);

    let mut pool = AdapterPool::new();
    for adapter_config in &agent_config.adapters {
        pool.spawn(
            adapter_config.clone(),
            agent_config.clone(),
            catalog.clone(),
            agent.buffer.clone(),
            agent.assets.clone(),
        );
    }

    let serializer = Arc::new(JsonDocumentSerializer);

    let shutdown = tokio::signal::ctrl_c();
    tokio::select! {
        _ = mtc_api::run(opts.bind, agent.clone(), serializer) => {}
        _ = shutdown => {
            tracing::info!("shutdown signal received");
        }
    }

    pool.stop_all();
    Ok(())
}
