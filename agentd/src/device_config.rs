//! Minimal JSON device-configuration loader.
//!
//! Parsing the real MTConnect device-XML format is out of scope for this
//! crate (see [`crate::cli::RunOpts::device_config`]'s help text); this
//! loader stands in for that collaborator by deserializing directly into
//! the core's own [`mtc_core::model::device::DeviceSpec`]/`ComponentSpec`/
//! `DataItemSpec` types, so there is no separate mirror schema to keep in
//! sync.

use std::path::Path;

use mtc_core::error::{AgentError, Result};
use mtc_core::model::device::{DeviceCatalog, DeviceCatalogBuilder, DeviceSpec};
use serde::Deserialize;

/// Top-level shape of a device-configuration file: a bare list of devices.
#[derive(Debug, Deserialize)]
struct DeviceConfigFile {
    devices: Vec<DeviceSpec>,
}

/// Load a device-configuration JSON file and build a validated catalog
/// from it.
pub fn load(path: &Path) -> Result<DeviceCatalog> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| AgentError::ConfigError(format!("reading device config {}: {}", path.display(), e)))?;
    let file: DeviceConfigFile = serde_json::from_str(&text)
        .map_err(|e| AgentError::ConfigError(format!("parsing device config {}: {}", path.display(), e)))?;

    let mut builder = DeviceCatalogBuilder::new();
    for device in file.devices {
        builder.add_device(device);
    }
    builder.build()
}
