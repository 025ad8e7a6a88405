//! The single entry point that binds the buffer, device catalog, and
//! asset store together and exposes the probe/current/sample/stream/asset
//! operations an HTTP (or any other) binding calls into.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::assets::{Asset, AssetStore};
use crate::buffer::CircularBuffer;
use crate::checkpoint::Checkpoint;
use crate::config::AgentConfig;
use crate::error::{AgentError, Result};
use crate::model::device::DeviceCatalog;
use crate::observation::Observation;
use crate::observer::{ChangeObserver, WaitEvent};

/// Result of a `sample`/`stream` read: a contiguous slice of the history
/// plus the cursor bookkeeping a client needs to page further.
#[derive(Debug, Clone)]
pub struct SampleResult {
    pub first_sequence: u64,
    pub next_sequence: u64,
    pub last_sequence: u64,
    pub observations: Vec<Observation>,
}

/// Header fields every streaming/ranged response carries, independent of
/// the concrete document format a serializer collaborator renders.
#[derive(Debug, Clone)]
pub struct ResponseHeader {
    pub instance_id: i64,
    pub buffer_size: usize,
    pub first_sequence: u64,
    pub next_sequence: u64,
    pub last_sequence: u64,
    pub creation_time: chrono::DateTime<Utc>,
}

/// The MTConnect Agent facade: owns the device catalog, the circular
/// buffer, and the asset store, and is the sole entry point an HTTP
/// binding or adapter client calls into.
pub struct Agent {
    pub config: AgentConfig,
    pub catalog: Arc<DeviceCatalog>,
    pub buffer: Arc<CircularBuffer>,
    pub assets: Arc<AssetStore>,
    instance_id: i64,
}

impl Agent {
    pub fn new(config: AgentConfig, catalog: Arc<DeviceCatalog>, instance_id: i64) -> Result<Self> {
        config.validate()?;
        let buffer = Arc::new(CircularBuffer::new(config.buffer_size, config.checkpoint_frequency));
        let assets = Arc::new(AssetStore::new(config.max_assets));
        Ok(Agent { config, catalog, buffer, assets, instance_id })
    }

    pub fn header(&self) -> ResponseHeader {
        ResponseHeader {
            instance_id: self.instance_id,
            buffer_size: self.buffer.capacity(),
            first_sequence: self.buffer.first_sequence(),
            next_sequence: self.buffer.next_sequence(),
            last_sequence: self.buffer.next_sequence().saturating_sub(1),
            creation_time: Utc::now(),
        }
    }

    /// Read-only view of the device tree; `device_name` restricts to a
    /// single device when present.
    pub fn probe(&self, device_name: Option<&str>) -> Result<Vec<&crate::model::device::Device>> {
        match device_name {
            Some(name) => {
                let device =
                    self.catalog.device_by_name(name).ok_or_else(|| AgentError::UnknownDevice(name.to_string()))?;
                Ok(vec![device])
            }
            None => Ok(self.catalog.devices().iter().collect()),
        }
    }

    fn resolve_filter(&self, device_name: Option<&str>, path_filter: &[String]) -> Result<Vec<String>> {
        // Path filter is applied first (restricting to a DataItem-id set);
        // any additional category-based restriction is layered on top of
        // that already-restricted set by the caller.
        if !path_filter.is_empty() {
            return Ok(path_filter.to_vec());
        }
        match device_name {
            Some(name) => {
                let device =
                    self.catalog.device_by_name(name).ok_or_else(|| AgentError::UnknownDevice(name.to_string()))?;
                Ok(device.all_data_items().map(|i| i.id.clone()).collect())
            }
            None => Ok(Vec::new()),
        }
    }

    pub fn current(&self, device_name: Option<&str>, path_filter: &[String], at_seq: Option<u64>) -> Result<(u64, Checkpoint)> {
        let filter = self.resolve_filter(device_name, path_filter)?;
        self.buffer.current(&filter, at_seq)
    }

    pub fn sample(
        &self,
        device_name: Option<&str>,
        path_filter: &[String],
        from: u64,
        count: usize,
    ) -> Result<SampleResult> {
        if count == 0 || count > self.config.max_sample_count {
            return Err(AgentError::TooLarge { requested: count, max: self.config.max_sample_count });
        }
        if from != 0 && from < self.buffer.first_sequence() {
            return Err(AgentError::OutOfRange(from));
        }
        let filter = self.resolve_filter(device_name, path_filter)?;
        let (observations, next_sequence) = self.buffer.range(from, count, &filter);
        Ok(SampleResult {
            first_sequence: self.buffer.first_sequence(),
            next_sequence,
            last_sequence: self.buffer.next_sequence().saturating_sub(1),
            observations,
        })
    }

    /// Subscribe a streaming reader starting at `from`, restricted to the
    /// resolved filter. The caller alternates `observer.wait` with
    /// `sample` from the observer's cursor.
    pub fn subscribe(&self, device_name: Option<&str>, path_filter: &[String], from: u64) -> Result<ChangeObserver> {
        let filter = self.resolve_filter(device_name, path_filter)?;
        let ids = if filter.is_empty() {
            self.catalog.devices().iter().flat_map(|d| d.all_data_items().map(|i| i.id.clone())).collect()
        } else {
            filter
        };
        Ok(self.buffer.subscribe(&ids, from))
    }

    /// Drive one streaming chunk: wait for data/heartbeat/timeout, then
    /// return the sample range if data arrived.
    pub async fn stream_once(
        &self,
        observer: &mut ChangeObserver,
        device_name: Option<&str>,
        path_filter: &[String],
        heartbeat: Duration,
        timeout: Duration,
    ) -> Result<Option<SampleResult>> {
        match observer.wait(timeout, heartbeat).await {
            WaitEvent::DataReady => {
                let result = self.sample(device_name, path_filter, observer.cursor(), self.config.max_sample_count)?;
                observer.advance_cursor(result.next_sequence.saturating_sub(1).max(observer.cursor()));
                Ok(Some(result))
            }
            WaitEvent::Heartbeat => Ok(None),
            WaitEvent::Timeout => Err(AgentError::AdapterDisconnected("stream timed out waiting for data".into())),
        }
    }

    /// Store an asset and emit the owning device's `AssetChanged`
    /// observation, plus `AssetRemoved` for any asset evicted to make room.
    /// Returns the evicted id, if any.
    pub fn put_asset(&self, asset: Asset) -> Option<String> {
        let device_uuid = asset.device_uuid.clone();
        let asset_id = asset.asset_id.clone();
        let asset_type = asset.asset_type.clone();
        let evicted = self.assets.put(asset);

        if let Some(item) = self.asset_data_item(device_uuid.as_deref(), "ASSET_CHANGED") {
            if let Some(obs) = item.apply_scalar(&format!("{asset_id}|{asset_type}"), Utc::now(), false) {
                self.buffer.push(obs);
            }
        }
        if let Some(victim) = &evicted {
            if let Some(item) = self.asset_data_item(device_uuid.as_deref(), "ASSET_REMOVED") {
                if let Some(obs) = item.apply_scalar(victim, Utc::now(), false) {
                    self.buffer.push(obs);
                }
            }
        }
        evicted
    }

    /// Remove an asset and emit `AssetRemoved` for it on its owning device.
    pub fn delete_asset(&self, id: &str) -> Result<Asset> {
        let asset = self.remove_asset(id)?;
        if let Some(item) = self.asset_data_item(asset.device_uuid.as_deref(), "ASSET_REMOVED") {
            if let Some(obs) = item.apply_scalar(&asset.asset_id, Utc::now(), false) {
                self.buffer.push(obs);
            }
        }
        Ok(asset)
    }

    /// Find the `AssetChanged`/`AssetRemoved` DataItem (by `data_type`) on
    /// the device matching `device_uuid`, or the only device when there is
    /// exactly one and no uuid was given.
    fn asset_data_item(&self, device_uuid: Option<&str>, data_type: &str) -> Option<Arc<crate::model::data_item::DataItem>> {
        let device = match device_uuid {
            Some(uuid) => self.catalog.devices().iter().find(|d| d.uuid() == Some(uuid)),
            None => {
                let devices = self.catalog.devices();
                if devices.len() == 1 {
                    devices.first()
                } else {
                    None
                }
            }
        }?;
        device.all_data_items().find(|i| i.data_type == data_type).cloned()
    }

    pub fn get_asset(&self, id: &str) -> Result<Asset> {
        self.assets.get(id).ok_or_else(|| AgentError::UnknownAsset(id.to_string()))
    }

    pub fn remove_asset(&self, id: &str) -> Result<Asset> {
        self.assets.remove(id).ok_or_else(|| AgentError::UnknownAsset(id.to_string()))
    }

    pub fn list_assets(&self, asset_type: Option<&str>, device_uuid: Option<&str>, count: usize) -> Vec<Asset> {
        self.assets.list(asset_type, device_uuid, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::data_item::{Category, Constraints, DataItemSpec, FilterSpec, Representation};
    use crate::model::device::{ComponentSpec, DeviceCatalogBuilder, DeviceSpec};
    use crate::observation::ObservationValue;

    fn one_device_catalog() -> Arc<DeviceCatalog> {
        let mut builder = DeviceCatalogBuilder::new();
        builder.add_device(DeviceSpec {
            root: ComponentSpec {
                id: "dev1".into(),
                name: Some("Mill".into()),
                uuid: Some("mill-uuid".into()),
                component_type: "Device".into(),
                children: vec![],
                data_items: vec![DataItemSpec {
                    id: "x1".into(),
                    name: Some("X".into()),
                    source: None,
                    category: Category::Event,
                    representation: Representation::Value,
                    data_type: "EXECUTION".into(),
                    sub_type: None,
                    native_units: None,
                    native_scale: None,
                    discrete: false,
                    three_d: false,
                    filter: FilterSpec::default(),
                    constraints: Constraints::default(),
                    reset_trigger: None,
                    initial_value: None,
                }],
            },
        });
        Arc::new(builder.build().unwrap())
    }

    #[test]
    fn simple_ingestion_dedup_s1() {
        let catalog = one_device_catalog();
        let config = AgentConfig { buffer_size: 8, checkpoint_frequency: 2, ..AgentConfig::default() };
        let agent = Agent::new(config, catalog.clone(), 1).unwrap();
        let device = catalog.device_by_name("Mill").unwrap();
        let item = device.data_item_by_id("x1").unwrap();

        let t = Utc::now();
        if let Some(obs) = item.apply_scalar("RUNNING", t, true) {
            agent.buffer.push(obs);
        }
        if let Some(obs) = item.apply_scalar("RUNNING", t, true) {
            agent.buffer.push(obs);
        }
        if let Some(obs) = item.apply_scalar("STOPPED", t, true) {
            agent.buffer.push(obs);
        }

        assert_eq!(agent.buffer.next_sequence(), 2);
        let result = agent.sample(None, &[], 0, 10).unwrap();
        assert_eq!(result.observations.len(), 2);
        assert_eq!(result.observations[1].value, ObservationValue::Scalar("STOPPED".into()));
    }

    #[test]
    fn out_of_range_reported_for_evicted_sequence() {
        let catalog = one_device_catalog();
        let config = AgentConfig { buffer_size: 2, checkpoint_frequency: 1, ..AgentConfig::default() };
        let agent = Agent::new(config, catalog.clone(), 1).unwrap();
        let device = catalog.device_by_name("Mill").unwrap();
        let item = device.data_item_by_id("x1").unwrap();
        for v in ["A", "B", "C", "D", "E"] {
            if let Some(obs) = item.apply_scalar(v, Utc::now(), true) {
                agent.buffer.push(obs);
            }
        }
        let result = agent.current(None, &[], Some(0));
        assert!(matches!(result, Err(AgentError::OutOfRange(0))));
    }

    #[test]
    fn put_asset_emits_asset_changed_and_removed_observations() {
        let mut builder = DeviceCatalogBuilder::new();
        builder.add_device(DeviceSpec {
            root: ComponentSpec {
                id: "dev1".into(),
                name: Some("Mill".into()),
                uuid: Some("mill-uuid".into()),
                component_type: "Device".into(),
                children: vec![],
                data_items: vec![
                    DataItemSpec {
                        id: "ac1".into(),
                        name: Some("AssetChanged".into()),
                        source: None,
                        category: Category::Event,
                        representation: Representation::Value,
                        data_type: "ASSET_CHANGED".into(),
                        sub_type: None,
                        native_units: None,
                        native_scale: None,
                        discrete: false,
                        three_d: false,
                        filter: FilterSpec::default(),
                        constraints: Constraints::default(),
                        reset_trigger: None,
                        initial_value: None,
                    },
                    DataItemSpec {
                        id: "ar1".into(),
                        name: Some("AssetRemoved".into()),
                        source: None,
                        category: Category::Event,
                        representation: Representation::Value,
                        data_type: "ASSET_REMOVED".into(),
                        sub_type: None,
                        native_units: None,
                        native_scale: None,
                        discrete: false,
                        three_d: false,
                        filter: FilterSpec::default(),
                        constraints: Constraints::default(),
                        reset_trigger: None,
                        initial_value: None,
                    },
                ],
            },
        });
        let catalog = Arc::new(builder.build().unwrap());
        let config = AgentConfig { buffer_size: 8, max_assets: 1, checkpoint_frequency: 2, ..AgentConfig::default() };
        let agent = Agent::new(config, catalog.clone(), 1).unwrap();

        agent.put_asset(crate::assets::Asset {
            asset_id: "A1".into(),
            asset_type: "CuttingTool".into(),
            device_uuid: Some("mill-uuid".into()),
            timestamp: Utc::now(),
            removed: false,
            body: "<a/>".into(),
        });
        let evicted = agent.put_asset(crate::assets::Asset {
            asset_id: "A2".into(),
            asset_type: "CuttingTool".into(),
            device_uuid: Some("mill-uuid".into()),
            timestamp: Utc::now(),
            removed: false,
            body: "<a/>".into(),
        });
        assert_eq!(evicted.as_deref(), Some("A1"));

        let device = catalog.device_by_name("Mill").unwrap();
        let changed = device.data_item_by_id("ac1").unwrap();
        let removed = device.data_item_by_id("ar1").unwrap();
        let (_, checkpoint) = agent.current(None, &[changed.id.clone(), removed.id.clone()], None).unwrap();
        let observations = checkpoint.to_observations();
        assert_eq!(observations.len(), 2);
    }
}
