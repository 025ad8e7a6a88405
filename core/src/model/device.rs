//! Device/Component tree and the catalog-wide indices over it.
//!
//! Construction is two-phase: a `DeviceCatalogBuilder` collects
//! plain-data specs from an external (XML-parsing) collaborator, then
//! `build()` validates the whole-catalog invariants in one pass and
//! freezes the result. This mirrors the teacher's validate-then-apply
//! settings pattern rather than allowing partially built catalogs to be
//! observed.

use std::collections::HashMap;
use std::sync::Arc;

use fnv::FnvHashMap;
use serde::Deserialize;

use crate::error::{AgentError, Result};
use crate::model::data_item::{DataItem, DataItemSpec};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
    pub component_type: String,
    #[serde(default)]
    pub children: Vec<ComponentSpec>,
    #[serde(default)]
    pub data_items: Vec<DataItemSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSpec {
    pub root: ComponentSpec,
}

/// A node in the Device/Component tree. The root node of a device's tree
/// is itself a Component with `component_type == "Device"`.
pub struct Component {
    pub id: String,
    pub name: Option<String>,
    pub uuid: Option<String>,
    pub component_type: String,
    pub children: Vec<Component>,
    pub data_items: Vec<Arc<DataItem>>,
}

impl Component {
    fn from_spec(spec: ComponentSpec) -> Self {
        Component {
            id: spec.id,
            name: spec.name,
            uuid: spec.uuid,
            component_type: spec.component_type,
            children: spec.children.into_iter().map(Component::from_spec).collect(),
            data_items: spec.data_items.into_iter().map(|s| Arc::new(DataItem::from_spec(s))).collect(),
        }
    }

    fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Component)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }
}

/// One Device's full tree plus the O(1) indices over it.
pub struct Device {
    pub root: Component,
    by_id: HashMap<String, Arc<DataItem>>,
    by_name: HashMap<String, Arc<DataItem>>,
    by_source: FnvHashMap<String, Arc<DataItem>>,
}

impl Device {
    pub fn name(&self) -> Option<&str> {
        self.root.name.as_deref()
    }

    pub fn uuid(&self) -> Option<&str> {
        self.root.uuid.as_deref()
    }

    pub fn id(&self) -> &str {
        &self.root.id
    }

    pub fn data_item_by_id(&self, id: &str) -> Option<&Arc<DataItem>> {
        self.by_id.get(id)
    }

    pub fn data_item_by_name(&self, name: &str) -> Option<&Arc<DataItem>> {
        self.by_name.get(name)
    }

    /// Look up a DataItem by the key an adapter feeds on the wire: its
    /// effective source key (source, falling back to name, then id).
    pub fn data_item_by_source(&self, source: &str) -> Option<&Arc<DataItem>> {
        self.by_source.get(source)
    }

    pub fn all_data_items(&self) -> impl Iterator<Item = &Arc<DataItem>> {
        self.by_id.values()
    }
}

/// Accumulates device specs from an external device-configuration
/// collaborator and validates/freezes them as a catalog.
#[derive(Default)]
pub struct DeviceCatalogBuilder {
    devices: Vec<DeviceSpec>,
}

impl DeviceCatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_device(&mut self, spec: DeviceSpec) -> &mut Self {
        self.devices.push(spec);
        self
    }

    pub fn build(self) -> Result<DeviceCatalog> {
        let mut devices = Vec::with_capacity(self.devices.len());
        let mut global_ids: HashMap<String, ()> = HashMap::new();
        // Catalog-wide: a DataItem id or source key must be unique across
        // every device, not just within the device that declares it.
        let mut seen_ids = std::collections::HashSet::new();
        let mut seen_sources = std::collections::HashSet::new();

        for spec in self.devices {
            let root = Component::from_spec(spec.root);
            let mut by_id = HashMap::new();
            let mut by_name = HashMap::new();
            let mut by_source: FnvHashMap<String, Arc<DataItem>> = FnvHashMap::default();

            root.walk(&mut |component| {
                for item in &component.data_items {
                    by_id.insert(item.id.clone(), item.clone());
                    if let Some(name) = &item.name {
                        by_name.insert(name.clone(), item.clone());
                    }
                    by_source.insert(item.source_or_name().to_string(), item.clone());
                }
            });

            let mut duplicate_id = None;
            let mut duplicate_source = None;
            root.walk(&mut |component| {
                for item in &component.data_items {
                    if !seen_ids.insert(item.id.clone()) && duplicate_id.is_none() {
                        duplicate_id = Some(item.id.clone());
                    }
                    let source = item.source_or_name().to_string();
                    if !seen_sources.insert(source.clone()) && duplicate_source.is_none() {
                        duplicate_source = Some(source);
                    }
                }
            });
            if let Some(id) = duplicate_id {
                return Err(AgentError::ConfigError(format!(
                    "duplicate DataItem id across the device catalog: {id}"
                )));
            }
            if let Some(source) = duplicate_source {
                return Err(AgentError::ConfigError(format!(
                    "DataItems with colliding source key across the device catalog: {source}"
                )));
            }
            if !global_ids.contains_key(&root.id) {
                global_ids.insert(root.id.clone(), ());
            } else {
                return Err(AgentError::ConfigError(format!("duplicate device id: {}", root.id)));
            }

            devices.push(Device { root, by_id, by_name, by_source });
        }

        Ok(DeviceCatalog { devices })
    }
}

/// The immutable, validated set of all configured devices.
pub struct DeviceCatalog {
    devices: Vec<Device>,
}

impl DeviceCatalog {
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn device_by_name(&self, name: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.name() == Some(name) || d.id() == name)
    }

    pub fn data_item_by_id(&self, id: &str) -> Option<&Arc<DataItem>> {
        self.devices.iter().find_map(|d| d.data_item_by_id(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::data_item::{Category, Constraints, FilterSpec, Representation};

    fn item(id: &str) -> DataItemSpec {
        DataItemSpec {
            id: id.into(),
            name: Some(id.into()),
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
        }
    }

    #[test]
    fn builds_indices_and_rejects_duplicate_sources() {
        let mut builder = DeviceCatalogBuilder::new();
        builder.add_device(DeviceSpec {
            root: ComponentSpec {
                id: "dev1".into(),
                name: Some("Mill".into()),
                uuid: None,
                component_type: "Device".into(),
                children: vec![],
                data_items: vec![item("x1"), item("x1")],
            },
        });
        let result = builder.build();
        assert!(result.is_err());
    }

    #[test]
    fn rejects_duplicate_id_across_devices() {
        let mut builder = DeviceCatalogBuilder::new();
        builder.add_device(DeviceSpec {
            root: ComponentSpec {
                id: "dev1".into(),
                name: Some("Mill".into()),
                uuid: None,
                component_type: "Device".into(),
                children: vec![],
                data_items: vec![item("x1")],
            },
        });
        builder.add_device(DeviceSpec {
            root: ComponentSpec {
                id: "dev2".into(),
                name: Some("Lathe".into()),
                uuid: None,
                component_type: "Device".into(),
                children: vec![],
                data_items: vec![item("x1")],
            },
        });
        assert!(builder.build().is_err());
    }

    #[test]
    fn looks_up_data_item_by_source_key() {
        let mut builder = DeviceCatalogBuilder::new();
        builder.add_device(DeviceSpec {
            root: ComponentSpec {
                id: "dev1".into(),
                name: Some("Mill".into()),
                uuid: None,
                component_type: "Device".into(),
                children: vec![],
                data_items: vec![item("x1")],
            },
        });
        let catalog = builder.build().unwrap();
        let device = catalog.device_by_name("Mill").unwrap();
        assert!(device.data_item_by_source("x1").is_some());
    }
}
