//! End-to-end scenarios run against the public `Agent` facade (plus the
//! wire-level SHDR/asset parsing primitives for the scenario that needs
//! them), one test per named scenario.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mtc_core::adapter::shdr::{self, MultilineAccumulator};
use mtc_core::agent::Agent;
use mtc_core::assets::{Asset, AssetStore};
use mtc_core::config::AgentConfig;
use mtc_core::model::data_item::{Category, Constraints, DataItemSpec, FilterSpec, Representation};
use mtc_core::model::device::{ComponentSpec, DeviceCatalog, DeviceCatalogBuilder, DeviceSpec};
use mtc_core::observation::{ConditionActivation, ConditionLevel, ObservationValue};
use mtc_core::observer::WaitEvent;

fn data_item(id: &str, category: Category, min_delta: Option<f64>) -> DataItemSpec {
    DataItemSpec {
        id: id.into(),
        name: Some(id.into()),
        source: None,
        category,
        representation: Representation::Value,
        data_type: "EXECUTION".into(),
        sub_type: None,
        native_units: None,
        native_scale: None,
        discrete: false,
        three_d: false,
        filter: FilterSpec { min_delta, min_period_secs: None },
        constraints: Constraints::default(),
        reset_trigger: None,
        initial_value: None,
    }
}

fn one_device_catalog(items: Vec<DataItemSpec>) -> Arc<DeviceCatalog> {
    let mut builder = DeviceCatalogBuilder::new();
    builder.add_device(DeviceSpec {
        root: ComponentSpec {
            id: "dev1".into(),
            name: Some("Mill".into()),
            uuid: Some("mill-uuid".into()),
            component_type: "Device".into(),
            children: vec![],
            data_items: items,
        },
    });
    Arc::new(builder.build().unwrap())
}

/// S1 — Simple ingestion. BufferSize=8, one Event DataItem `X`. Two
/// identical `RUNNING` values dedup to one observation, then `STOPPED`
/// is a distinct third.
#[test]
fn s1_simple_ingestion() {
    let catalog = one_device_catalog(vec![data_item("x1", Category::Event, None)]);
    let config = AgentConfig { buffer_size: 8, checkpoint_frequency: 2, ..AgentConfig::default() };
    let agent = Agent::new(config, catalog.clone(), 1).unwrap();
    let device = catalog.device_by_name("Mill").unwrap();
    let item = device.data_item_by_id("x1").unwrap();

    let t = Utc::now();
    for value in ["RUNNING", "RUNNING", "STOPPED"] {
        if let Some(obs) = item.apply_scalar(value, t, true) {
            agent.buffer.push(obs);
        }
    }

    let result = agent.sample(None, &[], 0, 10).unwrap();
    assert_eq!(result.observations.len(), 2);
    assert_eq!(result.observations[0].value, ObservationValue::Scalar("RUNNING".into()));
    assert_eq!(result.observations[1].value, ObservationValue::Scalar("STOPPED".into()));
}

/// S2 — Overflow. BufferSize=4, ten pushes of a discrete (dup-allowed)
/// Event, so every push lands in the buffer. The oldest 6 are evicted.
#[test]
fn s2_overflow_evicts_oldest() {
    let mut spec = data_item("x1", Category::Event, None);
    spec.discrete = true; // allow_dups: every push is emitted, matching "10 observations" framing
    let catalog = one_device_catalog(vec![spec]);
    let config = AgentConfig { buffer_size: 4, checkpoint_frequency: 1, ..AgentConfig::default() };
    let agent = Agent::new(config, catalog.clone(), 1).unwrap();
    let device = catalog.device_by_name("Mill").unwrap();
    let item = device.data_item_by_id("x1").unwrap();

    for n in 0..10 {
        let obs = item.apply_scalar(&format!("v{n}"), Utc::now(), true).unwrap();
        agent.buffer.push(obs);
    }

    assert_eq!(agent.buffer.first_sequence(), 6);
    assert_eq!(agent.buffer.next_sequence(), 10);

    let (_, checkpoint) = agent.current(None, &[], None).unwrap();
    let observations = checkpoint.to_observations();
    assert_eq!(observations.len(), 1);
    assert_eq!(observations[0].value, ObservationValue::Scalar("v9".into()));

    let result = agent.sample(None, &[], 0, 10).unwrap();
    let values: Vec<String> = result
        .observations
        .iter()
        .map(|o| match &o.value {
            ObservationValue::Scalar(s) => s.clone(),
            other => panic!("unexpected value {other:?}"),
        })
        .collect();
    assert_eq!(values, vec!["v6", "v7", "v8", "v9"]);
}

/// S3 — Condition activation/clear. `warning` then `normal` clears it,
/// then a fresh `fault` leaves exactly one active entry at `fault`.
#[test]
fn s3_condition_activation_and_clear() {
    let catalog = one_device_catalog(vec![data_item("c1", Category::Condition, None)]);
    let config = AgentConfig { buffer_size: 8, checkpoint_frequency: 2, ..AgentConfig::default() };
    let agent = Agent::new(config, catalog.clone(), 1).unwrap();
    let device = catalog.device_by_name("Mill").unwrap();
    let item = device.data_item_by_id("c1").unwrap();

    let t = Utc::now();
    let warning = ConditionActivation {
        level: ConditionLevel::Warning,
        native_code: "100".into(),
        native_severity: Some("H".into()),
        qualifier: Some("H".into()),
        message: Some("overheat".into()),
    };
    let normal = ConditionActivation {
        level: ConditionLevel::Normal,
        native_code: "100".into(),
        native_severity: None,
        qualifier: None,
        message: None,
    };
    let fault = ConditionActivation {
        level: ConditionLevel::Fault,
        native_code: "100".into(),
        native_severity: Some("L".into()),
        qualifier: Some("L".into()),
        message: Some("overheat".into()),
    };

    agent.buffer.push(item.apply_condition(warning, t));
    agent.buffer.push(item.apply_condition(normal, t));
    agent.buffer.push(item.apply_condition(fault, t));

    let (_, checkpoint) = agent.current(None, &[], None).unwrap();
    let observations = checkpoint.to_observations();
    assert_eq!(observations.len(), 1);
    match &observations[0].value {
        ObservationValue::Condition(set) => {
            assert_eq!(set.activations.len(), 1);
            assert_eq!(set.activations[0].native_code, "100");
            assert_eq!(set.activations[0].level, ConditionLevel::Fault);
        }
        other => panic!("expected a condition value, got {other:?}"),
    }
}

/// S4 — Multiline asset. Exercises the wire-level framing the adapter
/// client applies: a `--multiline--ASSET`-delimited body round-trips
/// through the same `MultilineAccumulator` the client drives, landing in
/// the `AssetStore` unchanged.
#[test]
fn s4_multiline_asset_round_trips_through_store() {
    let body = "<Body line 1>\n<Body line 2>";
    let wire = shdr::encode_multiline("ASSET", body);
    let mut lines = wire.lines();
    let opener = lines.next().unwrap();
    let tag = shdr::multiline_tag(opener).unwrap();

    let mut acc = MultilineAccumulator::new(tag);
    let mut recovered = None;
    for line in lines {
        if let Some(b) = acc.feed(line) {
            recovered = Some(b);
            break;
        }
    }
    let body = recovered.expect("closing sentinel reached");

    let store = AssetStore::new(8);
    store.put(Asset {
        asset_id: "A1".into(),
        asset_type: "CuttingTool".into(),
        device_uuid: None,
        timestamp: Utc::now(),
        removed: false,
        body,
    });

    assert_eq!(store.get("A1").unwrap().body, "<Body line 1>\n<Body line 2>");
}

/// S5 — Sample filter min_delta=0.5. Only the first value and values that
/// cross the delta threshold since the last accepted one are emitted.
#[test]
fn s5_min_delta_filters_small_changes() {
    let catalog = one_device_catalog(vec![data_item("x1", Category::Sample, Some(0.5))]);
    let config = AgentConfig { buffer_size: 8, checkpoint_frequency: 2, ..AgentConfig::default() };
    let agent = Agent::new(config, catalog.clone(), 1).unwrap();
    let device = catalog.device_by_name("Mill").unwrap();
    let item = device.data_item_by_id("x1").unwrap();

    let t = Utc::now();
    for v in ["10.0", "10.3", "10.8", "10.9", "11.5"] {
        if let Some(obs) = item.apply_scalar(v, t, true) {
            agent.buffer.push(obs);
        }
    }

    let result = agent.sample(None, &[], 0, 10).unwrap();
    let values: Vec<f64> = result
        .observations
        .iter()
        .map(|o| match &o.value {
            ObservationValue::Sample(n) => *n,
            other => panic!("unexpected value {other:?}"),
        })
        .collect();
    assert_eq!(values, vec![10.0, 10.8, 11.5]);
}

/// S6 — Stream heartbeat. No pushes: the observer reports heartbeats
/// until its overall timeout elapses. A push during the wait is reported
/// as `DataReady` instead.
#[tokio::test]
async fn s6_stream_heartbeats_then_times_out() {
    let catalog = one_device_catalog(vec![data_item("x1", Category::Event, None)]);
    let config = AgentConfig { buffer_size: 8, checkpoint_frequency: 2, ..AgentConfig::default() };
    let agent = Agent::new(config, catalog.clone(), 1).unwrap();

    let mut observer = agent.subscribe(None, &[], agent.buffer.next_sequence()).unwrap();

    let heartbeat = Duration::from_millis(20);
    let timeout = Duration::from_millis(100);

    let mut heartbeats = 0;
    loop {
        match observer.wait(timeout, heartbeat).await {
            WaitEvent::Heartbeat => heartbeats += 1,
            WaitEvent::Timeout => break,
            WaitEvent::DataReady => panic!("no data was pushed yet"),
        }
    }
    assert!(heartbeats >= 1);

    // A push during a later wait is reported as DataReady.
    let device = catalog.device_by_name("Mill").unwrap();
    let item = device.data_item_by_id("x1").unwrap();
    let mut observer = agent.subscribe(None, &[], agent.buffer.next_sequence()).unwrap();
    let buffer = agent.buffer.clone();
    let item = item.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if let Some(obs) = item.apply_scalar("RUNNING", Utc::now(), true) {
            buffer.push(obs);
        }
    });
    match observer.wait(timeout, heartbeat).await {
        WaitEvent::DataReady => {}
        other => panic!("expected DataReady, got {other:?}"),
    }
}
