//! The trait boundary at which a real MTConnect XML/XSD serializer
//! attaches. Full schema conformance is the named-out-of-scope serializer
//! collaborator; this module ships one minimal, explicitly
//! non-conformant renderer so the HTTP binding is exercisable end-to-end.

use mtc_core::agent::{ResponseHeader, SampleResult};
use mtc_core::checkpoint::Checkpoint;
use mtc_core::model::device::Device;

/// Produces response documents from core query results. A real
/// implementation renders MTConnect-conformant XML per the device
/// schema; `JsonDocumentSerializer` below renders a structurally
/// equivalent JSON document instead, which is sufficient to prove the
/// facade is wired correctly but is not an MTConnect document.
pub trait DocumentSerializer: Send + Sync {
    fn devices(&self, header: &ResponseHeader, devices: &[&Device]) -> serde_json::Value;
    fn current(&self, header: &ResponseHeader, at_seq: u64, checkpoint: &Checkpoint) -> serde_json::Value;
    fn sample(&self, header: &ResponseHeader, result: &SampleResult) -> serde_json::Value;
    fn assets(&self, assets: &[mtc_core::assets::Asset]) -> serde_json::Value;
    fn error(&self, code: &str, message: &str) -> serde_json::Value;
}

/// The one concrete serializer shipped here.
pub struct JsonDocumentSerializer;

fn header_json(header: &ResponseHeader) -> serde_json::Value {
    serde_json::json!({
        "instanceId": header.instance_id,
        "bufferSize": header.buffer_size,
        "firstSequence": header.first_sequence,
        "nextSequence": header.next_sequence,
        "lastSequence": header.last_sequence,
        "creationTime": header.creation_time.to_rfc3339(),
    })
}

impl DocumentSerializer for JsonDocumentSerializer {
    fn devices(&self, header: &ResponseHeader, devices: &[&Device]) -> serde_json::Value {
        let devices_json: Vec<_> = devices
            .iter()
            .map(|d| {
                serde_json::json!({
                    "id": d.id(),
                    "name": d.name(),
                    "uuid": d.uuid(),
                })
            })
            .collect();
        serde_json::json!({ "header": header_json(header), "devices": devices_json })
    }

    fn current(&self, header: &ResponseHeader, at_seq: u64, checkpoint: &Checkpoint) -> serde_json::Value {
        let observations: Vec<_> = checkpoint
            .to_observations()
            .into_iter()
            .map(|o| {
                serde_json::json!({
                    "dataItemId": o.data_item_id,
                    "sequence": o.sequence,
                    "timestamp": o.timestamp.to_rfc3339(),
                    "value": format!("{:?}", o.value),
                })
            })
            .collect();
        serde_json::json!({ "header": header_json(header), "sequence": at_seq, "observations": observations })
    }

    fn sample(&self, header: &ResponseHeader, result: &SampleResult) -> serde_json::Value {
        let observations: Vec<_> = result
            .observations
            .iter()
            .map(|o| {
                serde_json::json!({
                    "dataItemId": o.data_item_id,
                    "sequence": o.sequence,
                    "timestamp": o.timestamp.to_rfc3339(),
                    "value": format!("{:?}", o.value),
                })
            })
            .collect();
        serde_json::json!({
            "header": header_json(header),
            "firstSequence": result.first_sequence,
            "nextSequence": result.next_sequence,
            "lastSequence": result.last_sequence,
            "observations": observations,
        })
    }

    fn assets(&self, assets: &[mtc_core::assets::Asset]) -> serde_json::Value {
        let assets_json: Vec<_> = assets
            .iter()
            .map(|a| {
                serde_json::json!({
                    "assetId": a.asset_id,
                    "type": a.asset_type,
                    "deviceUuid": a.device_uuid,
                    "timestamp": a.timestamp.to_rfc3339(),
                    "removed": a.removed,
                    "body": a.body,
                })
            })
            .collect();
        serde_json::json!({ "assets": assets_json })
    }

    fn error(&self, code: &str, message: &str) -> serde_json::Value {
        serde_json::json!({ "code": code, "message": message })
    }
}
