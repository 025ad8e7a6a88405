use std::sync::Arc;
use std::time::Duration;

use mtc_core::agent::Agent;
use serde::Deserialize;
use tokio_stream::wrappers::UnboundedReceiverStream;
use warp::{reply::Reply, Rejection};

use crate::rejections::reject;
use crate::serialize::DocumentSerializer;

fn split_path(path: &Option<String>) -> Vec<String> {
    path.as_ref()
        .map(|p| p.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
pub struct ProbeQuery {
    #[serde(rename = "deviceName")]
    pub device_name: Option<String>,
}

pub async fn probe(
    query: ProbeQuery,
    agent: Arc<Agent>,
    serializer: Arc<dyn DocumentSerializer>,
) -> Result<impl Reply, Rejection> {
    let devices = agent.probe(query.device_name.as_deref()).map_err(reject)?;
    Ok(warp::reply::json(&serializer.devices(&agent.header(), &devices)))
}

#[derive(Debug, Deserialize)]
pub struct CurrentQuery {
    #[serde(rename = "deviceName")]
    pub device_name: Option<String>,
    pub path: Option<String>,
    pub at: Option<u64>,
}

pub async fn current(
    query: CurrentQuery,
    agent: Arc<Agent>,
    serializer: Arc<dyn DocumentSerializer>,
) -> Result<impl Reply, Rejection> {
    let filter = split_path(&query.path);
    let (seq, checkpoint) = agent.current(query.device_name.as_deref(), &filter, query.at).map_err(reject)?;
    Ok(warp::reply::json(&serializer.current(&agent.header(), seq, &checkpoint)))
}

#[derive(Debug, Deserialize)]
pub struct SampleQuery {
    #[serde(rename = "deviceName")]
    pub device_name: Option<String>,
    pub path: Option<String>,
    #[serde(default)]
    pub from: u64,
    pub count: Option<usize>,
    pub interval: Option<u64>,
    pub heartbeat: Option<u64>,
}

pub async fn sample(
    query: SampleQuery,
    agent: Arc<Agent>,
    serializer: Arc<dyn DocumentSerializer>,
) -> Result<impl Reply, Rejection> {
    let filter = split_path(&query.path);
    let count = query.count.unwrap_or(1000).min(agent.config.max_sample_count);
    let result = agent.sample(query.device_name.as_deref(), &filter, query.from, count).map_err(reject)?;
    Ok(warp::reply::json(&serializer.sample(&agent.header(), &result)))
}

/// The streaming variant of `sample`: as soon as `interval` is present in
/// the query, the response becomes an unbounded chunked stream of sample
/// documents, separated by heartbeat delimiters while idle. A background
/// task owns the `ChangeObserver` (which is not `Clone` and borrows the
/// buffer's registry) and forwards serialized chunks over a channel,
/// avoiding a self-referential stream combinator.
pub async fn sample_stream(
    query: SampleQuery,
    agent: Arc<Agent>,
    serializer: Arc<dyn DocumentSerializer>,
) -> Result<impl Reply, Rejection> {
    let filter = split_path(&query.path);
    let heartbeat = Duration::from_millis(query.heartbeat.unwrap_or(10_000));
    let legacy_timeout = agent.config.legacy_timeout();

    let mut observer = agent.subscribe(query.device_name.as_deref(), &filter, query.from).map_err(reject)?;
    let device_name = query.device_name.clone();

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Result<Vec<u8>, std::io::Error>>();
    tokio::spawn(async move {
        loop {
            match agent.stream_once(&mut observer, device_name.as_deref(), &filter, heartbeat, legacy_timeout).await {
                Ok(Some(result)) => {
                    let doc = serializer.sample(&agent.header(), &result);
                    let bytes = serde_json::to_vec(&doc).unwrap_or_default();
                    if tx.send(Ok(bytes)).is_err() {
                        break; // client gone
                    }
                }
                Ok(None) => continue, // heartbeat tick; keep-alive wrapper emits the delimiter
                Err(_timeout) => break,
            }
        }
    });

    Ok(crate::ndjson::reply(UnboundedReceiverStream::new(rx)))
}

#[derive(Debug, Deserialize)]
pub struct AssetsQuery {
    #[serde(rename = "type")]
    pub asset_type: Option<String>,
    #[serde(rename = "deviceUuid")]
    pub device_uuid: Option<String>,
    pub count: Option<usize>,
}

pub async fn assets(
    query: AssetsQuery,
    agent: Arc<Agent>,
    serializer: Arc<dyn DocumentSerializer>,
) -> Result<impl Reply, Rejection> {
    let list = agent.list_assets(query.asset_type.as_deref(), query.device_uuid.as_deref(), query.count.unwrap_or(100));
    Ok(warp::reply::json(&serializer.assets(&list)))
}

pub async fn asset_get(
    id: String,
    agent: Arc<Agent>,
    serializer: Arc<dyn DocumentSerializer>,
) -> Result<impl Reply, Rejection> {
    let asset = agent.get_asset(&id).map_err(reject)?;
    Ok(warp::reply::json(&serializer.assets(std::slice::from_ref(&asset))))
}

#[derive(Debug, Deserialize)]
pub struct PutAssetBody {
    #[serde(rename = "type")]
    pub asset_type: String,
    #[serde(rename = "deviceUuid")]
    pub device_uuid: Option<String>,
    pub body: String,
}

pub async fn asset_put(id: String, payload: PutAssetBody, agent: Arc<Agent>) -> Result<impl Reply, Rejection> {
    let asset = mtc_core::assets::Asset {
        asset_id: id,
        asset_type: payload.asset_type,
        device_uuid: payload.device_uuid,
        timestamp: chrono::Utc::now(),
        removed: false,
        body: payload.body,
    };
    agent.put_asset(asset);
    Ok(warp::reply::with_status("", warp::http::StatusCode::NO_CONTENT))
}

pub async fn asset_remove(id: String, agent: Arc<Agent>) -> Result<impl Reply, Rejection> {
    agent.delete_asset(&id).map_err(reject)?;
    Ok(warp::reply::with_status("", warp::http::StatusCode::NO_CONTENT))
}
