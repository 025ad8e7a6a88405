//! The reconnecting SHDR adapter client.
//!
//! Lifecycle is grounded on the teacher's `Component` trait: `start`/`stop`
//! are idempotent, the connection loop reports failures through its own
//! state rather than unwinding across a thread boundary, and the running
//! task fully owns its socket, closing it on `stop`. The teacher runs each
//! component on its own OS thread; this implementation runs each adapter
//! as its own `tokio` task instead, since the rest of the ambient stack
//! here is already `tokio`-based — see the design notes on why a task is
//! an acceptable stand-in for "its own thread" under this buffer's
//! concurrency contract.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Notify;

use crate::adapter::shdr::{self, Command, MultilineAccumulator};
use crate::assets::{Asset, AssetStore};
use crate::buffer::CircularBuffer;
use crate::config::{AdapterConfig, AgentConfig};
use crate::model::device::DeviceCatalog;
use crate::observation::{ConditionActivation, ConditionLevel};

/// What a pending multiline frame's accumulated body should be applied to
/// once its closing sentinel is seen.
#[derive(Debug, Clone)]
enum MultilineTarget {
    DataItem(String),
    Asset { asset_id: String, asset_type: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Runtime handle to a single adapter connection. Owns its task's shutdown
/// signal; dropping the handle does not stop the task, `stop()` does.
pub struct AdapterClient {
    config: AdapterConfig,
    agent_config: Arc<AgentConfig>,
    catalog: Arc<DeviceCatalog>,
    buffer: Arc<CircularBuffer>,
    assets: Arc<AssetStore>,
    status: parking_lot::Mutex<ConnectionStatus>,
    shutdown: Notify,
    stopped: AtomicBool,
}

impl AdapterClient {
    pub fn new(
        config: AdapterConfig,
        agent_config: Arc<AgentConfig>,
        catalog: Arc<DeviceCatalog>,
        buffer: Arc<CircularBuffer>,
        assets: Arc<AssetStore>,
    ) -> Arc<Self> {
        Arc::new(AdapterClient {
            config,
            agent_config,
            catalog,
            buffer,
            assets,
            status: parking_lot::Mutex::new(ConnectionStatus::Disconnected),
            shutdown: Notify::new(),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.lock()
    }

    /// Stop the client. Idempotent: a second call is a no-op.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.shutdown.notify_waiters();
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        *self.status.lock() = status;
    }

    /// Run the reconnect loop until `stop()` is called. Spawn this on a
    /// `tokio::task` per adapter; it never returns early except on stop.
    pub async fn run(self: Arc<Self>) {
        while !self.stopped.load(Ordering::SeqCst) {
            self.set_status(ConnectionStatus::Connecting);
            tracing::info!(host = %self.config.host, port = self.config.port, "connecting to adapter");

            match self.connect_and_serve().await {
                Ok(()) => {
                    tracing::info!(host = %self.config.host, "adapter connection closed");
                }
                Err(err) => {
                    tracing::warn!(host = %self.config.host, error = %err, "adapter connection failed");
                }
            }

            self.set_status(ConnectionStatus::Disconnected);
            self.emit_connection_event("CLOSED");

            if self.stopped.load(Ordering::SeqCst) {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.reconnect_interval()) => {}
                _ = self.shutdown.notified() => break,
            }
        }
    }

    async fn connect_and_serve(&self) -> crate::error::Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let stream = tokio::select! {
            result = TcpStream::connect(&addr) => result.map_err(|e| crate::error::AgentError::AdapterDisconnected(e.to_string()))?,
            _ = self.shutdown.notified() => return Ok(()),
        };

        self.set_status(ConnectionStatus::Connected);
        self.emit_connection_event("ESTABLISHED");
        if self.config.auto_available {
            self.emit_availability("AVAILABLE");
        }

        let mut lines = BufReader::new(stream).lines();
        let mut multiline: Option<(MultilineTarget, MultilineAccumulator)> = None;

        loop {
            let next = tokio::select! {
                line = lines.next_line() => line.map_err(|e| crate::error::AgentError::ProtocolError(e.to_string()))?,
                _ = self.shutdown.notified() => return Ok(()),
            };

            let Some(raw) = next else {
                return Ok(()); // EOF
            };
            if raw.is_empty() {
                continue;
            }

            if let Some((target, acc)) = multiline.as_mut() {
                if let Some(body) = acc.feed(&raw) {
                    match target {
                        MultilineTarget::DataItem(source_key) => self.apply_multiline_value(source_key, &body),
                        MultilineTarget::Asset { asset_id, asset_type } => {
                            self.apply_multiline_asset(asset_id, asset_type, &body)
                        }
                    }
                    multiline = None;
                }
                continue;
            }

            if raw.starts_with('*') {
                if let Some((asset_id, asset_type, tag)) = parse_asset_preamble(&raw) {
                    multiline = Some((
                        MultilineTarget::Asset { asset_id, asset_type },
                        MultilineAccumulator::new(tag),
                    ));
                    continue;
                }
                match shdr::parse_command(&raw, &[]) {
                    Command::Ping => { /* adapter pinged us; nothing to answer on this side */ }
                    Command::Pong(_ms) => { /* heartbeat acknowledged */ }
                    other => tracing::debug!(?other, "adapter command"),
                }
                continue;
            }

            let line = shdr::parse_line(&raw);
            let timestamp = if self.config.relative_time || self.agent_config.ignore_timestamps {
                Utc::now()
            } else {
                line.timestamp.unwrap_or_else(Utc::now)
            };

            if line.tokens.is_empty() {
                continue;
            }

            self.dispatch_tokens(&line.tokens, timestamp, &mut multiline);
        }
    }

    /// Walk the tokens after a SHDR line's timestamp, one DataItem entry at
    /// a time. Token count per entry depends on the addressed DataItem's
    /// `Category`/`Representation`/`three_d`, per SPEC_FULL.md §4.8 point 3:
    /// Condition is `level|native_code|native_severity|qualifier|message`,
    /// TimeSeries is `count|rate|v1 v2 …`, DataSet is `k1=v1 k2=v2 …`, and a
    /// 3D sample's value token is itself a space-separated `x y z` triple.
    fn dispatch_tokens(
        &self,
        tokens: &[String],
        timestamp: chrono::DateTime<Utc>,
        multiline: &mut Option<(MultilineTarget, MultilineAccumulator)>,
    ) {
        use crate::model::data_item::{Category, Representation};

        let mut i = 0;
        while i < tokens.len() {
            let source_key = &tokens[i];
            let Some(device) = self.resolve_device() else { return };
            let Some(item) = device.data_item_by_source(source_key) else {
                tracing::debug!(source_key, "observation for unknown data item dropped");
                // Without knowing the DataItem's category we cannot know how
                // many further tokens belong to this entry; conservatively
                // consume just one value token and continue.
                i += 2;
                continue;
            };

            if item.category == Category::Condition {
                if i + 5 > tokens.len() {
                    break;
                }
                let level = ConditionLevel::parse(&tokens[i + 1]).unwrap_or(ConditionLevel::Fault);
                let activation = ConditionActivation {
                    level,
                    native_code: tokens[i + 2].clone(),
                    native_severity: non_empty(&tokens[i + 3]),
                    qualifier: non_empty(&tokens[i + 4]),
                    message: tokens.get(i + 5).and_then(|s| non_empty(s)),
                };
                let obs = item.apply_condition(activation, timestamp);
                self.buffer.push(obs);
                i += 6;
                continue;
            }

            if item.three_d {
                let value = tokens.get(i + 1).cloned().unwrap_or_default();
                if let Some(tag) = shdr::multiline_tag(&value) {
                    *multiline = Some((MultilineTarget::DataItem(source_key.clone()), MultilineAccumulator::new(tag)));
                } else if let Some(components) = parse_3d(&value) {
                    let obs = item.apply_sample_3d(components, timestamp);
                    self.buffer.push(obs);
                }
                i += 2;
                continue;
            }

            match item.representation {
                Representation::TimeSeries => {
                    if i + 3 >= tokens.len() {
                        break;
                    }
                    let rate = tokens[i + 2].parse::<f64>().unwrap_or(0.0);
                    let values = parse_space_separated_f64(&tokens[i + 3]);
                    let obs = item.apply_time_series(values, rate, timestamp);
                    self.buffer.push(obs);
                    i += 4;
                }
                Representation::DataSet => {
                    let raw = tokens.get(i + 1).cloned().unwrap_or_default();
                    let entries = parse_data_set(&raw);
                    let obs = item.apply_data_set(entries, timestamp);
                    self.buffer.push(obs);
                    i += 2;
                }
                Representation::Value | Representation::Discrete => {
                    let value = tokens.get(i + 1).cloned().unwrap_or_default();
                    let value = if self.agent_config.upcase_data_item_value { value.to_uppercase() } else { value };
                    if let Some(tag) = shdr::multiline_tag(&value) {
                        *multiline =
                            Some((MultilineTarget::DataItem(source_key.clone()), MultilineAccumulator::new(tag)));
                    } else if let Some(obs) =
                        item.apply_scalar(&value, timestamp, self.agent_config.filter_duplicates)
                    {
                        self.buffer.push(obs);
                    }
                    i += 2;
                }
            }
        }
    }

    fn apply_multiline_value(&self, source_key: &str, body: &str) {
        if let Some(device) = self.resolve_device() {
            if let Some(item) = device.data_item_by_source(source_key) {
                let body = if self.agent_config.upcase_data_item_value { body.to_uppercase() } else { body.to_string() };
                if let Some(obs) = item.apply_scalar(&body, Utc::now(), self.agent_config.filter_duplicates) {
                    self.buffer.push(obs);
                }
            }
        }
    }

    fn apply_multiline_asset(&self, asset_id: &str, asset_type: &str, body: &str) {
        let device_uuid = self.resolve_device().and_then(|d| d.uuid().map(str::to_string));
        let evicted = self.assets.put(Asset {
            asset_id: asset_id.to_string(),
            asset_type: asset_type.to_string(),
            device_uuid,
            timestamp: Utc::now(),
            removed: false,
            body: body.to_string(),
        });
        if let Some(device) = self.resolve_device() {
            if let Some(item) = device.all_data_items().find(|i| i.data_type == "ASSET_CHANGED") {
                if let Some(obs) = item.apply_scalar(&format!("{asset_id}|{asset_type}"), Utc::now(), false) {
                    self.buffer.push(obs);
                }
            }
            if let Some(victim) = &evicted {
                if let Some(item) = device.all_data_items().find(|i| i.data_type == "ASSET_REMOVED") {
                    if let Some(obs) = item.apply_scalar(victim, Utc::now(), false) {
                        self.buffer.push(obs);
                    }
                }
            }
        }
        if let Some(victim) = evicted {
            tracing::debug!(asset_id = %victim, "asset evicted to make room for new asset");
        }
    }

    fn resolve_device(&self) -> Option<&crate::model::device::Device> {
        self.catalog.device_by_name(&self.config.device_name)
    }

    fn emit_connection_event(&self, state: &str) {
        if let Some(device) = self.resolve_device() {
            if let Some(item) = device.data_item_by_source("CONNECTION_STATUS") {
                if let Some(obs) = item.apply_scalar(state, Utc::now(), self.agent_config.filter_duplicates) {
                    self.buffer.push(obs);
                }
            }
        }
    }

    fn emit_availability(&self, state: &str) {
        if let Some(device) = self.resolve_device() {
            for item in device.all_data_items() {
                if item.data_type == "AVAILABILITY" {
                    if let Some(obs) = item.apply_scalar(state, Utc::now(), self.agent_config.filter_duplicates) {
                        self.buffer.push(obs);
                    }
                }
            }
        }
    }
}

/// Recognize the `*|<asset_id>|<type>|--multiline--TAG` asset-creation
/// preamble. Distinct from the plain `* key: value` commands, which carry
/// no leading `|`-separated fields.
fn parse_asset_preamble(raw: &str) -> Option<(String, String, String)> {
    let rest = raw.strip_prefix('*')?;
    let mut fields = rest.split('|');
    if !fields.next()?.is_empty() {
        return None;
    }
    let asset_id = fields.next()?.to_string();
    let asset_type = fields.next()?.to_string();
    let sentinel = fields.next()?;
    if fields.next().is_some() {
        return None;
    }
    let tag = shdr::multiline_tag(sentinel)?;
    Some((asset_id, asset_type, tag.to_string()))
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Parse a space-separated `x y z` value token into three components.
fn parse_3d(raw: &str) -> Option<[f64; 3]> {
    let mut parts = raw.split_whitespace();
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.parse().ok()?;
    let z = parts.next()?.parse().ok()?;
    Some([x, y, z])
}

/// Parse a TimeSeries value token (`v1 v2 v3 …`), skipping entries that
/// aren't valid floats rather than failing the whole sample.
fn parse_space_separated_f64(raw: &str) -> Vec<f64> {
    raw.split_whitespace().filter_map(|s| s.parse::<f64>().ok()).collect()
}

/// Parse a DataSet value token (`k1=v1 k2=v2 …`, quoted values allowed). A
/// bare key with no `=` represents an explicit removal (`None`).
fn parse_data_set(raw: &str) -> std::collections::BTreeMap<String, Option<String>> {
    let mut entries = std::collections::BTreeMap::new();
    let mut chars = raw.chars().peekable();
    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }
        let mut token = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            for c in chars.by_ref() {
                if c == '"' {
                    break;
                }
                token.push(c);
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                token.push(c);
                chars.next();
            }
        }
        if let Some((key, value)) = token.split_once('=') {
            entries.insert(key.to_string(), Some(value.trim_matches('"').to_string()));
        } else if !token.is_empty() {
            entries.insert(token, None);
        }
    }
    entries
}

/// Spawns and owns a set of [`AdapterClient`]s as a group, for the
/// binary's composition root.
pub struct AdapterPool {
    clients: HashMap<String, Arc<AdapterClient>>,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl Default for AdapterPool {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterPool {
    pub fn new() -> Self {
        AdapterPool { clients: HashMap::new(), handles: Vec::new() }
    }

    pub fn spawn(
        &mut self,
        config: AdapterConfig,
        agent_config: Arc<AgentConfig>,
        catalog: Arc<DeviceCatalog>,
        buffer: Arc<CircularBuffer>,
        assets: Arc<AssetStore>,
    ) {
        let key = format!("{}:{}", config.host, config.port);
        let client = AdapterClient::new(config, agent_config, catalog, buffer, assets);
        let handle = tokio::spawn(client.clone().run());
        self.clients.insert(key, client);
        self.handles.push(handle);
    }

    pub fn stop_all(&self) {
        for client in self.clients.values() {
            client.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_asset_preamble() {
        let (id, ty, tag) = parse_asset_preamble("*|A1|CuttingTool|--multiline--ASSET").unwrap();
        assert_eq!(id, "A1");
        assert_eq!(ty, "CuttingTool");
        assert_eq!(tag, "ASSET");
    }

    #[test]
    fn rejects_plain_key_value_command() {
        assert!(parse_asset_preamble("*adapterVersion: 1.5").is_none());
    }

    #[test]
    fn rejects_preamble_with_wrong_field_count() {
        assert!(parse_asset_preamble("*|A1|--multiline--ASSET").is_none());
        assert!(parse_asset_preamble("*|A1|CuttingTool|Extra|--multiline--ASSET").is_none());
    }

    #[test]
    fn parses_3d_value_token() {
        assert_eq!(parse_3d("1.0 2.5 -3.0"), Some([1.0, 2.5, -3.0]));
        assert_eq!(parse_3d("1.0 2.5"), None);
        assert_eq!(parse_3d("not a number here"), None);
    }

    #[test]
    fn parses_time_series_values() {
        assert_eq!(parse_space_separated_f64("1.0 2.0 3.5"), vec![1.0, 2.0, 3.5]);
        assert_eq!(parse_space_separated_f64(""), Vec::<f64>::new());
    }

    #[test]
    fn parses_data_set_entries_with_quoting_and_removal() {
        let entries = parse_data_set(r#"k1=v1 k2="v 2" k3"#);
        assert_eq!(entries.get("k1"), Some(&Some("v1".to_string())));
        assert_eq!(entries.get("k2"), Some(&Some("v 2".to_string())));
        assert_eq!(entries.get("k3"), Some(&None));
    }
}
