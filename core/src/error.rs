use thiserror::Error;

/// Domain errors produced by the agent core.
///
/// Every variant here is part of the closed set a caller is expected to
/// match on; there is intentionally no `Other(anyhow::Error)` catch-all —
/// wrapping at a boundary (e.g. the HTTP binding) is the caller's job.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AgentError {
    #[error("sequence {0} is out of range of the current buffer window")]
    OutOfRange(u64),

    #[error("unknown device: {0}")]
    UnknownDevice(String),

    #[error("unknown data item: {0}")]
    UnknownDataItem(String),

    #[error("unknown asset: {0}")]
    UnknownAsset(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("requested count {requested} exceeds maximum {max}")]
    TooLarge { requested: usize, max: usize },

    #[error("adapter disconnected: {0}")]
    AdapterDisconnected(String),

    #[error("protocol error: {0}")]
    ProtocolError(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;
