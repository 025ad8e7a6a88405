//! Domain engine for an MTConnect Agent: device/data-item model, the
//! circular observation buffer and its checkpoints, the change-observer
//! streaming primitive, the asset store, and the SHDR adapter client.
//!
//! HTTP framing, XML parsing/serialization, and CLI/daemon plumbing are
//! external collaborators layered on top of this crate (see `mtc-api` and
//! the `agentd` binary).

pub mod adapter;
pub mod agent;
pub mod assets;
pub mod buffer;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod model;
pub mod observation;
pub mod observer;
pub mod units;

pub use agent::Agent;
pub use error::{AgentError, Result};
