//! Thin HTTP binding mapping `/probe`, `/current`, `/sample`, `/assets`
//! and the streaming sample endpoint onto the core [`mtc_core::Agent`]
//! facade. Grounded on the teacher's `api` crate: the filter/handler/
//! rejection split, the `warp::log::custom` request logging closure, and
//! the CORS/recover composition in `run`/`routes` below all follow
//! `api/src/api/mod.rs`'s shape almost directory-for-directory.

pub mod filters;
pub mod handlers;
pub mod ndjson;
pub mod rejections;
pub mod serialize;

use std::net::SocketAddr;
use std::sync::Arc;

use mtc_core::agent::Agent;
use warp::Filter;

use crate::serialize::DocumentSerializer;

/// A request-logging wrapper matching the teacher's `warp::log::custom`
/// closure: logs method, path, status, and elapsed time at `debug`.
fn access_log() -> warp::log::Log<impl Fn(warp::log::Info) + Copy> {
    warp::log::custom(|info| {
        tracing::debug!(
            target: "mtc_api::access_log",
            remote_addr = ?info.remote_addr(),
            method = %info.method(),
            path = %info.path(),
            status = %info.status(),
            elapsed = ?info.elapsed(),
            "request",
        );
    })
}

/// Bind and serve the agent's HTTP surface on `addr` until the returned
/// future is dropped or the process exits.
pub async fn run(addr: SocketAddr, agent: Arc<Agent>, serializer: Arc<dyn DocumentSerializer>) {
    let routes = filters::routes(agent, serializer).with(access_log());
    tracing::info!(%addr, "http server listening");
    warp::serve(routes).run(addr).await;
}
