use std::sync::Arc;

use mtc_core::agent::Agent;
use warp::Filter;

use crate::handlers;
use crate::serialize::DocumentSerializer;

fn with_agent(agent: Arc<Agent>) -> impl Filter<Extract = (Arc<Agent>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || agent.clone())
}

fn with_serializer(
    serializer: Arc<dyn DocumentSerializer>,
) -> impl Filter<Extract = (Arc<dyn DocumentSerializer>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || serializer.clone())
}

fn probe(
    agent: Arc<Agent>,
    serializer: Arc<dyn DocumentSerializer>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path("probe")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query())
        .and(with_agent(agent))
        .and(with_serializer(serializer))
        .and_then(handlers::probe)
}

fn current(
    agent: Arc<Agent>,
    serializer: Arc<dyn DocumentSerializer>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path("current")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query())
        .and(with_agent(agent))
        .and(with_serializer(serializer))
        .and_then(handlers::current)
}

fn sample(
    agent: Arc<Agent>,
    serializer: Arc<dyn DocumentSerializer>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path("sample")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<handlers::SampleQuery>())
        .and_then(|q: handlers::SampleQuery| async move {
            if q.interval.is_none() {
                Ok(q)
            } else {
                Err(warp::reject::not_found())
            }
        })
        .and(with_agent(agent))
        .and(with_serializer(serializer))
        .and_then(handlers::sample)
}

fn sample_stream(
    agent: Arc<Agent>,
    serializer: Arc<dyn DocumentSerializer>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path("sample")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<handlers::SampleQuery>())
        .and_then(|q: handlers::SampleQuery| async move {
            if q.interval.is_some() {
                Ok(q)
            } else {
                Err(warp::reject::not_found())
            }
        })
        .and(with_agent(agent))
        .and(with_serializer(serializer))
        .and_then(handlers::sample_stream)
}

fn assets(
    agent: Arc<Agent>,
    serializer: Arc<dyn DocumentSerializer>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path("assets")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query())
        .and(with_agent(agent))
        .and(with_serializer(serializer))
        .and_then(handlers::assets)
}

fn asset_get(
    agent: Arc<Agent>,
    serializer: Arc<dyn DocumentSerializer>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("asset" / String)
        .and(warp::get())
        .and(with_agent(agent))
        .and(with_serializer(serializer))
        .and_then(handlers::asset_get)
}

fn asset_put(agent: Arc<Agent>) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("asset" / String)
        .and(warp::put())
        .and(warp::body::json())
        .and(with_agent(agent))
        .and_then(handlers::asset_put)
}

fn asset_remove(agent: Arc<Agent>) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("asset" / String)
        .and(warp::delete())
        .and(with_agent(agent))
        .and_then(handlers::asset_remove)
}

/// Compose the full route tree for one agent instance.
pub fn routes(
    agent: Arc<Agent>,
    serializer: Arc<dyn DocumentSerializer>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = std::convert::Infallible> + Clone {
    let routes = probe(agent.clone(), serializer.clone())
        .or(current(agent.clone(), serializer.clone()))
        .or(sample_stream(agent.clone(), serializer.clone()))
        .or(sample(agent.clone(), serializer.clone()))
        .or(assets(agent.clone(), serializer.clone()))
        .or(asset_get(agent.clone(), serializer))
        .or(asset_put(agent.clone()))
        .or(asset_remove(agent));

    routes.recover(crate::rejections::handle_rejection)
}
