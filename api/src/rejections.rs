use derive_more::Display;
use mtc_core::AgentError;
use tracing::*;
use warp::{http::StatusCode, *};

/// HTTP-facing wrapper around a core [`AgentError`], the same shape as the
/// teacher's `ApiError` (one variant set, `Display`-derived, implements
/// `warp::reject::Reject`). Kept as a thin newtype rather than folding the
/// core error in directly so the HTTP crate can add purely transport-level
/// variants (bad query params, unsupported media type) without touching
/// the core's closed error enum.
#[derive(Debug, Display, Clone, PartialEq)]
pub enum ApiError {
    #[display(fmt = "{}", _0)]
    Agent(AgentError),

    #[display(fmt = "The requested resource could not be found.")]
    NotFound,

    #[display(fmt = "Method not supported.")]
    MethodNotAllowed,

    #[display(fmt = "Invalid request. {}", cause)]
    BadRequest { cause: String },

    #[display(fmt = "{}.", msg)]
    UnsupportedMediaType { msg: String },

    #[display(fmt = "Internal server error.")]
    Internal,
}

impl warp::reject::Reject for ApiError {}
impl std::error::Error for ApiError {}

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        ApiError::Agent(e)
    }
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    #[serde(skip)]
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl From<ApiError> for ApiErrorResponse {
    fn from(e: ApiError) -> Self {
        let (status, code) = match &e {
            ApiError::Agent(AgentError::OutOfRange(_)) => (StatusCode::NOT_FOUND, "ERR_OUT_OF_RANGE"),
            ApiError::Agent(AgentError::UnknownDevice(_)) => (StatusCode::NOT_FOUND, "ERR_UNKNOWN_DEVICE"),
            ApiError::Agent(AgentError::UnknownDataItem(_)) => (StatusCode::NOT_FOUND, "ERR_UNKNOWN_DATA_ITEM"),
            ApiError::Agent(AgentError::UnknownAsset(_)) => (StatusCode::NOT_FOUND, "ERR_UNKNOWN_ASSET"),
            ApiError::Agent(AgentError::InvalidRequest(_)) => (StatusCode::BAD_REQUEST, "ERR_INVALID_REQUEST"),
            ApiError::Agent(AgentError::ConfigError(_)) => (StatusCode::INTERNAL_SERVER_ERROR, "ERR_CONFIG"),
            ApiError::Agent(AgentError::TooLarge { .. }) => (StatusCode::BAD_REQUEST, "ERR_TOO_LARGE"),
            ApiError::Agent(AgentError::AdapterDisconnected(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "ERR_ADAPTER_DISCONNECTED")
            }
            ApiError::Agent(AgentError::ProtocolError(_)) => (StatusCode::BAD_REQUEST, "ERR_PROTOCOL"),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "ERR_NOT_FOUND"),
            ApiError::MethodNotAllowed => (StatusCode::METHOD_NOT_ALLOWED, "ERR_METHOD_NOT_ALLOWED"),
            ApiError::BadRequest { .. } => (StatusCode::BAD_REQUEST, "ERR_BAD_REQUEST"),
            ApiError::UnsupportedMediaType { .. } => (StatusCode::UNSUPPORTED_MEDIA_TYPE, "ERR_UNSUPPORTED_MEDIA_TYPE"),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "ERR_INTERNAL"),
        };
        ApiErrorResponse { code: code.to_string(), status, message: e.to_string() }
    }
}

pub fn reject(err: AgentError) -> Rejection {
    warp::reject::custom(ApiError::from(err))
}

pub async fn handle_rejection(r: Rejection) -> Result<impl Reply, Rejection> {
    let api_err = if r.is_not_found() {
        ApiError::NotFound
    } else if let Some(umt) = r.find::<reject::UnsupportedMediaType>() {
        ApiError::UnsupportedMediaType { msg: umt.to_string() }
    } else if let Some(e) = r.find::<ApiError>() {
        e.to_owned()
    } else if let Some(e) = r.find::<filters::body::BodyDeserializeError>() {
        use std::error::Error;
        ApiError::BadRequest { cause: e.source().map_or("unknown".to_string(), |e| e.to_string()) }
    } else if r.find::<reject::MethodNotAllowed>().is_some() {
        ApiError::MethodNotAllowed
    } else {
        warn!("unhandled rejection: {:?}", r);
        ApiError::Internal
    };

    let err_resp: ApiErrorResponse = api_err.into();
    let json = warp::reply::json(&err_resp);
    Ok(warp::reply::with_status(json, err_resp.status))
}
