use crate::error::{GenerationError, LifecycleError, RetrievalError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// Error body: `{"code": "...", "message": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    Lifecycle(LifecycleError),
    Retrieval(RetrievalError),
    Generation(GenerationError),
    BadRequest(String),
    NotFound(String),
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        ApiError::Lifecycle(err)
    }
}

impl From<RetrievalError> for ApiError {
    fn from(err: RetrievalError) -> Self {
        ApiError::Retrieval(err)
    }
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        ApiError::Generation(err)
    }
}

fn lifecycle_status(err: &LifecycleError) -> (StatusCode, &'static str) {
    match err {
        LifecycleError::VideoNotFound(_) => (StatusCode::NOT_FOUND, "video_not_found"),
        LifecycleError::AlreadySubmitted { .. } => (StatusCode::CONFLICT, "already_submitted"),
        LifecycleError::IndexSubmission { .. } => (StatusCode::BAD_GATEWAY, "index_submission_failed"),
        LifecycleError::Transition(_) => (StatusCode::CONFLICT, "illegal_transition"),
        LifecycleError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable"),
    }
}

fn retrieval_status(err: &RetrievalError) -> (StatusCode, &'static str) {
    match err {
        RetrievalError::VideoNotFound(_) => (StatusCode::NOT_FOUND, "video_not_found"),
        RetrievalError::NotIndexed(_) => (StatusCode::CONFLICT, "video_not_indexed"),
        RetrievalError::Index(_) => (StatusCode::BAD_GATEWAY, "retrieval_failed"),
        RetrievalError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "retrieval_timeout"),
        RetrievalError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable"),
    }
}

fn generation_status(err: &GenerationError) -> (StatusCode, &'static str) {
    match err {
        GenerationError::VideoNotFound(_) => (StatusCode::NOT_FOUND, "video_not_found"),
        GenerationError::VideoNotReady { .. } => (StatusCode::CONFLICT, "video_not_ready"),
        GenerationError::Retrieval(inner) => retrieval_status(inner),
        GenerationError::InsufficientGroundingData(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "insufficient_grounding_data")
        }
        GenerationError::GenerationIncomplete { .. } => {
            (StatusCode::BAD_GATEWAY, "generation_incomplete")
        }
        GenerationError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ((status, code), message) = match &self {
            ApiError::Lifecycle(e) => (lifecycle_status(e), e.to_string()),
            ApiError::Retrieval(e) => (retrieval_status(e), e.to_string()),
            ApiError::Generation(e) => (generation_status(e), e.to_string()),
            ApiError::BadRequest(m) => ((StatusCode::UNPROCESSABLE_ENTITY, "invalid_request"), m.clone()),
            ApiError::NotFound(m) => ((StatusCode::NOT_FOUND, "not_found"), m.clone()),
        };

        if status.is_server_error() {
            error!("{} {}: {}", status.as_u16(), code, message);
        }

        let body = Json(json!({
            "code": code,
            "message": message,
        }));

        (status, body).into_response()
    }
}
