//! API Errors

use alerting::AlertError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use status_engine::PollError;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unknown tenant {0}")]
    UnknownTenant(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    /// Upstream trouble the caller should retry
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    retryable: bool,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::UnknownTenant(_) | ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        let body = ErrorBody {
            error: self.to_string(),
            retryable: matches!(self, ApiError::Unavailable(_)),
        };
        (status, Json(body)).into_response()
    }
}

impl From<PollError> for ApiError {
    fn from(err: PollError) -> Self {
        if err.is_retryable() {
            warn!("Poll failed, caller may retry: {}", err);
            ApiError::Unavailable(err.to_string())
        } else {
            ApiError::Internal(err.to_string())
        }
    }
}

impl From<AlertError> for ApiError {
    fn from(err: AlertError) -> Self {
        match err {
            AlertError::InvalidEvent(_) => ApiError::BadRequest(err.to_string()),
            AlertError::NotFound(_) => ApiError::NotFound(err.to_string()),
            AlertError::InvalidTransition { .. } => ApiError::Conflict(err.to_string()),
            AlertError::Contention(_) => ApiError::Unavailable(err.to_string()),
            AlertError::Store(_) => ApiError::Internal(err.to_string()),
        }
    }
}
