//! Error types for canopy-verify
//!
//! `ApiError` maps failure classes onto HTTP responses. Decisions
//! (rejections, flags) are not errors; they serialize through the verify
//! handlers. Only pre-pipeline validation failures and pipeline aborts
//! land here.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::extractors::SignalError;
use crate::services::PipelineError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Uploaded image exceeds the size cap (413)
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// A required capability is missing (503)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Admission lock contention; the caller should retry (503)
    #[error("Contention: {0}")]
    Contention(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// canopy-common error
    #[error("Common error: {0}")]
    Common(#[from] canopy_common::Error),
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Signal(SignalError::DecodeFailed(msg)) => {
                ApiError::BadRequest(format!("Image decode failed: {}", msg))
            }
            PipelineError::Signal(SignalError::ModelUnavailable(msg)) => {
                ApiError::ServiceUnavailable(format!("Embedding model unavailable: {}", msg))
            }
            PipelineError::Signal(SignalError::Internal(msg)) => ApiError::Internal(msg),
            PipelineError::Contention(contention) => ApiError::Contention(contention.to_string()),
            PipelineError::Internal(canopy_common::Error::InvalidInput(msg)) => {
                ApiError::BadRequest(msg)
            }
            PipelineError::Internal(err) => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", msg)
            }
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", msg)
            }
            ApiError::Contention(msg) => (StatusCode::SERVICE_UNAVAILABLE, "CONTENTION", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Io(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                err.to_string(),
            ),
            ApiError::Other(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
            ),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cell_lock::CellContention;
    use canopy_common::geo::GridCell;

    #[test]
    fn decode_failure_maps_to_bad_request() {
        let err: ApiError =
            PipelineError::Signal(SignalError::DecodeFailed("not an image".to_string())).into();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn model_unavailable_maps_to_service_unavailable() {
        let err: ApiError =
            PipelineError::Signal(SignalError::ModelUnavailable("no model".to_string())).into();
        assert!(matches!(err, ApiError::ServiceUnavailable(_)));
    }

    #[test]
    fn contention_keeps_distinct_class() {
        let err: ApiError = PipelineError::Contention(CellContention {
            cell: GridCell { x: 1, y: 2 },
            wait_ms: 5000,
        })
        .into();
        assert!(matches!(err, ApiError::Contention(_)));
    }
}
