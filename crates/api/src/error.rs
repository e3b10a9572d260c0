//! API error types with HTTP response mapping.
//!
//! Well-formed protocol replies (step failures, moot requests) travel in
//! the 200 envelope; `ApiError` covers only validation and runtime errors,
//! which reply non-2xx.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use saga::SagaError;
use store::StoreError;

/// Validation or runtime failure of a request.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request; the caller must not retry unchanged.
    BadRequest(String),
    /// Storage or protocol fault; the request may be retried.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "success": false, "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
