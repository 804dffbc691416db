use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use expensa_core::error::ServiceError;
use serde_json::json;

/// Error body: `{"success": false, "error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    Service(ServiceError),
    Unavailable(&'static str),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError::Service(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unavailable(what) => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("{what} is not configured"),
            ),
            ApiError::Service(ServiceError::Validation(msg)) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Service(ServiceError::Authentication(msg)) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Service(ServiceError::NotFound(msg)) => {
                (StatusCode::NOT_FOUND, format!("{msg} not found"))
            }
            ApiError::Service(ServiceError::RateLimited(msg)) => {
                (StatusCode::TOO_MANY_REQUESTS, msg)
            }
            ApiError::Service(ServiceError::Downstream(err)) => {
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = ?err, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };

        (status, Json(json!({"success": false, "error": message}))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
