use crate::auth::AuthError;
use crate::sample::ValidationError;
use crate::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::error;

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// API error taxonomy, one HTTP status per variant
#[derive(Debug, PartialEq)]
pub enum ApiError {
    InvalidInput(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    InsufficientHistory,
    StoreUnavailable(String),
    Encoding(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) | ApiError::InsufficientHistory => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::StoreUnavailable(_) | ApiError::Encoding(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match self {
            ApiError::InvalidInput(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg) => msg,
            ApiError::InsufficientHistory => "Not enough data".to_string(),
            // Backend details stay in the log
            ApiError::StoreUnavailable(detail) => {
                error!(error = %detail, "Store request failed");
                "Store unavailable".to_string()
            }
            ApiError::Encoding(detail) => {
                error!(error = %detail, "Encoding failed");
                "Encoding error".to_string()
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });
        (status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(msg) => ApiError::StoreUnavailable(msg),
            StoreError::Encoding(msg) => ApiError::Encoding(msg),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError::Unauthorized(e.to_string())
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::ForeignAgent(_) => ApiError::Forbidden(e.to_string()),
            other => ApiError::InvalidInput(other.to_string()),
        }
    }
}
