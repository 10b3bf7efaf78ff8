use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ThrottlerError {
    #[error("Rate limit exceeded")]
    RateLimitExceeded,
    #[error("Upload limit exceeded, {remaining_mb:.1}MB remaining this hour")]
    UploadLimitExceeded { remaining_mb: f64 },
    #[error("Upload too large: {0}")]
    PayloadTooLarge(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

pub type ThrottlerResult<T> = Result<T, ThrottlerError>;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, code: u16) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            code,
        }
    }

    pub fn from_error(err: &ThrottlerError) -> Self {
        let message = err.to_string();
        match err {
            ThrottlerError::RateLimitExceeded => Self::new("rate_limit_exceeded", &message, 429),
            ThrottlerError::UploadLimitExceeded { .. } => Self::new("upload_limit_exceeded", &message, 429),
            ThrottlerError::PayloadTooLarge(_) => Self::new("payload_too_large", &message, 413),
            ThrottlerError::InvalidRequest(_) => Self::new("bad_request", &message, 400),
            ThrottlerError::Configuration(_) => Self::new("configuration_error", &message, 500),
            ThrottlerError::Validation(_) => Self::new("validation_error", &message, 422),
            ThrottlerError::Internal(_) => Self::new("internal_error", &message, 500),
        }
    }
}

impl IntoResponse for ThrottlerError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::from_error(&self);
        let status = StatusCode::from_u16(body.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let limited = ErrorResponse::from_error(&ThrottlerError::RateLimitExceeded);
        assert_eq!(limited.code, 429);
        assert_eq!(limited.error, "rate_limit_exceeded");

        let upload = ErrorResponse::from_error(&ThrottlerError::UploadLimitExceeded { remaining_mb: 0.5 });
        assert_eq!(upload.code, 429);
        assert_eq!(upload.message, "Upload limit exceeded, 0.5MB remaining this hour");

        assert_eq!(ErrorResponse::from_error(&ThrottlerError::InvalidRequest("x".into())).code, 400);
        assert_eq!(ErrorResponse::from_error(&ThrottlerError::PayloadTooLarge("x".into())).code, 413);
        assert_eq!(ErrorResponse::from_error(&ThrottlerError::Validation("x".into())).code, 422);
    }

    #[test]
    fn test_into_response_status() {
        let response = ThrottlerError::RateLimitExceeded.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
