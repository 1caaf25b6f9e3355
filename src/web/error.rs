// Error types for the pairing HTTP surface

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::multipart::MultipartError;
use crate::error::CaptureError;

/// Upload failures reported back to the phone. None of them touch the relay slot.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    PayloadTooLarge(String),
    UnsupportedMediaType(String),
    MalformedMultipart(MultipartError),
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            Self::UnsupportedMediaType(msg) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, msg),
            Self::MalformedMultipart(err) => (
                StatusCode::BAD_REQUEST,
                format!("Malformed multipart body: {}", err),
            ),
            Self::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": {
                "status": status.as_u16(),
                "message": error_message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<CaptureError> for ApiError {
    fn from(error: CaptureError) -> Self {
        match error {
            CaptureError::MalformedMultipart(MultipartError::MissingBoundary) => {
                Self::UnsupportedMediaType(
                    "Expected multipart/form-data with a boundary parameter".to_string(),
                )
            }
            CaptureError::MalformedMultipart(err) => Self::MalformedMultipart(err),
            err @ CaptureError::PayloadTooLarge { .. } => Self::PayloadTooLarge(err.to_string()),
            other => Self::InternalServerError(other.to_string()),
        }
    }
}
