use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::error::RelayError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    UnsupportedMedia(String),
    /// A vendor API failed
    BadGateway(String),
    Internal(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {msg}"),
            ApiError::NotFound(msg) => write!(f, "Not found: {msg}"),
            ApiError::UnsupportedMedia(msg) => write!(f, "Unsupported media: {msg}"),
            ApiError::BadGateway(msg) => write!(f, "Upstream error: {msg}"),
            ApiError::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::UnsupportedMedia(msg) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_media", msg)
            }
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "upstream", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", msg),
        };

        if status.is_server_error() {
            error!("{} ({}): {}", status, error_type, message);
        }

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::Protocol(msg) => ApiError::BadRequest(msg),
            RelayError::Vendor(msg) => ApiError::BadGateway(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<axum::extract::multipart::MultipartError> for ApiError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        ApiError::BadRequest(format!("invalid multipart body: {}", err))
    }
}
