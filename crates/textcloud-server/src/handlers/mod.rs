//! HTTP handlers for the storage service, the analysis service and the gateway.

pub mod analysis;
pub mod files;
pub mod gateway;

use axum::{
    extract::{multipart::MultipartRejection, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use textcloud_core::{ErrorKind, TextcloudError};
use tracing::{error, warn};
use uuid::Uuid;

/// Error body returned by every service: `{"detail": ..., "code": ...}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
    pub code: &'static str,
}

/// A failed request, rendered as `(status, Json<ErrorBody>)`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
    pub code: &'static str,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
            code,
        }
    }

    pub fn invalid(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorKind::InvalidInput.as_str(), detail)
    }
}

impl From<TextcloudError> for ApiError {
    fn from(err: TextcloudError) -> Self {
        let kind = err.kind();
        let status =
            StatusCode::from_u16(kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        match kind {
            ErrorKind::Inconsistency | ErrorKind::Unexpected => error!("{}", err),
            _ => warn!("{}", err),
        }

        Self::new(status, kind.as_str(), err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        warn!("Rejected JSON body: {}", rejection.body_text());
        Self::new(
            rejection.status(),
            ErrorKind::InvalidInput.as_str(),
            rejection.body_text(),
        )
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        warn!("Rejected multipart body: {}", rejection.body_text());
        Self::new(
            rejection.status(),
            ErrorKind::InvalidInput.as_str(),
            rejection.body_text(),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            detail: self.detail,
            code: self.code,
        };
        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Parse an identifier taken from the request path.
pub fn parse_id(field: &str, value: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| ApiError::invalid(format!("Invalid {}: {}", field, value)))
}

/// Health check endpoint.
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

pub async fn handle_storage_ping() -> impl IntoResponse {
    Json(json!({"ping": "pong! from FSS"}))
}

pub async fn handle_storage_root() -> impl IntoResponse {
    Json(json!({"message": "Welcome to the Files Storing Service API"}))
}

pub async fn handle_analysis_ping() -> impl IntoResponse {
    Json(json!({"message": "File Analysis Service is alive!"}))
}

pub async fn handle_analysis_root() -> impl IntoResponse {
    Json(json!({"message": "Welcome to the File Analysis Service!"}))
}
