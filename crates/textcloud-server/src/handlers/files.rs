//! Storage service handlers: upload, download, metadata.

use super::{parse_id, ApiError, ApiResult};
use crate::server::StorageState;
use axum::{
    extract::{multipart::{MultipartError, MultipartRejection}, Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use textcloud_core::config::StorageConfig;
use textcloud_core::{FileMetadata, TextcloudError};
use tracing::{debug, warn};

const FILE_FIELD: &str = "file";

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        too_large()
    } else {
        ApiError::invalid(format!("Malformed upload: {}", err.body_text()))
    }
}

fn too_large() -> ApiError {
    ApiError::new(
        StatusCode::PAYLOAD_TOO_LARGE,
        "payload_too_large",
        format!(
            "Uploads are limited to {} bytes.",
            StorageConfig::MAX_UPLOAD_BYTES
        ),
    )
}

/// `POST /upload`: multipart form with a `file` field.
///
/// 201 with the new record, or 200 with the existing record for duplicate content.
pub async fn handle_upload(
    State(state): State<Arc<StorageState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<(StatusCode, Json<FileMetadata>)> {
    let mut multipart = multipart?;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            debug!("Ignoring form field {:?}", field.name());
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let mime_type = field.content_type().map(str::to_string);
        let content = field.bytes().await.map_err(multipart_error)?;
        if content.len() > StorageConfig::MAX_UPLOAD_BYTES {
            return Err(too_large());
        }

        let outcome = state.api.upload(&filename, mime_type, content).await?;
        let status = if outcome.created {
            StatusCode::CREATED
        } else {
            StatusCode::OK
        };
        return Ok((status, Json(outcome.metadata)));
    }

    warn!("Upload without a '{}' field", FILE_FIELD);
    Err(ApiError::invalid(format!(
        "Missing form field '{}'.",
        FILE_FIELD
    )))
}

/// `Content-Disposition` for a download, with the name RFC 5987 encoded.
fn content_disposition(filename: &str) -> HeaderValue {
    let value = format!(
        "attachment; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    );
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// `GET /{file_id}/download`
pub async fn handle_download(
    State(state): State<Arc<StorageState>>,
    Path(file_id): Path<String>,
) -> ApiResult<Response> {
    let file_id = parse_id("file_id", &file_id)?;
    let (metadata, content) = state.api.download(file_id).await.map_err(|e| match e {
        TextcloudError::FileNotFound { .. } => {
            ApiError::new(StatusCode::NOT_FOUND, "not_found", "File not found")
        }
        other => other.into(),
    })?;

    let content_type = metadata
        .mime_type
        .as_deref()
        .and_then(|mime| HeaderValue::from_str(mime).ok())
        .unwrap_or_else(|| HeaderValue::from_static(StorageConfig::DEFAULT_MIME_TYPE));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (
                header::CONTENT_DISPOSITION,
                content_disposition(&metadata.original_filename),
            ),
        ],
        content,
    )
        .into_response())
}

/// `GET /{file_id}/metadata`
pub async fn handle_metadata(
    State(state): State<Arc<StorageState>>,
    Path(file_id): Path<String>,
) -> ApiResult<Json<FileMetadata>> {
    let file_id = parse_id("file_id", &file_id)?;
    Ok(Json(state.api.metadata(file_id)?))
}
