//! Gateway: relays `/api/v1/files/*` to the storage service and
//! `/api/v1/analysis/*` to the analysis service.

use super::{ApiError, ApiResult};
use crate::server::GatewayState;
use axum::{
    body::{to_bytes, Body},
    extract::{Path, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use textcloud_core::config::StorageConfig;
use textcloud_core::ErrorKind;
use tracing::{error, info, warn};
use url::Url;

/// Largest request body relayed, leaving room for multipart framing.
const MAX_FORWARD_BYTES: usize = StorageConfig::MAX_UPLOAD_BYTES + 64 * 1024;

/// Request headers not relayed to the backend.
const DROPPED_REQUEST_HEADERS: [header::HeaderName; 3] =
    [header::HOST, header::CONNECTION, header::USER_AGENT];

/// `/api/v1/files/{*path}` -> storage `/{path}`
pub async fn handle_files(
    State(state): State<Arc<GatewayState>>,
    Path(path): Path<String>,
    request: Request,
) -> ApiResult<Response> {
    forward(&state, &state.storage_url, format!("/{}", path), request).await
}

/// `/api/v1/analysis/{*path}` -> analysis `/analysis/{path}`
pub async fn handle_analysis(
    State(state): State<Arc<GatewayState>>,
    Path(path): Path<String>,
    request: Request,
) -> ApiResult<Response> {
    forward(&state, &state.analysis_url, format!("/analysis/{}", path), request).await
}

/// `/api/v1/analysis/` -> analysis `/analysis/`
pub async fn handle_analysis_root(
    State(state): State<Arc<GatewayState>>,
    request: Request,
) -> ApiResult<Response> {
    forward(&state, &state.analysis_url, "/analysis/".to_string(), request).await
}

/// `GET /ping`
pub async fn handle_ping() -> impl IntoResponse {
    Json(json!({"message": "API Gateway is alive!"}))
}

/// `GET /`: greeting plus the backends this gateway relays to.
pub async fn handle_root(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(json!({
        "message": "Welcome to the API Gateway!",
        "fss_url": state.storage_url.as_str(),
        "fas_url": state.analysis_url.as_str(),
    }))
}

/// Join a backend base URL and a path, keeping any base path.
fn target_url(base: &Url, path: &str, query: Option<&str>) -> Url {
    let mut url = base.clone();
    let prefix = base.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{}{}", prefix, path));
    url.set_query(query);
    url
}

fn relayed_request_headers(headers: &HeaderMap) -> HeaderMap {
    let mut relayed = headers.clone();
    for name in DROPPED_REQUEST_HEADERS.iter() {
        relayed.remove(name);
    }
    relayed
}

async fn forward(
    state: &GatewayState,
    base: &Url,
    path: String,
    request: Request,
) -> ApiResult<Response> {
    let (parts, body) = request.into_parts();
    let url = target_url(base, &path, parts.uri.query());
    let target = format!("{}{}", base.as_str().trim_end_matches('/'), path);
    info!("Forwarding {} request to {}", parts.method, url);

    let body = to_bytes(body, MAX_FORWARD_BYTES).await.map_err(|e| {
        warn!("Could not read request body for {}: {}", target, e);
        ApiError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "payload_too_large",
            format!("Request body could not be relayed: {}", e),
        )
    })?;

    let result = state
        .client
        .request(parts.method, url.clone())
        .headers(relayed_request_headers(&parts.headers))
        .body(body)
        .send()
        .await;

    let upstream = match result {
        Ok(response) => response,
        Err(e) => return Err(transport_error(&target, e)),
    };

    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    headers.remove(header::TRANSFER_ENCODING);
    let content = upstream
        .bytes()
        .await
        .map_err(|e| transport_error(&target, e))?;

    if status.is_client_error() || status.is_server_error() {
        warn!("HTTP error from {}: {}", url, status);
    }

    let mut response = Response::new(Body::from(content));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

fn transport_error(target: &str, err: reqwest::Error) -> ApiError {
    if err.is_connect() {
        error!("Service unavailable: {} - {}", target, err);
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::UpstreamUnavailable.as_str(),
            format!("Service unavailable: {} - {}", target, err),
        )
    } else if err.is_timeout() {
        error!("Gateway timeout: {} - {}", target, err);
        ApiError::new(
            StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::UpstreamUnavailable.as_str(),
            format!("Gateway timeout: {} - {}", target, err),
        )
    } else {
        error!("Unexpected error forwarding to {}: {}", target, err);
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Unexpected.as_str(),
            format!(
                "An unexpected error occurred while forwarding request to {}: {}",
                target, err
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_target_url() {
        let base = Url::parse("http://fss:8001").unwrap();
        assert_eq!(
            target_url(&base, "/abc/download", Some("x=1")).as_str(),
            "http://fss:8001/abc/download?x=1"
        );

        let prefixed = Url::parse("http://proxy/fas/").unwrap();
        assert_eq!(
            target_url(&prefixed, "/analysis/", None).as_str(),
            "http://proxy/fas/analysis/"
        );
    }

    #[test]
    fn test_drops_hop_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("gateway"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("curl"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        let relayed = relayed_request_headers(&headers);
        assert_eq!(relayed.len(), 1);
        assert!(relayed.contains_key(header::ACCEPT));
    }
}
