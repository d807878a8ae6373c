//! Analysis service handlers.

use super::{parse_id, ApiResult};
use crate::server::AnalysisState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use textcloud_core::config::AnalysisConfig;
use textcloud_core::{AnalysisRequest, AnalysisResultView};

/// `POST /analysis/`
///
/// 202 when a new analysis was scheduled, 200 when a completed one is reused,
/// 409 while one is in flight.
pub async fn handle_trigger(
    State(state): State<Arc<AnalysisState>>,
    payload: Result<Json<AnalysisRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<AnalysisResultView>)> {
    let Json(request) = payload?;
    let outcome = state.api.trigger(request)?;
    let status = if outcome.created {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome.view)))
}

/// `GET /analysis/{analysis_id}`
pub async fn handle_get(
    State(state): State<Arc<AnalysisState>>,
    Path(analysis_id): Path<String>,
) -> ApiResult<Json<AnalysisResultView>> {
    let analysis_id = parse_id("analysis_id", &analysis_id)?;
    Ok(Json(state.api.get(analysis_id)?))
}

/// `GET /analysis/file/{file_id}`
pub async fn handle_list_for_file(
    State(state): State<Arc<AnalysisState>>,
    Path(file_id): Path<String>,
) -> ApiResult<Json<Vec<AnalysisResultView>>> {
    let file_id = parse_id("file_id", &file_id)?;
    Ok(Json(state.api.list_for_file(file_id)?))
}

/// `GET /analysis/wordclouds/{analysis_id}/{filename}`
pub async fn handle_artifact(
    State(state): State<Arc<AnalysisState>>,
    Path((analysis_id, filename)): Path<(String, String)>,
) -> ApiResult<Response> {
    let image = state.api.artifact(&analysis_id, &filename).await?;
    Ok((
        [(header::CONTENT_TYPE, AnalysisConfig::ARTIFACT_MEDIA_TYPE)],
        image,
    )
        .into_response())
}
