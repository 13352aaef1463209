//! Pipeline-trigger endpoints.
//!
//! Each operation takes a task id and answers with the updated task
//! document, or `{"error": "..."}` with 400/404/500 as appropriate.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    response::Json,
    routing::post,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::info;

use crate::api::error::ApiResult;
use crate::api::AppState;
use crate::task::Task;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/tasks/:id/start-capture", post(start_capture))
        .route("/tasks/:id/stop-capture", post(stop_capture))
        .route("/tasks/:id/capture-failed", post(capture_failed))
        .route("/tasks/:id/summarize-webpage", post(summarize_webpage))
        .route("/tasks/:id/summarize-live-audio", post(summarize_live))
        .route(
            "/tasks/:id/process-with-known-url",
            post(process_with_known_url),
        )
        .route("/tasks/:id/audio-chunk", post(upload_audio_chunk))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
struct CaptureFailedRequest {
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct KnownUrlRequest {
    url: Option<String>,
}

async fn start_capture(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<Task>> {
    Ok(Json(state.pipeline.start_capture(&id).await?))
}

async fn stop_capture(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<Task>> {
    Ok(Json(state.pipeline.stop_capture(&id).await?))
}

async fn capture_failed(
    Path(id): Path<String>,
    State(state): State<AppState>,
    body: Option<Json<CaptureFailedRequest>>,
) -> ApiResult<Json<Task>> {
    let reason = body
        .and_then(|Json(req)| req.error)
        .unwrap_or_else(|| "recording failed".to_string());
    Ok(Json(state.pipeline.capture_failed(&id, &reason).await?))
}

async fn summarize_webpage(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<Task>> {
    Ok(Json(state.pipeline.summarize_webpage(&id).await?))
}

async fn summarize_live(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<Task>> {
    Ok(Json(state.pipeline.summarize_live(&id).await?))
}

async fn process_with_known_url(
    Path(id): Path<String>,
    State(state): State<AppState>,
    body: Option<Json<KnownUrlRequest>>,
) -> ApiResult<Json<Task>> {
    let url = body.and_then(|Json(req)| req.url);
    Ok(Json(state.pipeline.process_with_known_url(&id, url).await?))
}

/// Raw capture chunk from the UI, appended to the task's temp file.
/// `?ext=` names the container; unknown values fall back to webm.
async fn upload_audio_chunk(
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let ext = params.get("ext").map(String::as_str).unwrap_or("webm");
    state.pipeline.audio().append_chunk(&id, ext, &body).await?;

    info!("Received {} byte chunk for task {}", body.len(), id);
    Ok(Json(json!({ "received": body.len() })))
}
