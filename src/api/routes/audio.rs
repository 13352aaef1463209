//! Read-only audio serving by filename.

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use crate::audio::content_type_for;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/audio/:filename", get(serve_audio))
        .with_state(state)
}

async fn serve_audio(
    Path(filename): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    // Filenames are flat; anything path-like is rejected outright.
    if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
        return Err(ApiError::bad_request("invalid audio filename"));
    }

    let path = state.pipeline.audio().path_for(&filename);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| ApiError::not_found(format!("audio file {} not found", filename)))?;

    let ext = std::path::Path::new(&filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();

    Ok(([(header::CONTENT_TYPE, content_type_for(ext))], bytes))
}
