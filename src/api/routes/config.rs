//! Credential configuration endpoints.
//!
//! Two documents: LLM credentials and object-store credentials.
//! Updating the object-store document resets the handle cache so the
//! next upload re-resolves without a process restart.

use axum::{
    extract::State,
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use tracing::info;

use crate::api::error::ApiResult;
use crate::api::AppState;
use crate::config::{LlmConfig, ObjectStoreConfig};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/config/llm", get(get_llm).put(put_llm))
        .route("/config/object-store", get(get_object_store).put(put_object_store))
        .with_state(state)
}

async fn get_llm(State(state): State<AppState>) -> ApiResult<Json<LlmConfig>> {
    let config = state.config.load()?;
    Ok(Json(config.llm))
}

async fn put_llm(
    State(state): State<AppState>,
    Json(llm): Json<LlmConfig>,
) -> ApiResult<Json<LlmConfig>> {
    let mut config = state.config.load()?;
    config.llm = llm.clone();
    state.config.save(&config)?;

    info!("LLM configuration updated");
    Ok(Json(llm))
}

async fn get_object_store(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let config = state.config.load()?;
    Ok(Json(json!({
        "config": config.object_store,
        "available": state.objects.is_available().await,
    })))
}

async fn put_object_store(
    State(state): State<AppState>,
    Json(object_store): Json<ObjectStoreConfig>,
) -> ApiResult<Json<ObjectStoreConfig>> {
    let mut config = state.config.load()?;
    config.object_store = object_store.clone();
    state.config.save(&config)?;
    state.objects.reset().await;

    info!("Object store configuration updated");
    Ok(Json(object_store))
}
