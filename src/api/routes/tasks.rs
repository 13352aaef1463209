//! Task CRUD endpoints.
//!
//! - `GET /tasks` — list, newest first
//! - `POST /tasks` — create (201)
//! - `GET /tasks/:id` — 404 on missing id
//! - `PUT /tasks/:id` — full replacement; 400 on path/body id mismatch
//! - `DELETE /tasks/:id` — also reclaims audio artifacts

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use crate::task::{Task, TaskKind};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route(
            "/tasks/:id",
            get(get_task).put(update_task).delete(delete_task),
        )
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    #[serde(default)]
    pub url: String,
}

async fn list_tasks(State(state): State<AppState>) -> ApiResult<Json<Vec<Task>>> {
    let tasks = state.pipeline.tasks().list().await?;
    Ok(Json(tasks))
}

async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let task = Task::new(req.name, req.kind, req.url);
    state.pipeline.tasks().put(&task).await?;

    info!("Task {} created ({})", task.id, task.kind.as_str());
    Ok((StatusCode::CREATED, Json(task)))
}

async fn get_task(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<Task>> {
    let task = state
        .pipeline
        .tasks()
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("task {} not found", id)))?;
    Ok(Json(task))
}

async fn update_task(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(task): Json<Task>,
) -> ApiResult<Json<Task>> {
    if task.id != id {
        return Err(ApiError::bad_request("task id in path and body differ"));
    }
    if state.pipeline.tasks().get(&id).await?.is_none() {
        return Err(ApiError::not_found(format!("task {} not found", id)));
    }

    state.pipeline.tasks().put(&task).await?;
    Ok(Json(task))
}

async fn delete_task(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<Value>> {
    if !state.pipeline.delete_task(&id).await? {
        return Err(ApiError::not_found(format!("task {} not found", id)));
    }
    Ok(Json(json!({ "deleted": true })))
}
