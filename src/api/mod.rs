//! REST API server for briefer.
//!
//! Provides HTTP endpoints for:
//! - Task CRUD
//! - Pipeline triggers (capture control, summarization)
//! - Capture chunk upload and audio retrieval
//! - Credential configuration

pub mod error;
pub mod routes;

use anyhow::Result;
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tracing::info;

use crate::config::ConfigStore;
use crate::object_store::ObjectStoreHandle;
use crate::pipeline::TaskPipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<TaskPipeline>,
    pub objects: Arc<ObjectStoreHandle>,
    pub config: ConfigStore,
}

pub struct ApiServer {
    port: u16,
    state: AppState,
}

impl ApiServer {
    pub fn new(port: u16, state: AppState) -> Self {
        Self { port, state }
    }

    pub async fn start(self) -> Result<()> {
        let app = Router::new()
            .route("/", get(status))
            .route("/version", get(version))
            .merge(routes::tasks::router(self.state.clone()))
            .merge(routes::pipeline::router(self.state.clone()))
            .merge(routes::config::router(self.state.clone()))
            .merge(routes::audio::router(self.state.clone()))
            .layer(ServiceBuilder::new());

        let listener = tokio::net::TcpListener::bind(&format!("127.0.0.1:{}", self.port)).await?;

        info!("API server listening on http://127.0.0.1:{}", self.port);
        info!("Endpoints:");
        info!("  GET    /                                  - Service info");
        info!("  GET    /tasks                             - List tasks");
        info!("  POST   /tasks                             - Create task");
        info!("  GET    /tasks/:id                         - Get task");
        info!("  PUT    /tasks/:id                         - Update task");
        info!("  DELETE /tasks/:id                         - Delete task");
        info!("  POST   /tasks/:id/start-capture           - Open capture session");
        info!("  POST   /tasks/:id/stop-capture            - Close capture, build canonical audio");
        info!("  POST   /tasks/:id/capture-failed          - Report capture failure");
        info!("  POST   /tasks/:id/audio-chunk             - Append capture chunk");
        info!("  POST   /tasks/:id/summarize-webpage       - Run webpage pipeline");
        info!("  POST   /tasks/:id/summarize-live-audio    - Run live audio pipeline");
        info!("  POST   /tasks/:id/process-with-known-url  - Run pipeline from public audio URL");
        info!("  GET    /audio/:filename                   - Serve stored audio");
        info!("  GET/PUT /config/llm                       - LLM credentials");
        info!("  GET/PUT /config/object-store              - Object store credentials");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn status() -> Json<Value> {
    Json(json!({
        "service": "briefer",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "name": "briefer"
    }))
}
