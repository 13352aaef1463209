use crate::api::{ApiServer, AppState};
use crate::audio::AudioStore;
use crate::config::ConfigStore;
use crate::global;
use crate::object_store::ObjectStoreHandle;
use crate::pipeline::fetch::HttpPageFetcher;
use crate::pipeline::TaskPipeline;
use crate::summarize::ChatSummarizer;
use crate::task::TaskStore;
use crate::transcribe::DashScopeTranscriber;
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

pub async fn run_service(port_override: Option<u16>) -> Result<()> {
    info!("Starting briefer service");

    let config_store = ConfigStore::at_default_location()?;
    let config = config_store.load()?;
    let port = port_override.unwrap_or(config.server.port);

    let tasks = Arc::new(TaskStore::new(global::tasks_dir()?)?);
    let audio = Arc::new(AudioStore::new(global::audio_dir()?)?);
    let objects = Arc::new(ObjectStoreHandle::new(config_store.clone()));
    let transcriber = Arc::new(DashScopeTranscriber::new(config_store.clone()));
    let summarizer = Arc::new(ChatSummarizer::new(config_store.clone()));
    let fetcher = Arc::new(HttpPageFetcher::new());

    let pipeline = Arc::new(TaskPipeline::new(
        tasks,
        audio,
        objects.clone(),
        transcriber,
        summarizer,
        fetcher,
    ));

    let server = ApiServer::new(
        port,
        AppState {
            pipeline,
            objects,
            config: config_store,
        },
    );

    info!("briefer is ready");
    server.start().await
}
