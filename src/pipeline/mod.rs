//! Task lifecycle orchestrator.
//!
//! Drives the state machine {pending, processing, completed, failed},
//! sequencing capture reconciliation, object upload, transcription and
//! summarization. The task document is persisted before every next
//! stage, so a crash mid-pipeline leaves an inspectable "processing"
//! task; resumption only happens on an explicit retry request.
//!
//! All collaborators are injected via constructor — no concrete types
//! hardcoded.

pub mod fetch;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::audio::AudioStore;
use crate::error::{PipelineError, PipelineResult};
use crate::object_store::RemoteStore;
use crate::summarize::Summarizer;
use crate::task::{Task, TaskKind, TaskStatus, TaskStore};
use crate::transcribe::TranscriptionService;
use fetch::{extract_page_text, PageFetcher, PAGE_TEXT_LIMIT};

pub struct TaskPipeline {
    tasks: Arc<TaskStore>,
    audio: Arc<AudioStore>,
    objects: Arc<dyn RemoteStore>,
    transcriber: Arc<dyn TranscriptionService>,
    summarizer: Arc<dyn Summarizer>,
    fetcher: Arc<dyn PageFetcher>,
    // In-flight poll loops per task id, so deleting a task can abandon
    // its polls instead of letting the full timeout elapse. Tokens are
    // keyed by a per-attempt counter: concurrent runs on the same task
    // each keep their own token, and finishing removes only one's own.
    cancellations: Mutex<HashMap<String, HashMap<u64, CancellationToken>>>,
    attempt_counter: AtomicU64,
}

impl TaskPipeline {
    pub fn new(
        tasks: Arc<TaskStore>,
        audio: Arc<AudioStore>,
        objects: Arc<dyn RemoteStore>,
        transcriber: Arc<dyn TranscriptionService>,
        summarizer: Arc<dyn Summarizer>,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        Self {
            tasks,
            audio,
            objects,
            transcriber,
            summarizer,
            fetcher,
            cancellations: Mutex::new(HashMap::new()),
            attempt_counter: AtomicU64::new(0),
        }
    }

    pub fn tasks(&self) -> &Arc<TaskStore> {
        &self.tasks
    }

    pub fn audio(&self) -> &Arc<AudioStore> {
        &self.audio
    }

    /// Open a live capture session: the task enters processing with the
    /// recording flag raised. Re-entrant from failed/completed.
    pub async fn start_capture(&self, id: &str) -> PipelineResult<Task> {
        let task = self.require(id).await?;
        require_kind(&task, TaskKind::Live)?;

        let updated = self
            .persist(id, |t| {
                t.status = TaskStatus::Processing;
                t.is_recording = true;
            })
            .await?;

        info!("Capture started for task {}", id);
        Ok(updated)
    }

    /// Close the capture session and reconcile whatever the UI
    /// delivered into the canonical audio file: chunked uploads are
    /// merged, a complete upload is finalized.
    pub async fn stop_capture(&self, id: &str) -> PipelineResult<Task> {
        let task = self.require(id).await?;
        require_kind(&task, TaskKind::Live)?;

        let result = self.stop_capture_inner(id).await;
        self.fail_on_error(id, result).await
    }

    async fn stop_capture_inner(&self, id: &str) -> PipelineResult<Task> {
        let filename = match self.audio.merge(id).await {
            Ok(filename) => filename,
            Err(PipelineError::NotFound(_)) => self.audio.finalize(id).await?,
            Err(e) => return Err(e),
        };

        let updated = self
            .persist(id, |t| {
                t.audio_file = Some(filename.clone());
                t.is_recording = false;
            })
            .await?;

        info!("Capture stopped for task {}: {:?}", id, updated.audio_file);
        Ok(updated)
    }

    /// The UI reports that its capture session died. The task is failed
    /// with the reported cause and the recording flag dropped.
    pub async fn capture_failed(&self, id: &str, reason: &str) -> PipelineResult<Task> {
        let task = self.require(id).await?;
        require_kind(&task, TaskKind::Live)?;

        let updated = self
            .persist(id, |t| {
                t.status = TaskStatus::Failed;
                t.is_recording = false;
                t.summary = Some(format!("Recording failed: {}", reason));
            })
            .await?;

        warn!("Capture failed for task {}: {}", id, reason);
        Ok(updated)
    }

    /// Webpage pipeline: fetch → extract text → summarize → completed.
    pub async fn summarize_webpage(&self, id: &str) -> PipelineResult<Task> {
        let task = self.require(id).await?;
        require_kind(&task, TaskKind::Webpage)?;
        if task.url.is_empty() {
            return Err(PipelineError::Precondition(format!(
                "task {} has no URL to fetch",
                id
            )));
        }

        let result = self.webpage_inner(&task).await;
        self.fail_on_error(id, result).await
    }

    async fn webpage_inner(&self, task: &Task) -> PipelineResult<Task> {
        let id = &task.id;
        self.persist(id, |t| t.status = TaskStatus::Processing).await?;

        let html = self.fetcher.fetch(&task.url).await?;
        let content = extract_page_text(&html, PAGE_TEXT_LIMIT);
        self.persist(id, |t| t.content = Some(content.clone())).await?;

        let summary = self.summarizer.summarize(&content).await?;
        let updated = self
            .persist(id, |t| {
                t.status = TaskStatus::Completed;
                t.summary = Some(summary.clone());
            })
            .await?;

        info!("Webpage task {} completed", id);
        Ok(updated)
    }

    /// Live pipeline tail: upload the canonical file → transcription
    /// job → extract → summarize → completed. Requires that capture has
    /// already produced the canonical file.
    pub async fn summarize_live(&self, id: &str) -> PipelineResult<Task> {
        let task = self.require(id).await?;
        require_kind(&task, TaskKind::Live)?;

        let canonical = self.audio.canonical(id).await?.ok_or_else(|| {
            PipelineError::Precondition(format!("no recorded audio for task {}", id))
        })?;

        let result = self.live_inner(id, &canonical).await;
        self.fail_on_error(id, result).await
    }

    async fn live_inner(&self, id: &str, canonical: &std::path::Path) -> PipelineResult<Task> {
        let filename = canonical
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        // Deterministic key: a retry overwrites the previous object
        // instead of orphaning it.
        let key = format!("temp_audio/{}", filename);

        self.persist(id, |t| {
            t.status = TaskStatus::Processing;
            t.audio_file = Some(filename.clone());
        })
        .await?;

        let public_url = self.objects.put(canonical, &key).await?;

        let text = match self.transcribe_guarded(id, &public_url).await {
            Ok(text) => text,
            Err(e @ PipelineError::Transcription(_)) => {
                // The service rejected this object; it has no further use.
                self.objects.delete(&key).await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        self.persist(id, |t| t.content = Some(text.clone())).await?;

        let summary = self.summarizer.summarize(&text).await?;
        let updated = self
            .persist(id, |t| {
                t.status = TaskStatus::Completed;
                t.summary = Some(summary.clone());
            })
            .await?;

        info!("Live task {} completed", id);
        Ok(updated)
    }

    /// Same tail as `summarize_live`, starting from an audio URL that
    /// is already public — no upload step.
    pub async fn process_with_known_url(
        &self,
        id: &str,
        url_override: Option<String>,
    ) -> PipelineResult<Task> {
        let task = self.require(id).await?;
        let audio_url = url_override
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| task.url.clone());
        if audio_url.is_empty() {
            return Err(PipelineError::Precondition(format!(
                "task {} has no audio URL",
                id
            )));
        }

        let result = self.known_url_inner(id, &audio_url).await;
        self.fail_on_error(id, result).await
    }

    async fn known_url_inner(&self, id: &str, audio_url: &str) -> PipelineResult<Task> {
        self.persist(id, |t| t.status = TaskStatus::Processing).await?;

        let text = self.transcribe_guarded(id, audio_url).await?;
        self.persist(id, |t| t.content = Some(text.clone())).await?;

        let summary = self.summarizer.summarize(&text).await?;
        let updated = self
            .persist(id, |t| {
                t.status = TaskStatus::Completed;
                t.summary = Some(summary.clone());
            })
            .await?;

        info!("Task {} completed from known audio URL", id);
        Ok(updated)
    }

    /// Delete the task document and reclaim its audio artifacts: the
    /// local canonical file is removed and the remote object deleted,
    /// both best-effort. Every in-flight poll for the task is cancelled.
    pub async fn delete_task(&self, id: &str) -> PipelineResult<bool> {
        if let Some(attempts) = self.cancellations.lock().await.remove(id) {
            for token in attempts.into_values() {
                token.cancel();
            }
        }

        let task = self.tasks.get(id).await?;
        if !self.tasks.delete(id).await? {
            return Ok(false);
        }

        if let Some(filename) = task.and_then(|t| t.audio_file) {
            self.audio.remove(&filename).await;
            self.objects.delete(&format!("temp_audio/{}", filename)).await;
        }

        info!("Task {} deleted", id);
        Ok(true)
    }

    async fn transcribe_guarded(&self, id: &str, audio_url: &str) -> PipelineResult<String> {
        let attempt = self.attempt_counter.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        self.cancellations
            .lock()
            .await
            .entry(id.to_string())
            .or_default()
            .insert(attempt, token.clone());

        let result = self.transcriber.transcribe(audio_url, &token).await;

        let mut cancellations = self.cancellations.lock().await;
        if let Some(attempts) = cancellations.get_mut(id) {
            attempts.remove(&attempt);
            if attempts.is_empty() {
                cancellations.remove(id);
            }
        }
        result
    }

    async fn require(&self, id: &str) -> PipelineResult<Task> {
        self.tasks
            .get(id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("task {}", id)))
    }

    async fn persist<F>(&self, id: &str, apply: F) -> PipelineResult<Task>
    where
        F: FnOnce(&mut Task),
    {
        self.tasks
            .update(id, apply)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("task {}", id)))
    }

    /// Record a stage failure on the task before surfacing it.
    /// Preconditions are request validation, not stage failures, and
    /// leave the task untouched.
    async fn fail_on_error<T>(&self, id: &str, result: PipelineResult<T>) -> PipelineResult<T> {
        if let Err(e) = &result {
            if !matches!(e, PipelineError::Precondition(_)) {
                self.mark_failed(id, &e.to_string()).await;
            }
        }
        result
    }

    async fn mark_failed(&self, id: &str, cause: &str) {
        let cause = cause.to_string();
        let result = self
            .tasks
            .update(id, |t| {
                t.status = TaskStatus::Failed;
                t.is_recording = false;
                t.summary = Some(cause.clone());
            })
            .await;
        if let Err(e) = result {
            error!("Failed to record failure on task {}: {}", id, e);
        }
    }
}

fn require_kind(task: &Task, kind: TaskKind) -> PipelineResult<()> {
    if task.kind == kind {
        Ok(())
    } else {
        Err(PipelineError::Precondition(format!(
            "task {} is {}, expected {}",
            task.id,
            task.kind.as_str(),
            kind.as_str()
        )))
    }
}
