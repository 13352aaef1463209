//! End-to-end pipeline scenarios with mocked remote collaborators.
//!
//! Real task and audio stores on disk; page fetcher, summarizer,
//! transcription service and object store replaced by recording stubs.

use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use briefer::audio::AudioStore;
use briefer::error::{PipelineError, PipelineResult};
use briefer::object_store::RemoteStore;
use briefer::pipeline::fetch::PageFetcher;
use briefer::pipeline::TaskPipeline;
use briefer::summarize::Summarizer;
use briefer::task::{Task, TaskKind, TaskStatus, TaskStore};
use briefer::transcribe::TranscriptionService;

struct StubFetcher {
    response: Result<String, String>,
}

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch(&self, _url: &str) -> PipelineResult<String> {
        match &self.response {
            Ok(html) => Ok(html.clone()),
            Err(message) => Err(PipelineError::Remote(message.clone())),
        }
    }
}

struct StubSummarizer {
    response: String,
    inputs: Mutex<Vec<String>>,
}

impl StubSummarizer {
    fn returning(response: &str) -> Self {
        Self {
            response: response.to_string(),
            inputs: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Summarizer for StubSummarizer {
    async fn summarize(&self, content: &str) -> PipelineResult<String> {
        self.inputs.lock().unwrap().push(content.to_string());
        Ok(self.response.clone())
    }
}

struct StubTranscriber {
    response: Result<String, String>,
    urls: Mutex<Vec<String>>,
}

impl StubTranscriber {
    fn returning(text: &str) -> Self {
        Self {
            response: Ok(text.to_string()),
            urls: Mutex::new(Vec::new()),
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
            urls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TranscriptionService for StubTranscriber {
    async fn transcribe(
        &self,
        audio_url: &str,
        _cancel: &CancellationToken,
    ) -> PipelineResult<String> {
        self.urls.lock().unwrap().push(audio_url.to_string());
        match &self.response {
            Ok(text) => Ok(text.clone()),
            Err(message) => Err(PipelineError::Transcription(message.clone())),
        }
    }
}

/// Signals when a transcription starts, then blocks until its token
/// fires.
struct HangingTranscriber {
    started: tokio::sync::Semaphore,
}

impl HangingTranscriber {
    fn new() -> Self {
        Self {
            started: tokio::sync::Semaphore::new(0),
        }
    }
}

#[async_trait]
impl TranscriptionService for HangingTranscriber {
    async fn transcribe(
        &self,
        _audio_url: &str,
        cancel: &CancellationToken,
    ) -> PipelineResult<String> {
        self.started.add_permits(1);
        cancel.cancelled().await;
        Err(PipelineError::Cancelled)
    }
}

#[derive(Default)]
struct RecordingStore {
    puts: Mutex<Vec<String>>,
    deletes: Mutex<Vec<String>>,
}

#[async_trait]
impl RemoteStore for RecordingStore {
    async fn put(&self, _local_path: &Path, key: &str) -> PipelineResult<String> {
        self.puts.lock().unwrap().push(key.to_string());
        Ok(format!("https://cdn.example/{}", key))
    }

    async fn delete(&self, key: &str) {
        self.deletes.lock().unwrap().push(key.to_string());
    }
}

struct Fixture {
    _data: tempfile::TempDir,
    tasks: Arc<TaskStore>,
    audio: Arc<AudioStore>,
    objects: Arc<RecordingStore>,
    transcriber: Arc<StubTranscriber>,
    summarizer: Arc<StubSummarizer>,
    pipeline: TaskPipeline,
}

fn fixture(
    fetcher: StubFetcher,
    transcriber: StubTranscriber,
    summarizer: StubSummarizer,
) -> Fixture {
    let data = tempfile::tempdir().unwrap();
    let tasks = Arc::new(TaskStore::new(data.path().join("tasks")).unwrap());
    let audio = Arc::new(AudioStore::new(data.path().join("audio")).unwrap());
    let objects = Arc::new(RecordingStore::default());
    let transcriber = Arc::new(transcriber);
    let summarizer = Arc::new(summarizer);

    let pipeline = TaskPipeline::new(
        tasks.clone(),
        audio.clone(),
        objects.clone(),
        transcriber.clone(),
        summarizer.clone(),
        Arc::new(fetcher),
    );

    Fixture {
        _data: data,
        tasks,
        audio,
        objects,
        transcriber,
        summarizer,
        pipeline,
    }
}

fn webpage_fixture(html: &str, summary: &str) -> Fixture {
    fixture(
        StubFetcher {
            response: Ok(html.to_string()),
        },
        StubTranscriber::returning("unused"),
        StubSummarizer::returning(summary),
    )
}

async fn seed_task(fx: &Fixture, id: &str, kind: TaskKind, url: &str) {
    let mut task = Task::new("test task", kind, url);
    task.id = id.to_string();
    fx.tasks.put(&task).await.unwrap();
}

#[tokio::test]
async fn webpage_task_completes_with_content_and_summary() {
    let fx = webpage_fixture(
        "<html><body><p>Hello</p></body></html>",
        "# Summary\nHello.",
    );
    seed_task(&fx, "t1", TaskKind::Webpage, "https://example.com").await;

    let task = fx.pipeline.summarize_webpage("t1").await.unwrap();

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.content.as_deref(), Some("Hello"));
    assert_eq!(task.summary.as_deref(), Some("# Summary\nHello."));
    // The summarizer saw the extracted text, not the raw markup
    assert_eq!(fx.summarizer.inputs.lock().unwrap().as_slice(), ["Hello"]);
}

#[tokio::test]
async fn webpage_fetch_failure_marks_task_failed() {
    let fx = fixture(
        StubFetcher {
            response: Err("connection refused".to_string()),
        },
        StubTranscriber::returning("unused"),
        StubSummarizer::returning("unused"),
    );
    seed_task(&fx, "t1", TaskKind::Webpage, "https://example.com").await;

    let err = fx.pipeline.summarize_webpage("t1").await.unwrap_err();
    assert!(matches!(err, PipelineError::Remote(_)));

    let task = fx.tasks.get("t1").await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.summary.unwrap().contains("connection refused"));
}

#[tokio::test]
async fn summarize_webpage_rejects_live_task() {
    let fx = webpage_fixture("<p>x</p>", "unused");
    seed_task(&fx, "t1", TaskKind::Live, "").await;

    let err = fx.pipeline.summarize_webpage("t1").await.unwrap_err();
    assert!(matches!(err, PipelineError::Precondition(_)));

    // Validation failures leave the task untouched
    let task = fx.tasks.get("t1").await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
}

#[tokio::test]
async fn missing_task_is_not_found() {
    let fx = webpage_fixture("<p>x</p>", "unused");
    let err = fx.pipeline.summarize_webpage("ghost").await.unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)));
}

#[tokio::test]
async fn summarize_live_without_audio_is_precondition_error() {
    let fx = fixture(
        StubFetcher {
            response: Ok(String::new()),
        },
        StubTranscriber::returning("unused"),
        StubSummarizer::returning("unused"),
    );
    seed_task(&fx, "t1", TaskKind::Live, "").await;

    let err = fx.pipeline.summarize_live("t1").await.unwrap_err();
    assert!(matches!(err, PipelineError::Precondition(_)));

    let task = fx.tasks.get("t1").await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
}

#[tokio::test]
async fn live_task_uploads_transcribes_and_completes() {
    let fx = fixture(
        StubFetcher {
            response: Ok(String::new()),
        },
        StubTranscriber::returning("hello from the recording"),
        StubSummarizer::returning("**Overview** of the recording"),
    );
    seed_task(&fx, "t1", TaskKind::Live, "").await;
    std::fs::write(fx.audio.path_for("t1.webm"), b"audio-bytes").unwrap();

    let task = fx.pipeline.summarize_live("t1").await.unwrap();

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.audio_file.as_deref(), Some("t1.webm"));
    assert_eq!(task.content.as_deref(), Some("hello from the recording"));
    assert_eq!(
        task.summary.as_deref(),
        Some("**Overview** of the recording")
    );

    assert_eq!(
        fx.objects.puts.lock().unwrap().as_slice(),
        ["temp_audio/t1.webm"]
    );
    assert_eq!(
        fx.transcriber.urls.lock().unwrap().as_slice(),
        ["https://cdn.example/temp_audio/t1.webm"]
    );
}

#[tokio::test]
async fn resubmission_reuses_the_same_object_key() {
    let fx = fixture(
        StubFetcher {
            response: Ok(String::new()),
        },
        StubTranscriber::returning("text"),
        StubSummarizer::returning("summary"),
    );
    seed_task(&fx, "t1", TaskKind::Live, "").await;
    std::fs::write(fx.audio.path_for("t1.webm"), b"audio-bytes").unwrap();

    fx.pipeline.summarize_live("t1").await.unwrap();
    fx.pipeline.summarize_live("t1").await.unwrap();

    let puts = fx.objects.puts.lock().unwrap();
    assert_eq!(puts.len(), 2);
    assert_eq!(puts[0], puts[1]);
}

#[tokio::test]
async fn failed_transcription_marks_task_and_reclaims_object() {
    let fx = fixture(
        StubFetcher {
            response: Ok(String::new()),
        },
        StubTranscriber::failing("bad audio"),
        StubSummarizer::returning("unused"),
    );
    seed_task(&fx, "t1", TaskKind::Live, "").await;
    std::fs::write(fx.audio.path_for("t1.webm"), b"audio-bytes").unwrap();

    let err = fx.pipeline.summarize_live("t1").await.unwrap_err();
    match err {
        PipelineError::Transcription(message) => assert_eq!(message, "bad audio"),
        other => panic!("expected Transcription error, got {:?}", other),
    }

    let task = fx.tasks.get("t1").await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.summary.unwrap().contains("bad audio"));

    assert_eq!(
        fx.objects.deletes.lock().unwrap().as_slice(),
        ["temp_audio/t1.webm"]
    );
}

#[tokio::test]
async fn process_with_known_url_skips_upload() {
    let fx = fixture(
        StubFetcher {
            response: Ok(String::new()),
        },
        StubTranscriber::returning("spoken words"),
        StubSummarizer::returning("summary"),
    );
    seed_task(
        &fx,
        "t1",
        TaskKind::Live,
        "https://cdn.example/already-public.mp3",
    )
    .await;

    let task = fx.pipeline.process_with_known_url("t1", None).await.unwrap();

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.content.as_deref(), Some("spoken words"));
    assert!(fx.objects.puts.lock().unwrap().is_empty());
    assert_eq!(
        fx.transcriber.urls.lock().unwrap().as_slice(),
        ["https://cdn.example/already-public.mp3"]
    );
}

#[tokio::test]
async fn capture_lifecycle_start_stop() {
    let fx = fixture(
        StubFetcher {
            response: Ok(String::new()),
        },
        StubTranscriber::returning("unused"),
        StubSummarizer::returning("unused"),
    );
    seed_task(&fx, "t1", TaskKind::Live, "").await;

    let task = fx.pipeline.start_capture("t1").await.unwrap();
    assert_eq!(task.status, TaskStatus::Processing);
    assert!(task.is_recording);

    // Chunks arrive while the session is open
    fx.audio.append_chunk("t1", "webm", b"chunk1").await.unwrap();
    fx.audio.append_chunk("t1", "webm", b"chunk2").await.unwrap();

    let task = fx.pipeline.stop_capture("t1").await.unwrap();
    assert!(!task.is_recording);
    assert_eq!(task.audio_file.as_deref(), Some("t1.webm"));
    assert_eq!(
        std::fs::read(fx.audio.path_for("t1.webm")).unwrap(),
        b"chunk1chunk2"
    );
}

#[tokio::test]
async fn start_capture_rejects_webpage_task() {
    let fx = webpage_fixture("<p>x</p>", "unused");
    seed_task(&fx, "t1", TaskKind::Webpage, "https://example.com").await;

    let err = fx.pipeline.start_capture("t1").await.unwrap_err();
    assert!(matches!(err, PipelineError::Precondition(_)));
}

#[tokio::test]
async fn capture_failed_records_cause_and_drops_recording_flag() {
    let fx = fixture(
        StubFetcher {
            response: Ok(String::new()),
        },
        StubTranscriber::returning("unused"),
        StubSummarizer::returning("unused"),
    );
    seed_task(&fx, "t1", TaskKind::Live, "").await;
    fx.pipeline.start_capture("t1").await.unwrap();

    let task = fx
        .pipeline
        .capture_failed("t1", "microphone permission denied")
        .await
        .unwrap();

    assert_eq!(task.status, TaskStatus::Failed);
    assert!(!task.is_recording);
    assert!(task
        .summary
        .unwrap()
        .contains("microphone permission denied"));
}

#[tokio::test]
async fn stop_capture_without_any_audio_marks_task_failed() {
    let fx = fixture(
        StubFetcher {
            response: Ok(String::new()),
        },
        StubTranscriber::returning("unused"),
        StubSummarizer::returning("unused"),
    );
    seed_task(&fx, "t1", TaskKind::Live, "").await;
    fx.pipeline.start_capture("t1").await.unwrap();

    let err = fx.pipeline.stop_capture("t1").await.unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)));

    let task = fx.tasks.get("t1").await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(!task.is_recording);
}

#[tokio::test]
async fn retry_after_failure_reaches_completed() {
    let fx = fixture(
        StubFetcher {
            response: Ok(String::new()),
        },
        StubTranscriber::returning("recovered text"),
        StubSummarizer::returning("summary"),
    );
    seed_task(&fx, "t1", TaskKind::Live, "").await;
    std::fs::write(fx.audio.path_for("t1.webm"), b"audio-bytes").unwrap();

    // Simulate an earlier failed attempt
    fx.tasks
        .update("t1", |t| {
            t.status = TaskStatus::Failed;
            t.summary = Some("timed out: transcription job still running".to_string());
        })
        .await
        .unwrap();

    let task = fx.pipeline.summarize_live("t1").await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.summary.as_deref(), Some("summary"));
}

#[tokio::test]
async fn capture_failed_rejects_webpage_task() {
    let fx = webpage_fixture("<p>x</p>", "unused");
    seed_task(&fx, "t1", TaskKind::Webpage, "https://example.com").await;

    let err = fx
        .pipeline
        .capture_failed("t1", "microphone permission denied")
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Precondition(_)));

    // A capture-phase endpoint cannot fail a webpage task
    let task = fx.tasks.get("t1").await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert!(task.summary.is_none());
}

#[tokio::test]
async fn delete_task_cancels_every_in_flight_poll() {
    let data = tempfile::tempdir().unwrap();
    let tasks = Arc::new(TaskStore::new(data.path().join("tasks")).unwrap());
    let audio = Arc::new(AudioStore::new(data.path().join("audio")).unwrap());
    let transcriber = Arc::new(HangingTranscriber::new());

    let pipeline = Arc::new(TaskPipeline::new(
        tasks.clone(),
        audio.clone(),
        Arc::new(RecordingStore::default()),
        transcriber.clone(),
        Arc::new(StubSummarizer::returning("unused")),
        Arc::new(StubFetcher {
            response: Ok(String::new()),
        }),
    ));

    let mut task = Task::new("test task", TaskKind::Live, "");
    task.id = "t1".to_string();
    tasks.put(&task).await.unwrap();
    std::fs::write(audio.path_for("t1.webm"), b"audio-bytes").unwrap();

    let first = tokio::spawn({
        let pipeline = pipeline.clone();
        async move { pipeline.summarize_live("t1").await }
    });
    let second = tokio::spawn({
        let pipeline = pipeline.clone();
        async move { pipeline.summarize_live("t1").await }
    });

    // Both polls are in flight before the delete lands
    let permits = transcriber.started.acquire_many(2).await.unwrap();
    drop(permits);

    assert!(pipeline.delete_task("t1").await.unwrap());

    let first = first.await.unwrap().unwrap_err();
    let second = second.await.unwrap().unwrap_err();
    assert!(matches!(first, PipelineError::Cancelled));
    assert!(matches!(second, PipelineError::Cancelled));
}

#[tokio::test]
async fn delete_task_reclaims_audio_artifacts() {
    let fx = fixture(
        StubFetcher {
            response: Ok(String::new()),
        },
        StubTranscriber::returning("text"),
        StubSummarizer::returning("summary"),
    );
    seed_task(&fx, "t1", TaskKind::Live, "").await;
    std::fs::write(fx.audio.path_for("t1.webm"), b"audio-bytes").unwrap();
    fx.pipeline.summarize_live("t1").await.unwrap();

    assert!(fx.pipeline.delete_task("t1").await.unwrap());

    assert!(fx.tasks.get("t1").await.unwrap().is_none());
    assert!(!fx.audio.path_for("t1.webm").exists());
    assert_eq!(
        fx.objects.deletes.lock().unwrap().as_slice(),
        ["temp_audio/t1.webm"]
    );

    // Deleting again reports missing
    assert!(!fx.pipeline.delete_task("t1").await.unwrap());
}
