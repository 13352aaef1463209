//! Remote transcription job client.
//!
//! Submits an async speech-to-text job referencing a public audio URL,
//! polls it to completion under a deadline and a cancellation token,
//! then normalizes the variant result payload into plain text.

pub mod extract;

use async_trait::async_trait;
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ConfigStore;
use crate::error::{PipelineError, PipelineResult};
use extract::HttpResultFetcher;

pub const POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const MAX_POLL_ATTEMPTS: u32 = 30;

/// Seam the pipeline uses; implemented by [`DashScopeTranscriber`] and
/// by test doubles.
#[async_trait]
pub trait TranscriptionService: Send + Sync {
    /// Submit, poll and extract. Returns trimmed text, never empty.
    async fn transcribe(
        &self,
        audio_url: &str,
        cancel: &CancellationToken,
    ) -> PipelineResult<String>;
}

/// One observed state of a remote job.
#[derive(Debug)]
pub enum JobState {
    Running,
    Succeeded(Vec<Value>),
    Failed(String),
}

/// Poll until the job leaves RUNNING, the attempt ceiling is reached,
/// or the token fires.
///
/// Exactly `max_attempts` status fetches happen before `Timeout`;
/// callers retry from scratch rather than resuming, which is safe
/// because object keys are deterministic.
pub async fn poll_loop<F, Fut>(
    mut fetch_status: F,
    interval: Duration,
    max_attempts: u32,
    cancel: &CancellationToken,
) -> PipelineResult<Vec<Value>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PipelineResult<JobState>>,
{
    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        match fetch_status().await? {
            JobState::Succeeded(results) => return Ok(results),
            JobState::Failed(message) => return Err(PipelineError::Transcription(message)),
            JobState::Running => {
                debug!("Transcription job still running (poll {}/{})", attempt, max_attempts);
                if attempt < max_attempts {
                    tokio::select! {
                        _ = sleep(interval) => {}
                        _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                    }
                }
            }
        }
    }

    Err(PipelineError::Timeout(format!(
        "transcription job still running after {} polls",
        max_attempts
    )))
}

/// DashScope-style async transcription client. Credentials are re-read
/// from the config store on every submission so edits made over the API
/// take effect without a restart; `DASHSCOPE_API_KEY` overrides the
/// stored key.
pub struct DashScopeTranscriber {
    http: reqwest::Client,
    config: ConfigStore,
}

impl DashScopeTranscriber {
    pub fn new(config: ConfigStore) -> Self {
        // Per-call ceiling; the overall polling deadline is enforced by
        // the attempt count.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { http, config }
    }

    fn credentials(&self) -> PipelineResult<(String, String, String)> {
        let transcription = self
            .config
            .load()
            .map(|c| c.transcription)
            .unwrap_or_default();

        let api_key = transcription.effective_api_key().ok_or_else(|| {
            PipelineError::Config("transcription API key is not configured".to_string())
        })?;
        let base_url = transcription
            .base_url
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                PipelineError::Config("transcription base URL is not configured".to_string())
            })?;
        let model = transcription
            .model
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                PipelineError::Config("transcription model is not configured".to_string())
            })?;

        Ok((base_url, model, api_key))
    }

    /// Submit the job. Returns the service-assigned job id.
    pub async fn submit(&self, audio_url: &str) -> PipelineResult<String> {
        let (base_url, model, api_key) = self.credentials()?;

        let body = json!({
            "model": model,
            "input": { "file_urls": [audio_url] },
        });

        let response = self
            .http
            .post(format!("{}/services/audio/asr/transcription", base_url))
            .bearer_auth(&api_key)
            .header("X-DashScope-Async", "enable")
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::Remote(format!("job submission failed: {}", e)))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(PipelineError::Remote(format!(
                "job submission returned {}: {}",
                status, text
            )));
        }

        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| PipelineError::Remote(format!("job submission body invalid: {}", e)))?;
        let job_id = parsed
            .pointer("/output/task_id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                PipelineError::Remote("job submission response carried no task id".to_string())
            })?
            .to_string();

        info!("Transcription job submitted: {}", job_id);
        Ok(job_id)
    }

    async fn fetch_status(&self, job_id: &str) -> PipelineResult<JobState> {
        let (base_url, _, api_key) = self.credentials()?;

        let response = self
            .http
            .get(format!("{}/tasks/{}", base_url, job_id))
            .bearer_auth(&api_key)
            .send()
            .await
            .map_err(|e| PipelineError::Remote(format!("job poll failed: {}", e)))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| PipelineError::Remote(format!("job poll body invalid: {}", e)))?;
        if !status.is_success() {
            return Err(PipelineError::Remote(format!(
                "job poll returned {}: {}",
                status, body
            )));
        }

        Ok(parse_job_state(&body))
    }
}

/// Map a poll response body to a job state. Unknown statuses are
/// treated as still running so a new upstream status value cannot fail
/// a healthy job.
pub fn parse_job_state(body: &Value) -> JobState {
    let status = body
        .pointer("/output/task_status")
        .and_then(Value::as_str)
        .unwrap_or("RUNNING");

    match status {
        "SUCCEEDED" => {
            let results = body
                .pointer("/output/results")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            JobState::Succeeded(results)
        }
        "FAILED" => {
            let message = body
                .pointer("/output/message")
                .or_else(|| body.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("transcription job failed")
                .to_string();
            JobState::Failed(message)
        }
        _ => JobState::Running,
    }
}

#[async_trait]
impl TranscriptionService for DashScopeTranscriber {
    async fn transcribe(
        &self,
        audio_url: &str,
        cancel: &CancellationToken,
    ) -> PipelineResult<String> {
        let job_id = self.submit(audio_url).await?;
        let results = poll_loop(
            || self.fetch_status(&job_id),
            POLL_INTERVAL,
            MAX_POLL_ATTEMPTS,
            cancel,
        )
        .await?;

        let fetcher = HttpResultFetcher::new(self.http.clone());
        let text = extract::extract_text(&results, &fetcher).await?;
        info!("Transcription job {} complete: {} chars", job_id, text.len());
        Ok(text)
    }
}
