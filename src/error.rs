//! Pipeline error taxonomy.
//!
//! Every stage failure is one of these variants; the API layer maps them
//! to HTTP status codes, and the orchestrator writes the display string
//! into the failed task's summary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required credential or configuration field is absent.
    /// Never auto-retried.
    #[error("missing configuration: {0}")]
    Config(String),

    /// A local resource (task document, audio file) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation was requested before an earlier phase produced
    /// what it needs (e.g. summarizing live audio with no recording).
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Upload to the remote object store failed, or the local source
    /// file was missing.
    #[error("upload failed: {0}")]
    Upload(String),

    /// A remote endpoint returned a non-success status or the network
    /// call itself failed. Carries upstream status and body where known.
    #[error("remote call failed: {0}")]
    Remote(String),

    /// The polling ceiling was exceeded. Safe to retry from scratch:
    /// object keys are deterministic, so resubmission overwrites.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The transcription service reported the job as FAILED.
    #[error("transcription failed: {0}")]
    Transcription(String),

    /// The summarization endpoint answered 2xx but carried no choices.
    #[error("summarization endpoint returned no choices")]
    EmptyResponse,

    /// The operation was cancelled before completing.
    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Task store or other internal failure.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
