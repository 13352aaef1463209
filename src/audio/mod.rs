//! Capture reconciliation: turns whatever the capture session left in
//! the audio directory into one canonical per-task file.
//!
//! Two pathways, matching how the UI delivers audio:
//! - a single complete upload named `{task_id}.<ext>` → `finalize`
//! - chunked appends into `{task_id}_temp.<ext>` → `merge`
//!
//! Byte concatenation of sequential chunks is only valid because the
//! chunks are container-independent sub-segments of one encoding; a
//! mixed-container capture would need remuxing instead.

use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, PipelineResult};

/// Extensions the capture UI is known to produce.
pub const AUDIO_EXTENSIONS: &[&str] = &["webm", "wav", "mp3", "m4a", "ogg"];

pub fn content_type_for(ext: &str) -> &'static str {
    match ext {
        "webm" => "audio/webm",
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "ogg" => "audio/ogg",
        _ => "application/octet-stream",
    }
}

pub struct AudioStore {
    dir: PathBuf,
}

impl AudioStore {
    pub fn new(dir: PathBuf) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    /// The canonical audio file for a task, if one exists.
    pub async fn canonical(&self, task_id: &str) -> PipelineResult<Option<PathBuf>> {
        self.find_with_stem(task_id).await
    }

    /// Append a capture chunk to the task's temp file, creating it on
    /// first write.
    pub async fn append_chunk(
        &self,
        task_id: &str,
        ext: &str,
        bytes: &[u8],
    ) -> PipelineResult<()> {
        let ext = if AUDIO_EXTENSIONS.contains(&ext) {
            ext
        } else {
            "webm"
        };
        let path = self.dir.join(format!("{}_temp.{}", task_id, ext));

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(bytes).await?;
        file.flush().await?;

        debug!("Appended {} bytes to {:?}", bytes.len(), path);
        Ok(())
    }

    /// Promote a complete upload named after the task id to the
    /// canonical file. The rename is an identity operation when the
    /// upload already carries the canonical name.
    pub async fn finalize(&self, task_id: &str) -> PipelineResult<String> {
        let source = self.find_with_stem(task_id).await?.ok_or_else(|| {
            PipelineError::NotFound(format!("no audio file found for task {}", task_id))
        })?;

        let ext = extension_of(&source);
        let filename = format!("{}.{}", task_id, ext);
        let target = self.dir.join(&filename);
        if source != target {
            tokio::fs::rename(&source, &target).await?;
        }

        info!("Finalized audio for task {}: {}", task_id, filename);
        Ok(filename)
    }

    /// Fold the temp file into the canonical file.
    ///
    /// No canonical file yet: the temp file is renamed. Canonical file
    /// present: temp bytes are appended to it. The temp file is gone
    /// either way, so a second merge for the same capture reports
    /// `NotFound` instead of appending twice.
    pub async fn merge(&self, task_id: &str) -> PipelineResult<String> {
        let temp_stem = format!("{}_temp", task_id);
        let temp = self.find_with_stem(&temp_stem).await?.ok_or_else(|| {
            PipelineError::NotFound(format!("no temp audio file found for task {}", task_id))
        })?;

        let filename = match self.find_with_stem(task_id).await? {
            Some(canonical) => {
                let chunk = tokio::fs::read(&temp).await?;
                let mut file = tokio::fs::OpenOptions::new()
                    .append(true)
                    .open(&canonical)
                    .await?;
                file.write_all(&chunk).await?;
                file.flush().await?;
                tokio::fs::remove_file(&temp).await?;
                file_name_of(&canonical)
            }
            None => {
                let filename = format!("{}.{}", task_id, extension_of(&temp));
                tokio::fs::rename(&temp, self.dir.join(&filename)).await?;
                filename
            }
        };

        info!("Merged audio for task {}: {}", task_id, filename);
        Ok(filename)
    }

    /// Best-effort removal of a stored audio file.
    pub async fn remove(&self, filename: &str) {
        let path = self.dir.join(filename);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove audio file {:?}: {}", path, e);
            }
        }
    }

    async fn find_with_stem(&self, stem: &str) -> PipelineResult<Option<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let matches_stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(|s| s == stem)
                .unwrap_or(false);
            let known_ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| AUDIO_EXTENSIONS.contains(&e))
                .unwrap_or(false);
            if matches_stem && known_ext {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("webm")
        .to_string()
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string()
}
