//! Per-task JSON document storage.
//!
//! One file per task under the tasks directory. Writes to the same task
//! are serialized by a per-id async lock so read-modify-write updates
//! from concurrent pipeline stages cannot interleave; different tasks
//! stay fully independent.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

use super::Task;

pub struct TaskStore {
    dir: PathBuf,
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TaskStore {
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir).context("Failed to create tasks directory")?;
        Ok(Self {
            dir,
            locks: std::sync::Mutex::new(HashMap::new()),
        })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("task lock map poisoned");
        locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn get(&self, id: &str) -> Result<Option<Task>> {
        let path = self.path_for(id);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let task = serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse task document {}", id))?;
                Ok(Some(task))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context("Failed to read task document"),
        }
    }

    pub async fn put(&self, task: &Task) -> Result<()> {
        let lock = self.lock_for(&task.id);
        let _guard = lock.lock().await;
        self.write_unlocked(task).await
    }

    /// Read-modify-write under the task's lock. Returns the updated
    /// task, or `None` if the task does not exist.
    pub async fn update<F>(&self, id: &str, apply: F) -> Result<Option<Task>>
    where
        F: FnOnce(&mut Task),
    {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let Some(mut task) = self.get(id).await? else {
            return Ok(None);
        };
        apply(&mut task);
        self.write_unlocked(&task).await?;
        Ok(Some(task))
    }

    pub async fn list(&self) -> Result<Vec<Task>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .context("Failed to read tasks directory")?;

        let mut tasks = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = tokio::fs::read_to_string(&path).await?;
            match serde_json::from_str::<Task>(&content) {
                Ok(task) => tasks.push(task),
                // A corrupt document should not take down the listing
                Err(e) => warn!("Skipping unreadable task document {:?}: {}", path, e),
            }
        }

        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }

    /// Returns whether a document was actually removed.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).context("Failed to delete task document"),
        }
    }

    async fn write_unlocked(&self, task: &Task) -> Result<()> {
        let content =
            serde_json::to_string_pretty(task).context("Failed to serialize task")?;
        tokio::fs::write(self.path_for(&task.id), content)
            .await
            .context("Failed to write task document")?;
        Ok(())
    }
}
