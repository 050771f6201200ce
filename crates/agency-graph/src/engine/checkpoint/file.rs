//! File-based checkpointer
//!
//! Stores each checkpoint as a JSON file, optionally zstd-compressed.
//!
//! # Directory Structure
//!
//! ```text
//! checkpoints/
//! └── {run_id}/
//!     ├── checkpoint_00001.json[.zst]
//!     ├── checkpoint_00002.json[.zst]
//!     └── checkpoint_00007.json[.zst]
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{decode, encode, Checkpoint, Checkpointer};
use crate::engine::error::GraphError;

/// File-based checkpointer for a single run.
///
/// Atomic writes are ensured via temporary file + rename.
#[derive(Debug, Clone)]
pub struct FileCheckpointer {
    run_path: PathBuf,
    compression: bool,
}

impl FileCheckpointer {
    /// * `base_path` - directory shared by all runs
    /// * `run_id` - subdirectory for this run
    pub fn new(base_path: impl Into<PathBuf>, run_id: impl AsRef<str>, compression: bool) -> Self {
        Self {
            run_path: base_path.into().join(run_id.as_ref()),
            compression,
        }
    }

    pub fn run_path(&self) -> &Path {
        &self.run_path
    }

    fn checkpoint_path(&self, step: usize, compressed: bool) -> PathBuf {
        let filename = if compressed {
            format!("checkpoint_{:05}.json.zst", step)
        } else {
            format!("checkpoint_{:05}.json", step)
        };
        self.run_path.join(filename)
    }

    /// Path of an existing checkpoint and whether it is compressed.
    /// Files written under the other compression setting are still found.
    fn existing_path(&self, step: usize) -> Option<(PathBuf, bool)> {
        [self.compression, !self.compression]
            .into_iter()
            .map(|compressed| (self.checkpoint_path(step, compressed), compressed))
            .find(|(path, _)| path.exists())
    }

    fn temp_path(&self, step: usize) -> PathBuf {
        self.run_path.join(format!("checkpoint_{:05}.tmp", step))
    }

    /// Parse the step number from a checkpoint filename
    fn parse_step(path: &Path) -> Option<usize> {
        let filename = path.file_name()?.to_str()?;
        let rest = filename.strip_prefix("checkpoint_")?;
        if rest.ends_with(".tmp") {
            return None;
        }
        rest.split('.').next()?.parse().ok()
    }
}

#[async_trait]
impl Checkpointer for FileCheckpointer {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), GraphError> {
        fs::create_dir_all(&self.run_path)
            .await
            .map_err(|e| GraphError::checkpoint_error(format!("Failed to create directory: {}", e)))?;

        let data = encode(checkpoint, self.compression)?;
        let temp_path = self.temp_path(checkpoint.step);
        let final_path = self.checkpoint_path(checkpoint.step, self.compression);

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| GraphError::checkpoint_error(format!("Failed to create temp file: {}", e)))?;
        file.write_all(&data)
            .await
            .map_err(|e| GraphError::checkpoint_error(format!("Failed to write data: {}", e)))?;
        file.sync_all()
            .await
            .map_err(|e| GraphError::checkpoint_error(format!("Failed to sync file: {}", e)))?;

        fs::rename(&temp_path, &final_path)
            .await
            .map_err(|e| GraphError::checkpoint_error(format!("Failed to rename file: {}", e)))
    }

    async fn load(&self, step: usize) -> Result<Option<Checkpoint>, GraphError> {
        let Some((path, compressed)) = self.existing_path(step) else {
            return Ok(None);
        };

        let data = fs::read(&path)
            .await
            .map_err(|e| GraphError::checkpoint_error(format!("Failed to read file: {}", e)))?;

        decode(&data, compressed).map(Some)
    }

    async fn latest(&self) -> Result<Option<Checkpoint>, GraphError> {
        match self.list().await?.last() {
            Some(&step) => self.load(step).await,
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<usize>, GraphError> {
        if !self.run_path.exists() {
            return Ok(Vec::new());
        }

        let mut entries = fs::read_dir(&self.run_path)
            .await
            .map_err(|e| GraphError::checkpoint_error(format!("Failed to read directory: {}", e)))?;

        let mut steps = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| GraphError::checkpoint_error(format!("Failed to read entry: {}", e)))?
        {
            if let Some(step) = Self::parse_step(&entry.path()) {
                steps.push(step);
            }
        }

        steps.sort();
        steps.dedup();
        Ok(steps)
    }

    async fn delete(&self, step: usize) -> Result<(), GraphError> {
        if let Some((path, _)) = self.existing_path(step) {
            fs::remove_file(&path)
                .await
                .map_err(|e| GraphError::checkpoint_error(format!("Failed to delete file: {}", e)))?;
        }
        Ok(())
    }
}
