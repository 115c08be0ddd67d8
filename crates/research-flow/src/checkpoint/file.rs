//! File-based checkpointer
//!
//! One JSON file per step under `{base}/{run_id}/`, optionally zstd
//! compressed. Writes go to a temporary file that is renamed into place.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{decode, encode, is_compressed, Checkpoint, Checkpointer};
use crate::error::FlowError;

#[derive(Debug)]
pub struct FileCheckpointer {
    run_id: String,
    /// Run-specific subdirectory
    run_path: PathBuf,
    compression: bool,
}

impl FileCheckpointer {
    /// * `base_path` - Base directory shared by all runs
    /// * `run_id` - Run whose checkpoints live in `{base_path}/{run_id}`
    /// * `compression` - Whether to compress checkpoint data
    pub fn new(base_path: impl Into<PathBuf>, run_id: impl Into<String>, compression: bool) -> Self {
        let run_id = run_id.into();
        let run_path = base_path.into().join(&run_id);

        Self {
            run_id,
            run_path,
            compression,
        }
    }

    fn checkpoint_path(&self, step: usize) -> PathBuf {
        self.path_for(step, self.compression)
    }

    fn path_for(&self, step: usize, compressed: bool) -> PathBuf {
        let filename = if compressed {
            format!("checkpoint_{:05}.json.zst", step)
        } else {
            format!("checkpoint_{:05}.json", step)
        };
        self.run_path.join(filename)
    }

    /// Existing file for `step`.
    ///
    /// The run may have been written with the other compression setting, so
    /// both forms are checked, the active one first.
    fn existing_path(&self, step: usize) -> Option<PathBuf> {
        [self.compression, !self.compression]
            .into_iter()
            .map(|compressed| self.path_for(step, compressed))
            .find(|path| path.exists())
    }

    fn temp_path(&self, step: usize) -> PathBuf {
        self.run_path.join(format!("checkpoint_{:05}.tmp", step))
    }

    /// Parse the step number from a checkpoint filename
    fn parse_step(path: &Path) -> Option<usize> {
        let filename = path.file_name()?.to_str()?;
        if filename.ends_with(".tmp") {
            return None;
        }

        filename
            .strip_prefix("checkpoint_")?
            .split('.')
            .next()?
            .parse()
            .ok()
    }
}

#[async_trait]
impl Checkpointer for FileCheckpointer {
    fn run_id(&self) -> &str {
        &self.run_id
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), FlowError> {
        fs::create_dir_all(&self.run_path)
            .await
            .map_err(|e| FlowError::checkpoint_error(format!("Failed to create directory: {}", e)))?;

        let data = encode(checkpoint, self.compression)?;
        let temp_path = self.temp_path(checkpoint.step);
        let final_path = self.checkpoint_path(checkpoint.step);

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| FlowError::checkpoint_error(format!("Failed to create temp file: {}", e)))?;

        file.write_all(&data)
            .await
            .map_err(|e| FlowError::checkpoint_error(format!("Failed to write data: {}", e)))?;

        file.sync_all()
            .await
            .map_err(|e| FlowError::checkpoint_error(format!("Failed to sync file: {}", e)))?;

        fs::rename(&temp_path, &final_path)
            .await
            .map_err(|e| FlowError::checkpoint_error(format!("Failed to rename file: {}", e)))?;

        Ok(())
    }

    async fn load(&self, step: usize) -> Result<Option<Checkpoint>, FlowError> {
        let Some(path) = self.existing_path(step) else {
            return Ok(None);
        };

        let data = fs::read(&path)
            .await
            .map_err(|e| FlowError::checkpoint_error(format!("Failed to read file: {}", e)))?;

        decode(&data, is_compressed(&data)).map(Some)
    }

    async fn latest(&self) -> Result<Option<Checkpoint>, FlowError> {
        match self.list().await?.last() {
            Some(&step) => self.load(step).await,
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<usize>, FlowError> {
        if !self.run_path.exists() {
            return Ok(Vec::new());
        }

        let mut entries = fs::read_dir(&self.run_path)
            .await
            .map_err(|e| FlowError::checkpoint_error(format!("Failed to read directory: {}", e)))?;

        let mut steps = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| FlowError::checkpoint_error(format!("Failed to read entry: {}", e)))?
        {
            if let Some(step) = Self::parse_step(&entry.path()) {
                steps.push(step);
            }
        }

        steps.sort();
        steps.dedup();
        Ok(steps)
    }

    async fn delete(&self, step: usize) -> Result<(), FlowError> {
        for compressed in [true, false] {
            let path = self.path_for(step, compressed);
            if path.exists() {
                fs::remove_file(&path)
                    .await
                    .map_err(|e| FlowError::checkpoint_error(format!("Failed to delete file: {}", e)))?;
            }
        }

        Ok(())
    }
}
