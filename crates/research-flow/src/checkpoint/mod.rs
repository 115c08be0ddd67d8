//! Checkpointing of workflow state
//!
//! A checkpoint is written after every transition of a run, so a run can be
//! resumed after a restart without re-executing a finished step.
//!
//! ```text
//! checkpoints/
//! └── {run_id}/
//!     ├── checkpoint_00001.json[.zst]
//!     ├── checkpoint_00002.json[.zst]
//!     └── ...
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use research_flow::checkpoint::{create_checkpointer, CheckpointerConfig};
//!
//! let config = CheckpointerConfig::File {
//!     path: PathBuf::from("./checkpoints"),
//!     compression: true,
//! };
//! let checkpointer = create_checkpointer(config, "acme-2024-q3").await?;
//!
//! if let Some(checkpoint) = checkpointer.latest().await? {
//!     println!("{} tasks done", checkpoint.state.completed_tasks.len());
//! }
//! ```

mod file;
#[cfg(feature = "checkpointer-sqlite")]
mod sqlite;

pub use file::FileCheckpointer;
#[cfg(feature = "checkpointer-sqlite")]
pub use sqlite::SqliteCheckpointer;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::FlowError;
use crate::model::WorkflowState;
use crate::orchestrator::Label;

/// Snapshot of a run taken after a transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Run this checkpoint belongs to
    pub run_id: String,

    /// Transition number (1-based, increasing)
    pub step: usize,

    /// Workflow state after the transition
    pub state: WorkflowState,

    /// Label the engine runs next
    pub next: Label,

    /// When this checkpoint was created
    pub timestamp: DateTime<Utc>,

    /// Optional metadata for debugging or external tools
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Checkpoint {
    pub fn new(run_id: impl Into<String>, step: usize, state: WorkflowState, next: Label) -> Self {
        Self {
            run_id: run_id.into(),
            step,
            state,
            next,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Add metadata to this checkpoint
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether the run had reached its terminal label
    pub fn is_terminal(&self) -> bool {
        self.next.is_terminal()
    }
}

/// Durable storage for the checkpoints of one run.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Run whose checkpoints this instance manages
    fn run_id(&self) -> &str;

    /// Save a checkpoint, replacing any previous one with the same step.
    ///
    /// Implementations should ensure atomic writes to prevent corruption.
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), FlowError>;

    /// Load a checkpoint by step number.
    async fn load(&self, step: usize) -> Result<Option<Checkpoint>, FlowError>;

    /// Load the checkpoint with the highest step number.
    async fn latest(&self) -> Result<Option<Checkpoint>, FlowError>;

    /// List all available step numbers, sorted ascending.
    async fn list(&self) -> Result<Vec<usize>, FlowError>;

    /// Delete a specific checkpoint.
    async fn delete(&self, step: usize) -> Result<(), FlowError>;

    /// Keep only the most recent `keep` checkpoints. Returns how many were deleted.
    async fn prune(&self, keep: usize) -> Result<usize, FlowError> {
        let steps = self.list().await?;
        let to_delete = steps.len().saturating_sub(keep);
        let mut deleted = 0;

        for step in steps.into_iter().take(to_delete) {
            self.delete(step).await?;
            deleted += 1;
        }

        Ok(deleted)
    }

    /// Clear all checkpoints of this run.
    async fn clear(&self) -> Result<(), FlowError> {
        for step in self.list().await? {
            self.delete(step).await?;
        }
        Ok(())
    }
}

/// Which checkpoint backend to use
#[derive(Debug, Clone, Default)]
pub enum CheckpointerConfig {
    /// In-memory checkpointing (not durable)
    #[default]
    Memory,

    /// JSON files, one per step
    File {
        /// Base directory for all runs
        path: PathBuf,
        /// Whether to compress checkpoint data with zstd
        compression: bool,
    },

    /// SQLite database (requires `checkpointer-sqlite` feature)
    #[cfg(feature = "checkpointer-sqlite")]
    Sqlite {
        /// Database file, or `:memory:`
        path: String,
        /// Whether to compress checkpoint data with zstd
        compression: bool,
    },
}

/// In-memory checkpointer for tests and throwaway runs.
#[derive(Debug)]
pub struct MemoryCheckpointer {
    run_id: String,
    checkpoints: tokio::sync::RwLock<HashMap<usize, Checkpoint>>,
}

impl MemoryCheckpointer {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            checkpoints: tokio::sync::RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Checkpointer for MemoryCheckpointer {
    fn run_id(&self) -> &str {
        &self.run_id
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), FlowError> {
        let mut checkpoints = self.checkpoints.write().await;
        checkpoints.insert(checkpoint.step, checkpoint.clone());
        Ok(())
    }

    async fn load(&self, step: usize) -> Result<Option<Checkpoint>, FlowError> {
        let checkpoints = self.checkpoints.read().await;
        Ok(checkpoints.get(&step).cloned())
    }

    async fn latest(&self) -> Result<Option<Checkpoint>, FlowError> {
        let checkpoints = self.checkpoints.read().await;
        let max_step = checkpoints.keys().max().copied();
        Ok(max_step.and_then(|step| checkpoints.get(&step).cloned()))
    }

    async fn list(&self) -> Result<Vec<usize>, FlowError> {
        let checkpoints = self.checkpoints.read().await;
        let mut steps: Vec<usize> = checkpoints.keys().copied().collect();
        steps.sort();
        Ok(steps)
    }

    async fn delete(&self, step: usize) -> Result<(), FlowError> {
        let mut checkpoints = self.checkpoints.write().await;
        checkpoints.remove(&step);
        Ok(())
    }
}

/// Create a checkpointer for a run from configuration.
pub async fn create_checkpointer(
    config: CheckpointerConfig,
    run_id: impl Into<String>,
) -> Result<Arc<dyn Checkpointer>, FlowError> {
    let run_id = run_id.into();

    match config {
        CheckpointerConfig::Memory => Ok(Arc::new(MemoryCheckpointer::new(run_id))),

        CheckpointerConfig::File { path, compression } => {
            Ok(Arc::new(FileCheckpointer::new(path, run_id, compression)))
        }

        #[cfg(feature = "checkpointer-sqlite")]
        CheckpointerConfig::Sqlite { path, compression } => {
            let checkpointer = SqliteCheckpointer::with_compression(&path, run_id, compression).await?;
            Ok(Arc::new(checkpointer))
        }
    }
}

pub(crate) fn encode(checkpoint: &Checkpoint, compression: bool) -> Result<Vec<u8>, FlowError> {
    let json = serde_json::to_vec_pretty(checkpoint)
        .map_err(|e| FlowError::checkpoint_error(format!("Serialization failed: {}", e)))?;

    if !compression {
        return Ok(json);
    }

    let mut encoder = zstd::stream::Encoder::new(Vec::new(), 3)
        .map_err(|e| FlowError::checkpoint_error(format!("Compression init failed: {}", e)))?;
    encoder
        .write_all(&json)
        .map_err(|e| FlowError::checkpoint_error(format!("Compression write failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| FlowError::checkpoint_error(format!("Compression finish failed: {}", e)))
}

/// zstd frame magic number
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Whether `data` was written by [`encode`] with compression on
pub(crate) fn is_compressed(data: &[u8]) -> bool {
    data.starts_with(&ZSTD_MAGIC)
}

pub(crate) fn decode(data: &[u8], compression: bool) -> Result<Checkpoint, FlowError> {
    let json = if compression {
        zstd::stream::decode_all(data)
            .map_err(|e| FlowError::checkpoint_error(format!("Decompression failed: {}", e)))?
    } else {
        data.to_vec()
    };

    serde_json::from_slice(&json)
        .map_err(|e| FlowError::checkpoint_error(format!("Deserialization failed: {}", e)))
}
