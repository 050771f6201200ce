//! Checkpointing for the graph executor
//!
//! Checkpoints capture a run at a step boundary: the state container, the
//! step counter and the node set scheduled for the next step. They allow a
//! run to be resumed after a crash or a human-in-the-loop pause.
//!
//! # Backends
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │               Checkpointer                 │
//! │  ┌──────────┐  ┌──────────┐  ┌──────────┐  │
//! │  │  Memory  │  │   File   │  │  SQLite  │  │
//! │  └──────────┘  └──────────┘  └──────────┘  │
//! │        └────────────┼────────────┘         │
//! │                     ▼                      │
//! │                Checkpoint                  │
//! └────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let config = CheckpointerConfig::File {
//!     path: PathBuf::from("./checkpoints"),
//!     compression: true,
//! };
//! let checkpointer = create_checkpointer(config, &run_id).await?;
//!
//! if let Some(checkpoint) = checkpointer.latest().await? {
//!     // resume from checkpoint
//! }
//! ```

mod file;
#[cfg(feature = "checkpointer-sqlite")]
mod sqlite;

pub use file::FileCheckpointer;
#[cfg(feature = "checkpointer-sqlite")]
pub use sqlite::SqliteCheckpointer;

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::edge::Escalation;
use super::error::{GraphError, RunFailure};
use super::node::{AwaitingInput, NodeName};
use super::state::StateContainer;

/// Current checkpoint format version
pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

/// Snapshot of a run at a step boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub format_version: u32,

    pub run_id: String,

    /// Last completed step
    pub step: usize,

    pub state: StateContainer,

    /// Nodes scheduled for the next step, in declaration order
    pub pending: Vec<NodeName>,

    /// Set when the run is suspended waiting for human input
    #[serde(default)]
    pub awaiting: Option<AwaitingInput>,

    /// Exhausted loop bound recorded before the escalation node ran
    #[serde(default)]
    pub escalation: Option<Escalation>,

    /// Set on the last checkpoint of a failed run. Such a run cannot resume.
    #[serde(default)]
    pub failure: Option<RunFailure>,

    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Checkpoint {
    pub fn new(
        run_id: impl Into<String>,
        step: usize,
        state: StateContainer,
        pending: Vec<NodeName>,
    ) -> Self {
        Self {
            format_version: CHECKPOINT_FORMAT_VERSION,
            run_id: run_id.into(),
            step,
            state,
            pending,
            awaiting: None,
            escalation: None,
            failure: None,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_awaiting(mut self, awaiting: AwaitingInput) -> Self {
        self.awaiting = Some(awaiting);
        self
    }

    pub fn with_escalation(mut self, escalation: Option<Escalation>) -> Self {
        self.escalation = escalation;
        self
    }

    pub fn with_failure(mut self, failure: RunFailure) -> Self {
        self.failure = Some(failure);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_suspended(&self) -> bool {
        self.awaiting.is_some()
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Check format version and ownership before restoring
    pub fn validate(&self, run_id: &str) -> Result<(), GraphError> {
        if self.format_version != CHECKPOINT_FORMAT_VERSION {
            return Err(GraphError::checkpoint_error(format!(
                "unsupported checkpoint format version {} (expected {})",
                self.format_version, CHECKPOINT_FORMAT_VERSION
            )));
        }
        if self.run_id != run_id {
            return Err(GraphError::checkpoint_mismatch(run_id, &self.run_id));
        }
        Ok(())
    }
}

/// Storage for the checkpoints of one run
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Save a checkpoint, replacing any checkpoint for the same step.
    ///
    /// Implementations should ensure atomic writes to prevent corruption.
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), GraphError>;

    /// Load the checkpoint taken after `step`.
    async fn load(&self, step: usize) -> Result<Option<Checkpoint>, GraphError>;

    /// Load the latest checkpoint.
    async fn latest(&self) -> Result<Option<Checkpoint>, GraphError>;

    /// List checkpointed step numbers, sorted ascending.
    async fn list(&self) -> Result<Vec<usize>, GraphError>;

    async fn delete(&self, step: usize) -> Result<(), GraphError>;

    /// Keep only the most recent `keep` checkpoints, returning how many were deleted.
    async fn prune(&self, keep: usize) -> Result<usize, GraphError> {
        let steps = self.list().await?;
        let to_delete = steps.len().saturating_sub(keep);
        let mut deleted = 0;

        for step in steps.into_iter().take(to_delete) {
            self.delete(step).await?;
            deleted += 1;
        }

        Ok(deleted)
    }

    async fn clear(&self) -> Result<(), GraphError> {
        for step in self.list().await? {
            self.delete(step).await?;
        }
        Ok(())
    }
}

/// Configuration for creating checkpointers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CheckpointerConfig {
    /// In-memory checkpointing (not durable)
    #[default]
    Memory,

    /// One directory per run under `path`
    File {
        path: PathBuf,
        /// Compress checkpoint data with zstd
        compression: bool,
    },

    /// SQLite database shared by all runs (requires `checkpointer-sqlite` feature)
    #[cfg(feature = "checkpointer-sqlite")]
    Sqlite {
        /// Database file, or `:memory:`
        path: String,
        compression: bool,
    },
}

/// In-memory checkpointer.
#[derive(Debug, Default)]
pub struct MemoryCheckpointer {
    checkpoints: tokio::sync::RwLock<HashMap<usize, Checkpoint>>,
}

impl MemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for MemoryCheckpointer {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), GraphError> {
        let mut checkpoints = self.checkpoints.write().await;
        checkpoints.insert(checkpoint.step, checkpoint.clone());
        Ok(())
    }

    async fn load(&self, step: usize) -> Result<Option<Checkpoint>, GraphError> {
        let checkpoints = self.checkpoints.read().await;
        Ok(checkpoints.get(&step).cloned())
    }

    async fn latest(&self) -> Result<Option<Checkpoint>, GraphError> {
        let checkpoints = self.checkpoints.read().await;
        Ok(checkpoints
            .keys()
            .max()
            .and_then(|step| checkpoints.get(step))
            .cloned())
    }

    async fn list(&self) -> Result<Vec<usize>, GraphError> {
        let checkpoints = self.checkpoints.read().await;
        let mut steps: Vec<usize> = checkpoints.keys().copied().collect();
        steps.sort();
        Ok(steps)
    }

    async fn delete(&self, step: usize) -> Result<(), GraphError> {
        self.checkpoints.write().await.remove(&step);
        Ok(())
    }
}

/// Create the checkpointer for one run from configuration.
pub async fn create_checkpointer(
    config: CheckpointerConfig,
    run_id: impl Into<String>,
) -> Result<Box<dyn Checkpointer>, GraphError> {
    let run_id = run_id.into();

    match config {
        CheckpointerConfig::Memory => Ok(Box::new(MemoryCheckpointer::new())),

        CheckpointerConfig::File { path, compression } => {
            Ok(Box::new(FileCheckpointer::new(path, run_id, compression)))
        }

        #[cfg(feature = "checkpointer-sqlite")]
        CheckpointerConfig::Sqlite { path, compression } => {
            let checkpointer = SqliteCheckpointer::with_compression(&path, run_id, compression).await?;
            Ok(Box::new(checkpointer))
        }
    }
}

/// Serialize a checkpoint, optionally zstd-compressed
pub(crate) fn encode(checkpoint: &Checkpoint, compression: bool) -> Result<Vec<u8>, GraphError> {
    let json = serde_json::to_vec_pretty(checkpoint)
        .map_err(|e| GraphError::checkpoint_error(format!("Serialization failed: {}", e)))?;

    if !compression {
        return Ok(json);
    }

    let mut encoder = zstd::stream::Encoder::new(Vec::new(), 3)
        .map_err(|e| GraphError::checkpoint_error(format!("Compression init failed: {}", e)))?;
    encoder
        .write_all(&json)
        .map_err(|e| GraphError::checkpoint_error(format!("Compression write failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| GraphError::checkpoint_error(format!("Compression finish failed: {}", e)))
}

/// Inverse of [`encode`]
pub(crate) fn decode(data: &[u8], compression: bool) -> Result<Checkpoint, GraphError> {
    let json = if compression {
        zstd::stream::decode_all(data)
            .map_err(|e| GraphError::checkpoint_error(format!("Decompression failed: {}", e)))?
    } else {
        data.to_vec()
    };

    serde_json::from_slice(&json)
        .map_err(|e| GraphError::checkpoint_error(format!("Deserialization failed: {}", e)))
}
