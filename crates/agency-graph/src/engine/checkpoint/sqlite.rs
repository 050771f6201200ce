//! SQLite-based checkpointer
//!
//! All runs share one table; rows are keyed by `(run_id, step)`.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS checkpoints (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     run_id TEXT NOT NULL,
//!     step INTEGER NOT NULL,
//!     data BLOB NOT NULL,
//!     created_at TEXT NOT NULL,
//!     UNIQUE(run_id, step)
//! );
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tokio_rusqlite::Connection;

use super::{decode, encode, Checkpoint, Checkpointer};
use crate::engine::error::GraphError;

/// SQLite-based checkpointer for one run.
#[derive(Debug, Clone)]
pub struct SqliteCheckpointer {
    conn: Arc<Connection>,
    run_id: String,
    compression: bool,
}

impl SqliteCheckpointer {
    /// Open (or create) the database at `path`; `:memory:` for an in-memory database.
    pub async fn new(path: impl AsRef<str>, run_id: impl Into<String>) -> Result<Self, GraphError> {
        Self::with_compression(path, run_id, false).await
    }

    pub async fn with_compression(
        path: impl AsRef<str>,
        run_id: impl Into<String>,
        compression: bool,
    ) -> Result<Self, GraphError> {
        let conn = Connection::open(path.as_ref())
            .await
            .map_err(|e| GraphError::checkpoint_error(format!("Failed to open SQLite: {}", e)))?;

        conn.call(|conn| {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS checkpoints (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    run_id TEXT NOT NULL,
                    step INTEGER NOT NULL,
                    data BLOB NOT NULL,
                    created_at TEXT NOT NULL,
                    UNIQUE(run_id, step)
                );
                CREATE INDEX IF NOT EXISTS idx_run_step ON checkpoints(run_id, step);
                "#,
            )?;
            Ok(())
        })
        .await
        .map_err(|e| GraphError::checkpoint_error(format!("Failed to create schema: {}", e)))?;

        Ok(Self {
            conn: Arc::new(conn),
            run_id: run_id.into(),
            compression,
        })
    }

    /// Checkpointer for another run on the same connection
    pub fn for_run(&self, run_id: impl Into<String>) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            run_id: run_id.into(),
            compression: self.compression,
        }
    }
}

#[async_trait]
impl Checkpointer for SqliteCheckpointer {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), GraphError> {
        let data = encode(checkpoint, self.compression)?;
        let run_id = self.run_id.clone();
        let step = checkpoint.step as i64;
        let created_at = checkpoint.timestamp.to_rfc3339();

        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT OR REPLACE INTO checkpoints (run_id, step, data, created_at)
                    VALUES (?1, ?2, ?3, ?4)
                    "#,
                    rusqlite::params![run_id, step, data, created_at],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| GraphError::checkpoint_error(format!("Failed to save checkpoint: {}", e)))
    }

    async fn load(&self, step: usize) -> Result<Option<Checkpoint>, GraphError> {
        let run_id = self.run_id.clone();

        let data = self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT data FROM checkpoints WHERE run_id = ?1 AND step = ?2")?;
                let mut rows = stmt.query(rusqlite::params![run_id, step as i64])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row.get::<_, Vec<u8>>(0)?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(|e| GraphError::checkpoint_error(format!("Failed to load checkpoint: {}", e)))?;

        data.map(|bytes| decode(&bytes, self.compression)).transpose()
    }

    async fn latest(&self) -> Result<Option<Checkpoint>, GraphError> {
        let run_id = self.run_id.clone();

        let max_step = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare("SELECT MAX(step) FROM checkpoints WHERE run_id = ?1")?;
                let mut rows = stmt.query(rusqlite::params![run_id])?;
                match rows.next()? {
                    Some(row) => Ok(row.get::<_, Option<i64>>(0)?.map(|s| s as usize)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(|e| GraphError::checkpoint_error(format!("Failed to get latest checkpoint: {}", e)))?;

        match max_step {
            Some(step) => self.load(step).await,
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<usize>, GraphError> {
        let run_id = self.run_id.clone();

        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare("SELECT step FROM checkpoints WHERE run_id = ?1 ORDER BY step ASC")?;
                let rows = stmt.query_map(rusqlite::params![run_id], |row| {
                    Ok(row.get::<_, i64>(0)? as usize)
                })?;
                let mut steps = Vec::new();
                for row in rows {
                    steps.push(row?);
                }
                Ok(steps)
            })
            .await
            .map_err(|e| GraphError::checkpoint_error(format!("Failed to list checkpoints: {}", e)))
    }

    async fn delete(&self, step: usize) -> Result<(), GraphError> {
        let run_id = self.run_id.clone();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM checkpoints WHERE run_id = ?1 AND step = ?2",
                    rusqlite::params![run_id, step as i64],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| GraphError::checkpoint_error(format!("Failed to delete checkpoint: {}", e)))
    }
}
