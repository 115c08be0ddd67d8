//! SQLite-based checkpointer
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS flow_checkpoints (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     run_id TEXT NOT NULL,
//!     step INTEGER NOT NULL,
//!     next_label TEXT NOT NULL,
//!     data BLOB NOT NULL,
//!     created_at TEXT NOT NULL,
//!     UNIQUE(run_id, step)
//! );
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use tokio_rusqlite::Connection;

use super::{decode, encode, is_compressed, Checkpoint, Checkpointer};
use crate::error::FlowError;

/// Checkpointer backed by a SQLite database shared by many runs.
#[derive(Debug)]
pub struct SqliteCheckpointer {
    conn: Arc<Connection>,
    run_id: String,
    compression: bool,
}

impl SqliteCheckpointer {
    /// Open (or create) the database at `path`; `:memory:` for tests.
    pub async fn new(path: impl AsRef<str>, run_id: impl Into<String>) -> Result<Self, FlowError> {
        Self::with_compression(path, run_id, false).await
    }

    pub async fn with_compression(
        path: impl AsRef<str>,
        run_id: impl Into<String>,
        compression: bool,
    ) -> Result<Self, FlowError> {
        let conn = Connection::open(path.as_ref())
            .await
            .map_err(|e| FlowError::checkpoint_error(format!("Failed to open SQLite: {}", e)))?;

        conn.call(|conn| {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS flow_checkpoints (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    run_id TEXT NOT NULL,
                    step INTEGER NOT NULL,
                    next_label TEXT NOT NULL,
                    data BLOB NOT NULL,
                    created_at TEXT NOT NULL,
                    UNIQUE(run_id, step)
                );
                CREATE INDEX IF NOT EXISTS idx_run_step
                    ON flow_checkpoints(run_id, step);
                "#,
            )?;
            Ok(())
        })
        .await
        .map_err(|e| FlowError::checkpoint_error(format!("Failed to create schema: {}", e)))?;

        Ok(Self {
            conn: Arc::new(conn),
            run_id: run_id.into(),
            compression,
        })
    }
}

#[async_trait]
impl Checkpointer for SqliteCheckpointer {
    fn run_id(&self) -> &str {
        &self.run_id
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), FlowError> {
        let data = encode(checkpoint, self.compression)?;
        let run_id = self.run_id.clone();
        let step = checkpoint.step as i64;
        let next_label = checkpoint.next.as_str();
        let created_at = checkpoint.timestamp.to_rfc3339();

        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT OR REPLACE INTO flow_checkpoints (run_id, step, next_label, data, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    "#,
                    rusqlite::params![run_id, step, next_label, data, created_at],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| FlowError::checkpoint_error(format!("Failed to save checkpoint: {}", e)))
    }

    async fn load(&self, step: usize) -> Result<Option<Checkpoint>, FlowError> {
        let run_id = self.run_id.clone();

        let data = self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT data FROM flow_checkpoints WHERE run_id = ?1 AND step = ?2")?;
                let mut rows = stmt.query(rusqlite::params![run_id, step as i64])?;

                match rows.next()? {
                    Some(row) => Ok(Some(row.get::<_, Vec<u8>>(0)?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(|e| FlowError::checkpoint_error(format!("Failed to load checkpoint: {}", e)))?;

        // Rows written under the other compression setting stay readable
        data.map(|bytes| decode(&bytes, is_compressed(&bytes)))
            .transpose()
    }

    async fn latest(&self) -> Result<Option<Checkpoint>, FlowError> {
        let run_id = self.run_id.clone();

        let max_step = self
            .conn
            .call(move |conn| {
                let step: Option<i64> = conn.query_row(
                    "SELECT MAX(step) FROM flow_checkpoints WHERE run_id = ?1",
                    rusqlite::params![run_id],
                    |row| row.get(0),
                )?;
                Ok(step.map(|s| s as usize))
            })
            .await
            .map_err(|e| {
                FlowError::checkpoint_error(format!("Failed to get latest checkpoint: {}", e))
            })?;

        match max_step {
            Some(step) => self.load(step).await,
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<usize>, FlowError> {
        let run_id = self.run_id.clone();

        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare("SELECT step FROM flow_checkpoints WHERE run_id = ?1 ORDER BY step ASC")?;
                let rows = stmt.query_map(rusqlite::params![run_id], |row| {
                    let step: i64 = row.get(0)?;
                    Ok(step as usize)
                })?;

                let mut steps = Vec::new();
                for row in rows {
                    steps.push(row?);
                }
                Ok(steps)
            })
            .await
            .map_err(|e| FlowError::checkpoint_error(format!("Failed to list checkpoints: {}", e)))
    }

    async fn delete(&self, step: usize) -> Result<(), FlowError> {
        let run_id = self.run_id.clone();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM flow_checkpoints WHERE run_id = ?1 AND step = ?2",
                    rusqlite::params![run_id, step as i64],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| FlowError::checkpoint_error(format!("Failed to delete checkpoint: {}", e)))
    }
}
