//! SQLite-backed checkpointer (`sqlite` feature).
//!
//! One row per (session, step); superseded steps stay in the table. The
//! checkpoint payload is stored as the JSON form of
//! [`PersistedCheckpoint`](crate::runtimes::persistence::PersistedCheckpoint).

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::runtimes::checkpointer::{Checkpoint, Checkpointer, CheckpointerError};
use crate::runtimes::persistence::PersistedCheckpoint;

const CREATE_TABLE: &str = "\
CREATE TABLE IF NOT EXISTS checkpoints (
    session_id TEXT NOT NULL,
    step       INTEGER NOT NULL,
    payload    TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (session_id, step)
)";

pub struct SqliteCheckpointer {
    pool: SqlitePool,
}

impl SqliteCheckpointer {
    /// Open (creating if needed) the database file and ensure the schema.
    pub async fn connect(db_name: &str) -> Result<Self, CheckpointerError> {
        let options = SqliteConnectOptions::new()
            .filename(db_name)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(backend)?;
        sqlx::query(CREATE_TABLE)
            .execute(&pool)
            .await
            .map_err(backend)?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn backend(e: sqlx::Error) -> CheckpointerError {
    CheckpointerError::Backend {
        message: e.to_string(),
    }
}

#[async_trait]
impl Checkpointer for SqliteCheckpointer {
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), CheckpointerError> {
        let persisted = PersistedCheckpoint::from(&checkpoint);
        let payload = persisted
            .to_json_string()
            .map_err(|e| CheckpointerError::Backend {
                message: e.to_string(),
            })?;
        sqlx::query(
            "INSERT OR REPLACE INTO checkpoints (session_id, step, payload, created_at)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&checkpoint.session_id)
        .bind(checkpoint.step as i64)
        .bind(payload)
        .bind(checkpoint.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn load_latest(
        &self,
        session_id: &str,
    ) -> Result<Option<Checkpoint>, CheckpointerError> {
        let row: Option<String> = sqlx::query_scalar(
            "SELECT payload FROM checkpoints
             WHERE session_id = ?1
             ORDER BY step DESC
             LIMIT 1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match row {
            Some(payload) => {
                let persisted = PersistedCheckpoint::from_json_str(&payload).map_err(|e| {
                    CheckpointerError::Backend {
                        message: e.to_string(),
                    }
                })?;
                Ok(Some(Checkpoint::from(persisted)))
            }
            None => Ok(None),
        }
    }

    async fn list_steps(&self, session_id: &str) -> Result<Vec<u64>, CheckpointerError> {
        let steps: Vec<i64> = sqlx::query_scalar(
            "SELECT step FROM checkpoints WHERE session_id = ?1 ORDER BY step ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        Ok(steps.into_iter().map(|s| s as u64).collect())
    }
}
