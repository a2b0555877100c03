/*!
SQLite checkpointer.

Durable implementation of the [`Checkpointer`] trait: one row per
`(run, seq)` holding the JSON-serialized [`PersistedCheckpoint`]. The schema
is created idempotently on connect, so a fresh database file needs no
external migration step.

Writes use `INSERT OR REPLACE` on the `(run_id, seq)` primary key inside a
single statement, which gives the atomic-save semantics the checkpoint
contract requires: a row is either fully written or absent.
*/

use std::str::FromStr;

use async_trait::async_trait;
use miette::Diagnostic;
use sqlx::{
    Row, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
};
use thiserror::Error;
use tracing::instrument;

use crate::runtime::checkpointer::{Checkpoint, Checkpointer, CheckpointerError, Result};
use crate::runtime::persistence::{PersistedCheckpoint, PersistenceError};
use crate::utils::json_ext::JsonSerializable;

#[derive(Debug, Error, Diagnostic)]
pub enum SqliteCheckpointerError {
    #[error("sqlx error: {0}")]
    #[diagnostic(
        code(reviewops::sqlite::sqlx),
        help("Ensure the SQLite database URL is valid and the file is writable.")
    )]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    #[diagnostic(code(reviewops::sqlite::persistence))]
    Persistence(#[from] PersistenceError),
}

impl From<SqliteCheckpointerError> for CheckpointerError {
    fn from(err: SqliteCheckpointerError) -> Self {
        match err {
            SqliteCheckpointerError::Persistence(source) => {
                CheckpointerError::Persistence(source)
            }
            other => CheckpointerError::Backend(other.to_string()),
        }
    }
}

/// SQLite-backed checkpoint store.
pub struct SqliteCheckpointer {
    pool: SqlitePool,
}

impl SqliteCheckpointer {
    /// Connect to `url` (e.g. `sqlite://reviewops.db`), creating the file
    /// and schema when absent.
    pub async fn connect(url: &str) -> std::result::Result<Self, SqliteCheckpointerError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(SqliteCheckpointerError::Sqlx)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                run_id     TEXT    NOT NULL,
                seq        INTEGER NOT NULL,
                stage      TEXT    NOT NULL,
                payload    TEXT    NOT NULL,
                created_at TEXT    NOT NULL,
                PRIMARY KEY (run_id, seq)
            )",
        )
        .execute(&pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_checkpoints_run ON checkpoints(run_id)")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }

    fn decode_row(row: &SqliteRow) -> std::result::Result<Checkpoint, SqliteCheckpointerError> {
        let payload: String = row.try_get("payload")?;
        let persisted = PersistedCheckpoint::from_json_str(&payload)?;
        Ok(Checkpoint::try_from(persisted)?)
    }
}

#[async_trait]
impl Checkpointer for SqliteCheckpointer {
    #[instrument(skip(self, checkpoint), fields(run_id = %checkpoint.run_id, seq = checkpoint.seq), err)]
    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        let persisted = PersistedCheckpoint::from(&checkpoint);
        let payload = persisted
            .to_json_string()
            .map_err(SqliteCheckpointerError::from)
            .map_err(CheckpointerError::from)?;

        sqlx::query(
            "INSERT OR REPLACE INTO checkpoints (run_id, seq, stage, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&checkpoint.run_id)
        .bind(checkpoint.seq as i64)
        .bind(checkpoint.stage.encode())
        .bind(&payload)
        .bind(checkpoint.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(SqliteCheckpointerError::from)
        .map_err(CheckpointerError::from)?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn load_latest(&self, run_id: &str) -> Result<Option<Checkpoint>> {
        let row = sqlx::query(
            "SELECT payload FROM checkpoints WHERE run_id = ?1 ORDER BY seq DESC LIMIT 1",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(SqliteCheckpointerError::from)
        .map_err(CheckpointerError::from)?;

        row.map(|row| Self::decode_row(&row).map_err(CheckpointerError::from))
            .transpose()
    }

    #[instrument(skip(self), err)]
    async fn load_at(&self, run_id: &str, seq: u64) -> Result<Option<Checkpoint>> {
        let row = sqlx::query("SELECT payload FROM checkpoints WHERE run_id = ?1 AND seq = ?2")
            .bind(run_id)
            .bind(seq as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(SqliteCheckpointerError::from)
            .map_err(CheckpointerError::from)?;

        row.map(|row| Self::decode_row(&row).map_err(CheckpointerError::from))
            .transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_runs(&self) -> Result<Vec<String>> {
        let rows =
            sqlx::query("SELECT DISTINCT run_id FROM checkpoints ORDER BY run_id")
                .fetch_all(&self.pool)
                .await
                .map_err(SqliteCheckpointerError::from)
                .map_err(CheckpointerError::from)?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("run_id")
                    .map_err(SqliteCheckpointerError::from)
                    .map_err(CheckpointerError::from)
            })
            .collect()
    }
}
