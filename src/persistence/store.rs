//! SQLite-based run history

use crate::persistence::{ExecutionStatus, RunHistoryStore, RunSummary};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

const COLUMNS: &str = "id, pipeline_name, entity_type, processing_type, processing_date, status, \
                       started_at, completed_at, total_steps, succeeded, failed, skipped, failed_step";

/// SQLite run store
pub struct SqliteRunStore {
    pool: SqlitePool,
}

impl SqliteRunStore {
    /// Open (or create) the database at `db_path`
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.as_ref().display()))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Default database location under the user's data directory
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("accrual-pipeline")
            .join("runs.db")
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        let db_path = Self::default_path();
        if let Some(dir) = db_path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        Self::new(&db_path).await
    }

    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                pipeline_name TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                processing_type TEXT NOT NULL,
                processing_date INTEGER,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT NOT NULL,
                total_steps INTEGER NOT NULL DEFAULT 0,
                succeeded INTEGER NOT NULL DEFAULT 0,
                failed INTEGER NOT NULL DEFAULT 0,
                skipped INTEGER NOT NULL DEFAULT 0,
                failed_step TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_runs_entity ON runs(entity_type);
            CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs(started_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn from_row(row: &SqliteRow) -> Result<RunSummary> {
        let status: String = row.get("status");
        Ok(RunSummary {
            execution_id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            pipeline_name: row.get("pipeline_name"),
            entity_type: row.get("entity_type"),
            processing_type: row.get("processing_type"),
            processing_date: row.get::<Option<i64>, _>("processing_date").map(|d| d as u32),
            status: ExecutionStatus::from_str(&status).map_err(|e| anyhow!(e))?,
            started_at: Self::from_naive(row.get("started_at")),
            completed_at: Self::from_naive(row.get("completed_at")),
            total_steps: row.get::<i64, _>("total_steps") as usize,
            succeeded: row.get::<i64, _>("succeeded") as usize,
            failed: row.get::<i64, _>("failed") as usize,
            skipped: row.get::<i64, _>("skipped") as usize,
            failed_step: row.get("failed_step"),
        })
    }
}

#[async_trait::async_trait]
impl RunHistoryStore for SqliteRunStore {
    async fn save_run(&self, run: &RunSummary) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO runs
            (id, pipeline_name, entity_type, processing_type, processing_date, status,
             started_at, completed_at, total_steps, succeeded, failed, skipped, failed_step)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(run.execution_id.to_string())
        .bind(&run.pipeline_name)
        .bind(&run.entity_type)
        .bind(&run.processing_type)
        .bind(run.processing_date.map(i64::from))
        .bind(run.status.as_str())
        .bind(Self::to_naive(run.started_at))
        .bind(Self::to_naive(run.completed_at))
        .bind(run.total_steps as i64)
        .bind(run.succeeded as i64)
        .bind(run.failed as i64)
        .bind(run.skipped as i64)
        .bind(&run.failed_step)
        .execute(&self.pool)
        .await
        .context("Failed to save run")?;

        Ok(())
    }

    async fn load_run(&self, execution_id: Uuid) -> Result<Option<RunSummary>> {
        let sql = format!("SELECT {} FROM runs WHERE id = ?1", COLUMNS);
        let row = sqlx::query(&sql)
            .bind(execution_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load run")?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn list_runs(&self, entity_type: Option<&str>) -> Result<Vec<RunSummary>> {
        let rows = match entity_type {
            Some(entity) => {
                let sql = format!(
                    "SELECT {} FROM runs WHERE entity_type = ?1 COLLATE NOCASE ORDER BY started_at DESC",
                    COLUMNS
                );
                sqlx::query(&sql).bind(entity).fetch_all(&self.pool).await
            }
            None => {
                let sql = format!("SELECT {} FROM runs ORDER BY started_at DESC", COLUMNS);
                sqlx::query(&sql).fetch_all(&self.pool).await
            }
        }
        .context("Failed to list runs")?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn list_entities(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT entity_type FROM runs ORDER BY entity_type ASC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list entities")?;

        Ok(rows.iter().map(|row| row.get("entity_type")).collect())
    }
}
