//! SQLite-based run history store

use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::core::RunStatus;
use crate::persistence::{PersistenceBackend, RunSummary};

/// SQLite run history store
pub struct SqliteRunStore {
    pool: SqlitePool,
}

impl SqliteRunStore {
    /// Open (or create) a store at the given path
    pub async fn new(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path))
            .with_context(|| format!("Invalid database path: {}", db_path))?
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(options)
            .await
            .context("Failed to open run database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Open the store at its default location
    pub async fn with_default_path() -> Result<Self> {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let db_dir = data_dir.join("conveyor");
        std::fs::create_dir_all(&db_dir)?;

        let db_path = db_dir.join("runs.db");
        Self::new(&db_path.to_string_lossy()).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                workflow_name TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                progress REAL NOT NULL DEFAULT 0.0,
                completed_steps INTEGER NOT NULL DEFAULT 0,
                failed_steps INTEGER NOT NULL DEFAULT 0,
                skipped_steps INTEGER NOT NULL DEFAULT 0,
                total_steps INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_workflow_name ON runs(workflow_name);
            CREATE INDEX IF NOT EXISTS idx_started_at ON runs(started_at);
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
}

fn status_from_label(label: &str) -> RunStatus {
    match label {
        "running" => RunStatus::Running,
        "completed" => RunStatus::Completed,
        "failed" => RunStatus::Failed,
        _ => RunStatus::Pending,
    }
}

fn row_to_summary(row: &SqliteRow) -> Result<RunSummary> {
    Ok(RunSummary {
        run_id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        workflow_name: row.get("workflow_name"),
        status: status_from_label(&row.get::<String, _>("status")),
        started_at: SqliteRunStore::from_naive(row.get("started_at")),
        completed_at: row
            .get::<Option<NaiveDateTime>, _>("completed_at")
            .map(SqliteRunStore::from_naive),
        progress: row.get("progress"),
        completed_steps: row.get::<i64, _>("completed_steps") as usize,
        failed_steps: row.get::<i64, _>("failed_steps") as usize,
        skipped_steps: row.get::<i64, _>("skipped_steps") as usize,
        total_steps: row.get::<i64, _>("total_steps") as usize,
    })
}

#[async_trait::async_trait]
impl PersistenceBackend for SqliteRunStore {
    async fn save_run(&self, run: &RunSummary) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO runs
            (id, workflow_name, status, started_at, completed_at, progress,
             completed_steps, failed_steps, skipped_steps, total_steps)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(run.run_id.to_string())
        .bind(&run.workflow_name)
        .bind(run.status.to_string())
        .bind(Self::to_naive(run.started_at))
        .bind(run.completed_at.map(Self::to_naive))
        .bind(run.progress)
        .bind(run.completed_steps as i64)
        .bind(run.failed_steps as i64)
        .bind(run.skipped_steps as i64)
        .bind(run.total_steps as i64)
        .execute(&self.pool)
        .await
        .context("Failed to save run")?;

        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>> {
        let row = sqlx::query("SELECT * FROM runs WHERE id = ?1")
            .bind(run_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load run")?;

        row.as_ref().map(row_to_summary).transpose()
    }

    async fn list_runs(&self, workflow_name: &str) -> Result<Vec<RunSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM runs
            WHERE workflow_name = ?1
            ORDER BY started_at DESC
            "#,
        )
        .bind(workflow_name)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list runs")?;

        rows.iter().map(row_to_summary).collect()
    }

    async fn latest_run(&self, workflow_name: &str) -> Result<Option<RunSummary>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM runs
            WHERE workflow_name = ?1
            ORDER BY started_at DESC
            LIMIT 1
            "#,
        )
        .bind(workflow_name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load latest run")?;

        row.as_ref().map(row_to_summary).transpose()
    }

    async fn list_workflows(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT workflow_name
            FROM runs
            ORDER BY workflow_name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list workflows")?;

        Ok(rows.iter().map(|row| row.get("workflow_name")).collect())
    }
}
