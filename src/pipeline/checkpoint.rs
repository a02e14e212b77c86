// Checkpointing - Persist and resume pipeline progress
use crate::pipeline::error::PipelineError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;

/// Status of a single pipeline task for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "pending" => TaskStatus::Pending,
            "running" => TaskStatus::Running,
            "completed" => TaskStatus::Completed,
            "failed" => TaskStatus::Failed,
            "cancelled" => TaskStatus::Cancelled,
            _ => TaskStatus::Pending, // Default fallback
        }
    }
}

/// Persisted record of one (job, task) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCheckpoint {
    pub job_id: String,
    pub task_name: String,
    pub status: TaskStatus,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Durable task-level progress for pipeline jobs.
///
/// `exists` answers "is this task already completed"; `complete` records a
/// completion exactly once (later calls for the same pair are no-ops so the
/// output downstream tasks consumed never changes). Any error from this store
/// is treated as fatal by the executor.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn exists(&self, job_id: &str, task_name: &str) -> Result<bool, PipelineError>;

    async fn complete(
        &self,
        job_id: &str,
        task_name: &str,
        output: &serde_json::Value,
    ) -> Result<(), PipelineError>;

    async fn get_output(
        &self,
        job_id: &str,
        task_name: &str,
    ) -> Result<Option<serde_json::Value>, PipelineError>;

    async fn mark_running(&self, job_id: &str, task_name: &str) -> Result<(), PipelineError>;

    async fn mark_failed(
        &self,
        job_id: &str,
        task_name: &str,
        error: &str,
    ) -> Result<(), PipelineError>;

    async fn mark_cancelled(&self, job_id: &str, task_name: &str) -> Result<(), PipelineError>;

    async fn list_for_job(&self, job_id: &str) -> Result<Vec<TaskCheckpoint>, PipelineError>;

    /// Remove failed and cancelled records so those tasks run again.
    /// Completed records are untouched.
    async fn reset_failed(&self, job_id: &str) -> Result<u64, PipelineError>;
}

/// Postgres-backed checkpoint store over the pipeline_tasks table.
pub struct PgCheckpoints {
    pool: PgPool,
}

impl PgCheckpoints {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CheckpointStore for PgCheckpoints {
    async fn exists(&self, job_id: &str, task_name: &str) -> Result<bool, PipelineError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM pipeline_tasks
                WHERE job_id = $1 AND task_name = $2 AND status = 'completed'
            )
            "#,
        )
        .bind(job_id)
        .bind(task_name)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn complete(
        &self,
        job_id: &str,
        task_name: &str,
        output: &serde_json::Value,
    ) -> Result<(), PipelineError> {
        // First completion wins: a completed row is never overwritten, so the
        // output already consumed by downstream tasks stays stable.
        sqlx::query(
            r#"
            INSERT INTO pipeline_tasks
            (job_id, task_name, status, output, error, started_at, completed_at, updated_at)
            VALUES ($1, $2, 'completed', $3, NULL, NOW(), NOW(), NOW())
            ON CONFLICT (job_id, task_name) DO UPDATE
            SET status = 'completed',
                output = EXCLUDED.output,
                error = NULL,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE pipeline_tasks.status <> 'completed'
            "#,
        )
        .bind(job_id)
        .bind(task_name)
        .bind(output)
        .execute(&self.pool)
        .await?;

        info!("💾 Checkpoint saved: {} / {}", job_id, task_name);
        Ok(())
    }

    async fn get_output(
        &self,
        job_id: &str,
        task_name: &str,
    ) -> Result<Option<serde_json::Value>, PipelineError> {
        let output: Option<Option<serde_json::Value>> = sqlx::query_scalar(
            r#"
            SELECT output FROM pipeline_tasks
            WHERE job_id = $1 AND task_name = $2 AND status = 'completed'
            "#,
        )
        .bind(job_id)
        .bind(task_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(output.flatten())
    }

    async fn mark_running(&self, job_id: &str, task_name: &str) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            INSERT INTO pipeline_tasks (job_id, task_name, status, started_at, updated_at)
            VALUES ($1, $2, 'running', NOW(), NOW())
            ON CONFLICT (job_id, task_name) DO UPDATE
            SET status = 'running', error = NULL, started_at = NOW(), updated_at = NOW()
            WHERE pipeline_tasks.status <> 'completed'
            "#,
        )
        .bind(job_id)
        .bind(task_name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_failed(
        &self,
        job_id: &str,
        task_name: &str,
        error: &str,
    ) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            INSERT INTO pipeline_tasks (job_id, task_name, status, error, updated_at)
            VALUES ($1, $2, 'failed', $3, NOW())
            ON CONFLICT (job_id, task_name) DO UPDATE
            SET status = 'failed', error = EXCLUDED.error, updated_at = NOW()
            WHERE pipeline_tasks.status <> 'completed'
            "#,
        )
        .bind(job_id)
        .bind(task_name)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_cancelled(&self, job_id: &str, task_name: &str) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            INSERT INTO pipeline_tasks (job_id, task_name, status, updated_at)
            VALUES ($1, $2, 'cancelled', NOW())
            ON CONFLICT (job_id, task_name) DO UPDATE
            SET status = 'cancelled', updated_at = NOW()
            WHERE pipeline_tasks.status <> 'completed'
            "#,
        )
        .bind(job_id)
        .bind(task_name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_job(&self, job_id: &str) -> Result<Vec<TaskCheckpoint>, PipelineError> {
        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT job_id, task_name, status, output, error, started_at, completed_at, updated_at
            FROM pipeline_tasks
            WHERE job_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(TaskCheckpoint::from).collect())
    }

    async fn reset_failed(&self, job_id: &str) -> Result<u64, PipelineError> {
        let result = sqlx::query(
            "DELETE FROM pipeline_tasks WHERE job_id = $1 AND status IN ('failed', 'cancelled')",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        info!(
            "🧹 Reset {} task records for job {}",
            result.rows_affected(),
            job_id
        );
        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    job_id: String,
    task_name: String,
    status: String,
    output: Option<serde_json::Value>,
    error: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl From<TaskRow> for TaskCheckpoint {
    fn from(row: TaskRow) -> Self {
        TaskCheckpoint {
            job_id: row.job_id,
            task_name: row.task_name,
            status: TaskStatus::from_str(&row.status),
            output: row.output,
            error: row.error,
            started_at: row.started_at,
            completed_at: row.completed_at,
            updated_at: row.updated_at,
        }
    }
}
