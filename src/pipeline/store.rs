// src/pipeline/store.rs
// Persistence for jobs, clip sub-jobs, and ranked asset pairs.

use crate::models::{ClipJob, ClipJobStatus, ClipModel, ImagePair, JobStatus, VideoJob};
use crate::pipeline::error::PipelineError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::info;

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get_job(&self, job_id: &str) -> Result<Option<VideoJob>, PipelineError>;

    /// Insert a job record. A no-op when the id already exists, so starting
    /// an existing job is safe.
    async fn insert_job(&self, job: &VideoJob) -> Result<(), PipelineError>;

    /// Update job status. Never demotes a completed job.
    async fn set_job_status(&self, job_id: &str, status: JobStatus) -> Result<(), PipelineError>;

    async fn fail_job(&self, job_id: &str, error: &str) -> Result<(), PipelineError>;

    async fn complete_job(
        &self,
        job_id: &str,
        output_location: &str,
        total_cost: Decimal,
        failed_clip_count: i32,
    ) -> Result<(), PipelineError>;

    /// Move a failed or cancelled job back to created so it can run again.
    /// Returns false when the job was not in a retryable state.
    async fn reset_job_for_retry(&self, job_id: &str) -> Result<bool, PipelineError>;

    /// Persist clip sub-jobs, skipping (job, sequence) pairs that already
    /// exist. Returns the number of rows actually inserted.
    async fn insert_clip_jobs(&self, clips: &[ClipJob]) -> Result<u64, PipelineError>;

    async fn list_clip_jobs(&self, job_id: &str) -> Result<Vec<ClipJob>, PipelineError>;

    async fn mark_clip_submitted(
        &self,
        clip_id: &str,
        provider_task_id: &str,
        attempt_count: i32,
    ) -> Result<(), PipelineError>;

    async fn mark_clip_polling(&self, clip_id: &str) -> Result<(), PipelineError>;

    async fn complete_clip(
        &self,
        clip_id: &str,
        clip_location: &str,
        cost: Decimal,
    ) -> Result<(), PipelineError>;

    async fn fail_clip(&self, clip_id: &str, error: &str) -> Result<(), PipelineError>;

    async fn cancel_clip(&self, clip_id: &str) -> Result<(), PipelineError>;

    /// Reset failed and cancelled clips to pending for a retry run.
    async fn reset_failed_clips(&self, job_id: &str) -> Result<u64, PipelineError>;

    /// Ranked asset pairs for a campaign in curation order.
    async fn list_pairs(&self, campaign_id: &str) -> Result<Vec<ImagePair>, PipelineError>;
}

pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn get_job(&self, job_id: &str) -> Result<Option<VideoJob>, PipelineError> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, campaign_id, status, output_location, total_cost,
                   failed_clip_count, error, created_at, updated_at
            FROM video_jobs
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(VideoJob::from))
    }

    async fn insert_job(&self, job: &VideoJob) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            INSERT INTO video_jobs
            (id, campaign_id, status, output_location, total_cost, failed_clip_count, error)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&job.id)
        .bind(&job.campaign_id)
        .bind(job.status.as_str())
        .bind(&job.output_location)
        .bind(job.total_cost)
        .bind(job.failed_clip_count)
        .bind(&job.error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_job_status(&self, job_id: &str, status: JobStatus) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            UPDATE video_jobs
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status <> 'completed'
            "#,
        )
        .bind(job_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fail_job(&self, job_id: &str, error: &str) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            UPDATE video_jobs
            SET status = 'failed', error = $2, updated_at = NOW()
            WHERE id = $1 AND status <> 'completed'
            "#,
        )
        .bind(job_id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn complete_job(
        &self,
        job_id: &str,
        output_location: &str,
        total_cost: Decimal,
        failed_clip_count: i32,
    ) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            UPDATE video_jobs
            SET status = 'completed', output_location = $2, total_cost = $3,
                failed_clip_count = $4, error = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(output_location)
        .bind(total_cost)
        .bind(failed_clip_count)
        .execute(&self.pool)
        .await?;

        info!("✅ Job {} completed: {}", job_id, output_location);
        Ok(())
    }

    async fn reset_job_for_retry(&self, job_id: &str) -> Result<bool, PipelineError> {
        let result = sqlx::query(
            r#"
            UPDATE video_jobs
            SET status = 'created', error = NULL, updated_at = NOW()
            WHERE id = $1 AND status IN ('failed', 'cancelled')
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_clip_jobs(&self, clips: &[ClipJob]) -> Result<u64, PipelineError> {
        let mut inserted = 0u64;
        for clip in clips {
            let result = sqlx::query(
                r#"
                INSERT INTO clip_jobs
                (id, job_id, sequence_number, first_asset_id, second_asset_id, model,
                 duration_seconds, scene_prompt, status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (job_id, sequence_number) DO NOTHING
                "#,
            )
            .bind(&clip.id)
            .bind(&clip.job_id)
            .bind(clip.sequence_number)
            .bind(&clip.first_asset_id)
            .bind(&clip.second_asset_id)
            .bind(clip.model.as_str())
            .bind(clip.duration_seconds)
            .bind(&clip.scene_prompt)
            .bind(clip.status.as_str())
            .execute(&self.pool)
            .await?;

            inserted += result.rows_affected();
        }

        Ok(inserted)
    }

    async fn list_clip_jobs(&self, job_id: &str) -> Result<Vec<ClipJob>, PipelineError> {
        let rows = sqlx::query_as::<_, ClipJobRow>(
            r#"
            SELECT id, job_id, sequence_number, first_asset_id, second_asset_id, model,
                   duration_seconds, scene_prompt, status, clip_location, provider_task_id,
                   cost, attempt_count, error, created_at, updated_at
            FROM clip_jobs
            WHERE job_id = $1
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ClipJob::try_from).collect()
    }

    async fn mark_clip_submitted(
        &self,
        clip_id: &str,
        provider_task_id: &str,
        attempt_count: i32,
    ) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            UPDATE clip_jobs
            SET status = 'submitted', provider_task_id = $2, attempt_count = $3,
                error = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(clip_id)
        .bind(provider_task_id)
        .bind(attempt_count)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_clip_polling(&self, clip_id: &str) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            UPDATE clip_jobs
            SET status = 'polling', updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(clip_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn complete_clip(
        &self,
        clip_id: &str,
        clip_location: &str,
        cost: Decimal,
    ) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            UPDATE clip_jobs
            SET status = 'succeeded', clip_location = $2, cost = $3,
                error = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(clip_id)
        .bind(clip_location)
        .bind(cost)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fail_clip(&self, clip_id: &str, error: &str) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            UPDATE clip_jobs
            SET status = 'failed', error = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(clip_id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn cancel_clip(&self, clip_id: &str) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            UPDATE clip_jobs
            SET status = 'cancelled', updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(clip_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn reset_failed_clips(&self, job_id: &str) -> Result<u64, PipelineError> {
        let result = sqlx::query(
            r#"
            UPDATE clip_jobs
            SET status = 'pending', error = NULL, provider_task_id = NULL,
                attempt_count = 0, updated_at = NOW()
            WHERE job_id = $1 AND status IN ('failed', 'cancelled')
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn list_pairs(&self, campaign_id: &str) -> Result<Vec<ImagePair>, PipelineError> {
        let pairs = sqlx::query_as::<_, ImagePair>(
            r#"
            SELECT id, campaign_id, position, first_asset_id, second_asset_id, score, rationale
            FROM asset_pairs
            WHERE campaign_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(pairs)
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    campaign_id: String,
    status: String,
    output_location: Option<String>,
    total_cost: Option<Decimal>,
    failed_clip_count: i32,
    error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<JobRow> for VideoJob {
    fn from(row: JobRow) -> Self {
        VideoJob {
            id: row.id,
            campaign_id: row.campaign_id,
            status: JobStatus::from_str(&row.status),
            output_location: row.output_location,
            total_cost: row.total_cost,
            failed_clip_count: row.failed_clip_count,
            error: row.error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ClipJobRow {
    id: String,
    job_id: String,
    sequence_number: i32,
    first_asset_id: String,
    second_asset_id: String,
    model: String,
    duration_seconds: f64,
    scene_prompt: Option<String>,
    status: String,
    clip_location: Option<String>,
    provider_task_id: Option<String>,
    cost: Option<Decimal>,
    attempt_count: i32,
    error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ClipJobRow> for ClipJob {
    type Error = PipelineError;

    fn try_from(row: ClipJobRow) -> Result<Self, Self::Error> {
        let model = ClipModel::parse(&row.model)
            .map_err(|e| PipelineError::Storage(format!("Bad clip_jobs row {}: {}", row.id, e)))?;

        Ok(ClipJob {
            id: row.id,
            job_id: row.job_id,
            sequence_number: row.sequence_number,
            first_asset_id: row.first_asset_id,
            second_asset_id: row.second_asset_id,
            model,
            duration_seconds: row.duration_seconds,
            scene_prompt: row.scene_prompt,
            status: ClipJobStatus::from_str(&row.status),
            clip_location: row.clip_location,
            provider_task_id: row.provider_task_id,
            cost: row.cost,
            attempt_count: row.attempt_count,
            error: row.error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
