// Pipeline service - the start/status/cancel/retry surface over the executor
use crate::models::{ClipJobStatus, ClipModel, JobStatus, VideoJob};
use crate::pipeline::checkpoint::TaskStatus;
use crate::pipeline::error::PipelineError;
use crate::pipeline::executor::PipelineExecutor;
use crate::pipeline::graph;
use crate::pipeline::state::{JobContext, JobOptions, PipelineResources};
use crate::services::pricing;
use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub const DEFAULT_MODEL: &str = "kling-v1-6";

/// Owns the running jobs: each start spawns a detached executor run, and the
/// registry keeps one cancellation token per live job.
pub struct PipelineService {
    resources: PipelineResources,
    pool: Option<PgPool>,
    work_root: String,
    output_dir: String,
    active: Arc<RwLock<HashMap<String, CancellationToken>>>,
}

/// Per-task progress line in a status report.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub name: String,
    pub status: TaskStatus,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ClipSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub in_flight: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatusReport {
    pub job: VideoJob,
    pub running: bool,
    pub progress_percent: u8,
    pub tasks: Vec<TaskReport>,
    pub clips: ClipSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelOutcome {
    pub cancelled_task_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetryOutcome {
    pub job: VideoJob,
    pub reset_task_count: u64,
    pub reset_clip_count: u64,
}

impl PipelineService {
    pub fn new(
        resources: PipelineResources,
        pool: Option<PgPool>,
        work_root: String,
        output_dir: String,
    ) -> Self {
        Self {
            resources,
            pool,
            work_root,
            output_dir,
            active: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn is_running(&self, job_id: &str) -> bool {
        self.active.read().await.contains_key(job_id)
    }

    /// Start a job, or resume one that never reached a terminal state.
    ///
    /// New jobs need a campaign id; resumed ones use the stored one. Jobs
    /// that already finished are rejected: completed work is never redone,
    /// and failed or cancelled jobs go through `retry` instead. Two
    /// concurrent starts of the same id cannot both launch: the slot in the
    /// running-jobs registry is claimed before the store is consulted, and
    /// the loser is rejected as already running.
    pub async fn start(
        self: &Arc<Self>,
        job_id: &str,
        campaign_id: Option<String>,
        options: JobOptions,
    ) -> Result<VideoJob, PipelineError> {
        let model = ClipModel::parse(options.model.as_deref().unwrap_or(DEFAULT_MODEL))
            .map_err(PipelineError::InvalidRequest)?;
        validate_options(&options)?;

        // Claim the slot in one critical section. Everything after this
        // point has to give it back before bailing out.
        let cancel = CancellationToken::new();
        {
            let mut active = self.active.write().await;
            if active.contains_key(job_id) {
                return Err(PipelineError::NotStartable {
                    job_id: job_id.to_string(),
                    reason: "it is already running".to_string(),
                });
            }
            active.insert(job_id.to_string(), cancel.clone());
        }

        let job = match self.resolve_startable_job(job_id, campaign_id).await {
            Ok(job) => job,
            Err(e) => {
                self.active.write().await.remove(job_id);
                return Err(e);
            }
        };

        let rates = match &self.pool {
            Some(pool) => match pricing::fetch_model_rates(pool).await {
                Ok(rates) => rates,
                Err(e) => {
                    warn!("Could not load model rates, using defaults: {}", e);
                    pricing::default_rates()
                }
            },
            None => pricing::default_rates(),
        };

        let ctx = JobContext::new(
            job_id,
            &job.campaign_id,
            model,
            &options,
            rates,
            &self.work_root,
            &self.output_dir,
            cancel,
        );

        let service = self.clone();
        let spawned_job_id = job_id.to_string();
        tokio::spawn(async move {
            let executor = PipelineExecutor::new(service.resources.clone());
            match executor.run(&ctx).await {
                Ok(status) => {
                    info!("🏁 Job {} finished as {}", spawned_job_id, status.as_str());
                }
                Err(e) => {
                    error!("💥 Job {} aborted: {}", spawned_job_id, e);
                    let reason = e.to_string();
                    if let Err(e) = service
                        .resources
                        .store
                        .fail_job(&spawned_job_id, &reason)
                        .await
                    {
                        error!("Could not record failure for job {}: {}", spawned_job_id, e);
                    }
                }
            }
            service.active.write().await.remove(&spawned_job_id);
        });

        info!("🚀 Started pipeline for job {}", job_id);
        Ok(job)
    }

    /// Fetch the job row a start will run, creating it when the id is new.
    /// Terminal jobs are turned away here.
    async fn resolve_startable_job(
        &self,
        job_id: &str,
        campaign_id: Option<String>,
    ) -> Result<VideoJob, PipelineError> {
        match self.resources.store.get_job(job_id).await? {
            Some(job) => match job.status {
                JobStatus::Completed => Err(PipelineError::NotStartable {
                    job_id: job_id.to_string(),
                    reason: "it already completed".to_string(),
                }),
                JobStatus::Failed | JobStatus::Cancelled => Err(PipelineError::NotStartable {
                    job_id: job_id.to_string(),
                    reason: format!("it is {}, retry it instead", job.status.as_str()),
                }),
                _ => {
                    info!("⏯️ Resuming job {} from {}", job_id, job.status.as_str());
                    Ok(job)
                }
            },
            None => {
                let campaign_id = campaign_id.ok_or_else(|| {
                    PipelineError::InvalidRequest(
                        "campaign_id is required for a new job".to_string(),
                    )
                })?;
                let now = Utc::now();
                let job = VideoJob {
                    id: job_id.to_string(),
                    campaign_id,
                    status: JobStatus::Created,
                    output_location: None,
                    total_cost: None,
                    failed_clip_count: 0,
                    error: None,
                    created_at: now,
                    updated_at: now,
                };
                self.resources.store.insert_job(&job).await?;
                Ok(job)
            }
        }
    }

    /// Job row plus per-task and per-clip progress.
    pub async fn status(&self, job_id: &str) -> Result<JobStatusReport, PipelineError> {
        let job = self
            .resources
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| PipelineError::JobNotFound(job_id.to_string()))?;

        let rows = self.resources.checkpoints.list_for_job(job_id).await?;
        let names = graph::task_names();
        let tasks: Vec<TaskReport> = names
            .iter()
            .map(|name| {
                let row = rows.iter().find(|r| r.task_name == *name);
                TaskReport {
                    name: name.to_string(),
                    status: row.map(|r| r.status).unwrap_or(TaskStatus::Pending),
                    error: row.and_then(|r| r.error.clone()),
                }
            })
            .collect();
        let completed = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        let progress_percent = (completed * 100 / names.len()) as u8;

        let mut clips = ClipSummary::default();
        for clip in self.resources.store.list_clip_jobs(job_id).await? {
            clips.total += 1;
            match clip.status {
                ClipJobStatus::Succeeded => clips.succeeded += 1,
                ClipJobStatus::Failed => clips.failed += 1,
                ClipJobStatus::Cancelled => clips.cancelled += 1,
                _ => clips.in_flight += 1,
            }
        }

        Ok(JobStatusReport {
            running: self.is_running(job_id).await,
            job,
            progress_percent,
            tasks,
            clips,
        })
    }

    /// Cancel a job. A live run is signalled through its token and settles
    /// itself; a job orphaned by a crash is moved to cancelled directly.
    ///
    /// The returned count is the number of pipeline tasks that had not yet
    /// completed when the cancel landed.
    pub async fn cancel(&self, job_id: &str) -> Result<CancelOutcome, PipelineError> {
        let job = self
            .resources
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| PipelineError::JobNotFound(job_id.to_string()))?;

        if job.status == JobStatus::Completed {
            return Err(PipelineError::NotStartable {
                job_id: job_id.to_string(),
                reason: "it already completed".to_string(),
            });
        }

        if job.status.is_terminal() {
            return Ok(CancelOutcome {
                cancelled_task_count: 0,
            });
        }

        let rows = self.resources.checkpoints.list_for_job(job_id).await?;
        let completed = rows
            .iter()
            .filter(|r| r.status == TaskStatus::Completed)
            .count();
        let cancelled_task_count = graph::task_names().len().saturating_sub(completed);

        if let Some(token) = self.active.read().await.get(job_id) {
            token.cancel();
            info!("🛑 Cancellation requested for running job {}", job_id);
            return Ok(CancelOutcome {
                cancelled_task_count,
            });
        }

        // No live run holds this job; a crash left it mid-flight.
        self.resources
            .store
            .set_job_status(job_id, JobStatus::Cancelled)
            .await?;
        info!("🛑 Job {} marked cancelled", job_id);
        Ok(CancelOutcome {
            cancelled_task_count,
        })
    }

    /// Re-run a failed or cancelled job. Completed tasks and rendered clips
    /// are kept; failed records are cleared so only the missing work runs.
    pub async fn retry(
        self: &Arc<Self>,
        job_id: &str,
        options: JobOptions,
    ) -> Result<RetryOutcome, PipelineError> {
        if self.is_running(job_id).await {
            return Err(PipelineError::NotStartable {
                job_id: job_id.to_string(),
                reason: "it is already running".to_string(),
            });
        }

        let job = self
            .resources
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| PipelineError::JobNotFound(job_id.to_string()))?;

        if !self.resources.store.reset_job_for_retry(job_id).await? {
            return Err(PipelineError::NotStartable {
                job_id: job_id.to_string(),
                reason: format!("{} jobs cannot be retried", job.status.as_str()),
            });
        }

        let reset_task_count = self.resources.checkpoints.reset_failed(job_id).await?;
        let reset_clip_count = self.resources.store.reset_failed_clips(job_id).await?;
        info!(
            "🔁 Retrying job {}: cleared {} task record(s), reset {} clip(s)",
            job_id, reset_task_count, reset_clip_count
        );

        let job = self.start(job_id, None, options).await?;
        Ok(RetryOutcome {
            job,
            reset_task_count,
            reset_clip_count,
        })
    }
}

/// Option values the pipeline cannot run with are rejected up front, before
/// any row is written. A zero or negative clip duration would go out to the
/// providers as-is, and zero attempts would fail every clip unsubmitted.
fn validate_options(options: &JobOptions) -> Result<(), PipelineError> {
    if let Some(seconds) = options.clip_duration_seconds {
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(PipelineError::InvalidRequest(format!(
                "clip_duration_seconds must be a positive number, got {}",
                seconds
            )));
        }
    }
    if options.max_clip_attempts == Some(0) {
        return Err(PipelineError::InvalidRequest(
            "max_clip_attempts must be at least 1".to_string(),
        ));
    }
    Ok(())
}
