// Pipeline executor - checkpointed execution of the task graph
use crate::models::JobStatus;
use crate::pipeline::checkpoint::TaskStatus;
use crate::pipeline::error::PipelineError;
use crate::pipeline::graph::{self, STORE_OUTPUT};
use crate::pipeline::state::{JobContext, PipelineResources};
use crate::pipeline::{assembly, fanout, selection, soundtrack};
use futures::future::join_all;
use std::collections::HashSet;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Upper bound on scheduling rounds, a guard against a wedged loop.
    pub max_steps: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { max_steps: 20 }
    }
}

pub struct PipelineExecutor {
    resources: PipelineResources,
    config: ExecutorConfig,
}

impl PipelineExecutor {
    pub fn new(resources: PipelineResources) -> Self {
        Self {
            resources,
            config: ExecutorConfig::default(),
        }
    }

    pub fn with_config(resources: PipelineResources, config: ExecutorConfig) -> Self {
        Self { resources, config }
    }

    /// Run one job to a terminal state, resuming from whatever the checkpoint
    /// store already holds. Completed tasks are skipped, never re-run. A task
    /// that failed stays failed until an explicit retry resets it; everything
    /// downstream of it stays blocked, while independent branches keep going.
    ///
    /// Only fatal storage errors escape as Err. The run can be resumed after
    /// those; everything else lands the job in a persisted terminal status.
    pub async fn run(&self, ctx: &JobContext) -> Result<JobStatus, PipelineError> {
        graph::validate().map_err(PipelineError::Storage)?;

        tokio::fs::create_dir_all(&ctx.work_dir)
            .await
            .map_err(|e| PipelineError::Storage(format!("Could not create work dir: {}", e)))?;

        let mut completed: HashSet<String> = HashSet::new();
        let mut stopped: HashSet<String> = HashSet::new();
        let mut failures: Vec<(String, String)> = Vec::new();

        for checkpoint in self
            .resources
            .checkpoints
            .list_for_job(&ctx.job_id)
            .await?
        {
            match checkpoint.status {
                TaskStatus::Completed => {
                    completed.insert(checkpoint.task_name);
                }
                TaskStatus::Failed => {
                    failures.push((
                        checkpoint.task_name.clone(),
                        checkpoint
                            .error
                            .clone()
                            .unwrap_or_else(|| "failed in a previous run".to_string()),
                    ));
                    stopped.insert(checkpoint.task_name);
                }
                TaskStatus::Cancelled => {
                    stopped.insert(checkpoint.task_name);
                }
                // Pending and running rows belong to a run that never
                // finished; those tasks simply run again.
                _ => {}
            }
        }

        if !completed.is_empty() {
            info!(
                "⏭️ Job {} resumes with {} task(s) already completed",
                ctx.job_id,
                completed.len()
            );
        }

        let mut step = 0usize;
        while step < self.config.max_steps {
            if ctx.cancel.is_cancelled() {
                return self.finish_cancelled(ctx).await;
            }

            let ready = graph::ready_tasks(&completed, &stopped);
            if ready.is_empty() {
                break;
            }

            step += 1;
            let names: Vec<&str> = ready.iter().map(|t| t.name).collect();
            info!("🚀 Job {} step {}: running {:?}", ctx.job_id, step, names);

            for task in &ready {
                if let Some(status) = graph::job_status_for(task.name) {
                    self.resources
                        .store
                        .set_job_status(&ctx.job_id, status)
                        .await?;
                }
                self.resources
                    .checkpoints
                    .mark_running(&ctx.job_id, task.name)
                    .await?;
            }

            let futures = ready.iter().map(|task| self.run_task(task.name, ctx));
            let results = join_all(futures).await;

            let mut cancelled = false;
            for (task, result) in ready.iter().zip(results) {
                match result {
                    Ok(output) => {
                        self.resources
                            .checkpoints
                            .complete(&ctx.job_id, task.name, &output)
                            .await?;
                        completed.insert(task.name.to_string());
                        info!("✅ Task {} completed for job {}", task.name, ctx.job_id);
                    }
                    Err(PipelineError::Cancelled(_)) => {
                        self.resources
                            .checkpoints
                            .mark_cancelled(&ctx.job_id, task.name)
                            .await?;
                        cancelled = true;
                    }
                    Err(e) if e.is_fatal() => {
                        error!("💥 Job {} aborted in {}: {}", ctx.job_id, task.name, e);
                        return Err(e);
                    }
                    Err(e) => {
                        let reason = e.to_string();
                        warn!(
                            "❌ Task {} failed for job {}: {}",
                            task.name, ctx.job_id, reason
                        );
                        self.resources
                            .checkpoints
                            .mark_failed(&ctx.job_id, task.name, &reason)
                            .await?;
                        stopped.insert(task.name.to_string());
                        failures.push((task.name.to_string(), reason));
                    }
                }
            }

            if cancelled {
                return self.finish_cancelled(ctx).await;
            }
        }

        if completed.contains(STORE_OUTPUT) {
            info!("🏁 Job {} completed", ctx.job_id);
            return Ok(JobStatus::Completed);
        }

        if ctx.cancel.is_cancelled() {
            return self.finish_cancelled(ctx).await;
        }

        let reason = failures
            .first()
            .map(|(task, reason)| format!("{}: {}", task, reason))
            .unwrap_or_else(|| "Pipeline stalled without completing".to_string());

        self.resources.store.fail_job(&ctx.job_id, &reason).await?;
        warn!("❌ Job {} failed: {}", ctx.job_id, reason);
        Ok(JobStatus::Failed)
    }

    async fn finish_cancelled(&self, ctx: &JobContext) -> Result<JobStatus, PipelineError> {
        self.resources
            .store
            .set_job_status(&ctx.job_id, JobStatus::Cancelled)
            .await?;
        info!("🛑 Job {} cancelled", ctx.job_id);
        Ok(JobStatus::Cancelled)
    }

    async fn run_task(
        &self,
        name: &str,
        ctx: &JobContext,
    ) -> Result<serde_json::Value, PipelineError> {
        match name {
            graph::SELECT_PAIRS => selection::select_pairs(&self.resources, ctx).await,
            graph::CREATE_CLIP_JOBS => selection::create_clip_jobs(&self.resources, ctx).await,
            graph::GENERATE_CLIPS => fanout::generate_clips(&self.resources, ctx).await,
            graph::BUILD_SOUNDTRACK => soundtrack::build_soundtrack(&self.resources, ctx).await,
            graph::CONCAT_CLIPS => assembly::concat_clips(&self.resources, ctx).await,
            graph::MERGE_AUDIO => assembly::merge_audio(&self.resources, ctx).await,
            graph::STORE_OUTPUT => assembly::store_output(&self.resources, ctx).await,
            other => Err(PipelineError::Storage(format!("Unknown task '{}'", other))),
        }
    }
}
