// Pipeline task: generate_clips fan-out
use crate::pipeline::error::PipelineError;
use crate::pipeline::graph::GENERATE_CLIPS;
use crate::pipeline::renderer::{render_clip, RenderOutcome};
use crate::pipeline::state::{GenerateClipsOutput, JobContext, PipelineResources};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Run every clip sub-job concurrently and wait for all of them to settle.
///
/// One clip failing never interrupts its siblings. The task itself fails only
/// when no clip at all succeeded; anything better is partial success, and the
/// failed sequence numbers are carried in the output.
pub async fn generate_clips(
    resources: &PipelineResources,
    ctx: &JobContext,
) -> Result<serde_json::Value, PipelineError> {
    let clips = resources.store.list_clip_jobs(&ctx.job_id).await?;

    if clips.is_empty() {
        return Err(PipelineError::task_failed(
            GENERATE_CLIPS,
            "No clip jobs to run",
        ));
    }

    let total = clips.len();
    let limiter = ctx
        .max_concurrent_clips
        .map(|n| Arc::new(Semaphore::new(n.max(1))));

    match ctx.max_concurrent_clips {
        Some(n) => info!(
            "🎬 Generating {} clips for job {} (at most {} in flight)",
            total, ctx.job_id, n
        ),
        None => info!("🎬 Generating {} clips for job {}", total, ctx.job_id),
    }

    let futures = clips.into_iter().map(|clip| {
        let limiter = limiter.clone();
        async move {
            let _permit = match &limiter {
                Some(semaphore) => Some(semaphore.acquire().await.map_err(|e| {
                    PipelineError::Storage(format!("Clip limiter closed: {}", e))
                })?),
                None => None,
            };
            render_clip(resources, ctx, clip).await
        }
    });

    let results = join_all(futures).await;

    let mut succeeded = Vec::new();
    let mut failed = Vec::new();
    for result in results {
        match result? {
            RenderOutcome::Succeeded { sequence_number } => succeeded.push(sequence_number),
            RenderOutcome::Failed {
                sequence_number,
                reason,
            } => {
                warn!(
                    "❌ Clip {} of job {} drops out of the final cut: {}",
                    sequence_number, ctx.job_id, reason
                );
                failed.push(sequence_number);
            }
            RenderOutcome::Cancelled { sequence_number } => failed.push(sequence_number),
        }
    }

    if ctx.cancel.is_cancelled() {
        return Err(PipelineError::Cancelled(ctx.job_id.clone()));
    }

    succeeded.sort_unstable();
    failed.sort_unstable();

    if succeeded.is_empty() {
        return Err(PipelineError::task_failed(
            GENERATE_CLIPS,
            format!("All {} clips failed", total),
        ));
    }

    info!(
        "🎬 Job {}: {}/{} clips rendered, {} failed",
        ctx.job_id,
        succeeded.len(),
        total,
        failed.len()
    );

    let output = GenerateClipsOutput {
        total,
        succeeded,
        failed,
    };
    Ok(serde_json::to_value(output)?)
}
