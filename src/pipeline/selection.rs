// Pipeline tasks: select_pairs and create_clip_jobs
use crate::models::{ClipJob, ClipJobStatus};
use crate::pipeline::error::PipelineError;
use crate::pipeline::graph::{CREATE_CLIP_JOBS, SELECT_PAIRS};
use crate::pipeline::state::{
    ClipJobsOutput, JobContext, PipelineResources, SelectedPair, SelectionOutput,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

/// Pick the image pairs for this job in playback order.
///
/// When max_scenes caps the job, the highest-scored pairs win the slots, but
/// the survivors still play in their curated position order.
pub async fn select_pairs(
    resources: &PipelineResources,
    ctx: &JobContext,
) -> Result<serde_json::Value, PipelineError> {
    let mut pairs = resources.store.list_pairs(&ctx.campaign_id).await?;

    if pairs.is_empty() {
        return Err(PipelineError::task_failed(
            SELECT_PAIRS,
            format!("No asset pairs found for campaign {}", ctx.campaign_id),
        ));
    }

    if let Some(max) = ctx.max_scenes {
        if pairs.len() > max {
            pairs.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            pairs.truncate(max);
            pairs.sort_by_key(|p| p.position);
        }
    }

    let selected: Vec<SelectedPair> = pairs
        .into_iter()
        .map(|p| SelectedPair {
            pair_id: p.id,
            first_asset_id: p.first_asset_id,
            second_asset_id: p.second_asset_id,
            scene_prompt: p.rationale,
        })
        .collect();

    info!(
        "🖼️ Selected {} pairs for job {} (campaign {})",
        selected.len(),
        ctx.job_id,
        ctx.campaign_id
    );

    let output = SelectionOutput { pairs: selected };
    Ok(serde_json::to_value(output)?)
}

/// Persist one clip sub-job per selected pair before anything talks to a
/// provider. Re-running is safe: existing (job, sequence) rows are kept.
pub async fn create_clip_jobs(
    resources: &PipelineResources,
    ctx: &JobContext,
) -> Result<serde_json::Value, PipelineError> {
    let selection = resources
        .checkpoints
        .get_output(&ctx.job_id, SELECT_PAIRS)
        .await?
        .ok_or_else(|| {
            PipelineError::Storage(format!("Missing {} output for job {}", SELECT_PAIRS, ctx.job_id))
        })?;
    let selection: SelectionOutput = serde_json::from_value(selection)?;

    let now = Utc::now();
    let clips: Vec<ClipJob> = selection
        .pairs
        .iter()
        .enumerate()
        .map(|(i, pair)| ClipJob {
            id: Uuid::new_v4().to_string(),
            job_id: ctx.job_id.clone(),
            sequence_number: (i + 1) as i32,
            first_asset_id: pair.first_asset_id.clone(),
            second_asset_id: pair.second_asset_id.clone(),
            model: ctx.model,
            duration_seconds: ctx.clip_duration_seconds,
            scene_prompt: pair.scene_prompt.clone(),
            status: ClipJobStatus::Pending,
            clip_location: None,
            provider_task_id: None,
            cost: None,
            attempt_count: 0,
            error: None,
            created_at: now,
            updated_at: now,
        })
        .collect();

    if clips.is_empty() {
        return Err(PipelineError::task_failed(
            CREATE_CLIP_JOBS,
            "Selection produced no pairs",
        ));
    }

    let inserted = resources.store.insert_clip_jobs(&clips).await?;

    info!(
        "🎬 Created clip jobs for {}: {} total, {} new",
        ctx.job_id,
        clips.len(),
        inserted
    );

    let output = ClipJobsOutput {
        total: clips.len(),
        inserted,
    };
    Ok(serde_json::to_value(output)?)
}
