// Pipeline tasks: concat_clips, merge_audio, store_output
use crate::models::ClipJobStatus;
use crate::pipeline::error::PipelineError;
use crate::pipeline::graph::{BUILD_SOUNDTRACK, CONCAT_CLIPS, MERGE_AUDIO, STORE_OUTPUT};
use crate::pipeline::state::{
    ConcatOutput, JobContext, MergeOutput, PipelineResources, SoundtrackOutput, StoreOutput,
};
use rust_decimal::Decimal;
use tracing::{info, warn};

/// Concatenate the rendered clips in sequence order.
///
/// Failed clips simply drop out; whatever rendered plays in its original
/// order. The clip list from the store is already sequence-sorted.
pub async fn concat_clips(
    resources: &PipelineResources,
    ctx: &JobContext,
) -> Result<serde_json::Value, PipelineError> {
    if ctx.cancel.is_cancelled() {
        return Err(PipelineError::Cancelled(ctx.job_id.clone()));
    }

    let clips = resources.store.list_clip_jobs(&ctx.job_id).await?;
    let locations: Vec<String> = clips
        .iter()
        .filter(|c| c.status == ClipJobStatus::Succeeded)
        .filter_map(|c| c.clip_location.clone())
        .collect();

    if locations.is_empty() {
        return Err(PipelineError::task_failed(
            CONCAT_CLIPS,
            "No rendered clips to combine",
        ));
    }

    let output_path = ctx.work_file("combined.mp4");
    resources
        .media
        .concat_videos(&locations, &output_path)
        .await
        .map_err(|e| PipelineError::task_failed(CONCAT_CLIPS, e))?;

    info!(
        "🎬 Combined {} clips for job {} into {}",
        locations.len(),
        ctx.job_id,
        output_path
    );

    let output = ConcatOutput {
        video: output_path,
        clip_count: locations.len(),
    };
    Ok(serde_json::to_value(output)?)
}

/// Mux the soundtrack onto the combined video, with fades. When the
/// soundtrack branch came back empty the video passes through untouched.
pub async fn merge_audio(
    resources: &PipelineResources,
    ctx: &JobContext,
) -> Result<serde_json::Value, PipelineError> {
    if ctx.cancel.is_cancelled() {
        return Err(PipelineError::Cancelled(ctx.job_id.clone()));
    }

    let concat: ConcatOutput = read_output(resources, ctx, CONCAT_CLIPS).await?;
    let soundtrack: SoundtrackOutput = read_output(resources, ctx, BUILD_SOUNDTRACK).await?;

    let track = match soundtrack.track {
        Some(track) => track,
        None => {
            info!(
                "⏭️ Job {} has no soundtrack, shipping video as-is",
                ctx.job_id
            );
            let output = MergeOutput {
                video: concat.video,
                has_audio: false,
            };
            return Ok(serde_json::to_value(output)?);
        }
    };

    // Fade against the measured video length when possible.
    let video_seconds = match resources.media.probe_duration(&concat.video).await {
        Ok(seconds) => seconds,
        Err(e) => {
            warn!(
                "Could not probe {}: {}, using the planned track length",
                concat.video, e
            );
            soundtrack.duration_seconds
        }
    };

    let faded = ctx.work_file("soundtrack_faded.mp3");
    let audio = match resources
        .media
        .fade_audio(
            &track,
            &faded,
            ctx.fade_in_seconds,
            ctx.fade_out_seconds,
            video_seconds,
        )
        .await
    {
        Ok(()) => faded,
        Err(e) => {
            warn!("Fade failed for job {}: {}, muxing the raw track", ctx.job_id, e);
            track
        }
    };

    let merged = ctx.work_file("merged.mp4");
    resources
        .media
        .mux_audio(&concat.video, &audio, &merged)
        .await
        .map_err(|e| PipelineError::task_failed(MERGE_AUDIO, e))?;

    info!("🔊 Muxed soundtrack into {} for job {}", merged, ctx.job_id);

    let output = MergeOutput {
        video: merged,
        has_audio: true,
    };
    Ok(serde_json::to_value(output)?)
}

/// Copy the finished video to the output directory, settle job bookkeeping
/// (cost, failed clip count), and clean the scratch space.
pub async fn store_output(
    resources: &PipelineResources,
    ctx: &JobContext,
) -> Result<serde_json::Value, PipelineError> {
    if ctx.cancel.is_cancelled() {
        return Err(PipelineError::Cancelled(ctx.job_id.clone()));
    }

    let merge: MergeOutput = read_output(resources, ctx, MERGE_AUDIO).await?;
    let soundtrack: SoundtrackOutput = read_output(resources, ctx, BUILD_SOUNDTRACK).await?;

    let location = ctx.output_file(&format!("{}_final.mp4", ctx.job_id));
    crate::utils::ensure_output_directory(&location).map_err(PipelineError::Storage)?;

    // A previous run may have copied the artifact and crashed before its
    // checkpoint landed; an artifact already in place is kept.
    if !std::path::Path::new(&location).exists() {
        tokio::fs::copy(&merge.video, &location).await.map_err(|e| {
            PipelineError::task_failed(STORE_OUTPUT, format!("Could not store artifact: {}", e))
        })?;
    }

    let clips = resources.store.list_clip_jobs(&ctx.job_id).await?;
    let clip_cost: Decimal = clips.iter().filter_map(|c| c.cost).sum();
    let total_cost = clip_cost + soundtrack.cost;
    let failed_clip_count = clips
        .iter()
        .filter(|c| matches!(c.status, ClipJobStatus::Failed | ClipJobStatus::Cancelled))
        .count() as i32;

    resources
        .store
        .complete_job(&ctx.job_id, &location, total_cost, failed_clip_count)
        .await?;

    if let Err(e) = tokio::fs::remove_dir_all(&ctx.work_dir).await {
        warn!("🧹 Could not clean work dir for job {}: {}", ctx.job_id, e);
    } else {
        info!("🧹 Cleaned work dir for job {}", ctx.job_id);
    }

    let output = StoreOutput {
        location,
        total_cost,
        failed_clip_count,
    };
    Ok(serde_json::to_value(output)?)
}

async fn read_output<T: serde::de::DeserializeOwned>(
    resources: &PipelineResources,
    ctx: &JobContext,
    task_name: &str,
) -> Result<T, PipelineError> {
    let value = resources
        .checkpoints
        .get_output(&ctx.job_id, task_name)
        .await?
        .ok_or_else(|| {
            PipelineError::Storage(format!(
                "Missing {} output for job {}",
                task_name, ctx.job_id
            ))
        })?;
    Ok(serde_json::from_value(value)?)
}
