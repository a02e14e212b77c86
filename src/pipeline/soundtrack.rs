// Pipeline task: build_soundtrack
use crate::models::ClipJobStatus;
use crate::pipeline::error::PipelineError;
use crate::pipeline::state::{AudioSegment, JobContext, PipelineResources, SoundtrackOutput};
use crate::providers::{GenerationError, MusicRequest};
use crate::services::pricing;
use rust_decimal::Decimal;
use tracing::{info, warn};

/// Longest piece the music provider renders in one generation.
pub const MAX_SEGMENT_SECONDS: f64 = 30.0;

pub const MUSIC_MODEL: &str = "eleven-music-v1";

/// Generate one continuous music track covering the rendered clips.
///
/// Long tracks are built as a chain of segments, each conditioned on the one
/// before it, so the chain is strictly sequential. Any miss abandons the
/// whole track: the task still completes, with no audio, and the job carries
/// on. Only cancellation and storage trouble leave this function as errors.
pub async fn build_soundtrack(
    resources: &PipelineResources,
    ctx: &JobContext,
) -> Result<serde_json::Value, PipelineError> {
    if ctx.cancel.is_cancelled() {
        return Err(PipelineError::Cancelled(ctx.job_id.clone()));
    }

    let music = match &resources.music {
        Some(music) => music.clone(),
        None => {
            warn!(
                "🎵 No music provider configured, job {} ships silent",
                ctx.job_id
            );
            return degraded(0.0, "No music provider configured");
        }
    };

    // The track covers the final cut: exactly the clips that rendered.
    let clips = resources.store.list_clip_jobs(&ctx.job_id).await?;
    let total_seconds: f64 = clips
        .iter()
        .filter(|c| c.status == ClipJobStatus::Succeeded)
        .map(|c| c.duration_seconds)
        .sum();

    if total_seconds <= 0.0 {
        return degraded(0.0, "No rendered clips to score");
    }

    let durations = split_segments(total_seconds);
    info!(
        "🎵 Building {:.1}s soundtrack for job {} in {} segment(s)",
        total_seconds,
        ctx.job_id,
        durations.len()
    );

    let mut segments: Vec<AudioSegment> = Vec::with_capacity(durations.len());
    let mut previous_id: Option<String> = None;
    let mut previous_location: Option<String> = None;

    for (index, duration) in durations.iter().copied().enumerate() {
        if ctx.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled(ctx.job_id.clone()));
        }

        let request = MusicRequest {
            prompt: ctx.music_prompt.clone(),
            duration_seconds: duration,
            continuation_of: previous_id.clone(),
        };
        let dest = ctx.work_file(&format!("music_{:02}.mp3", index));

        match music.generate(&request, &dest, &ctx.cancel).await {
            Ok(output) => {
                segments.push(AudioSegment {
                    index,
                    duration_seconds: output.duration_seconds.unwrap_or(duration),
                    provider_id: output.provider_id.clone(),
                    location: output.file_path.clone(),
                    continued_from: previous_location.clone(),
                });
                previous_id = Some(output.provider_id);
                previous_location = Some(output.file_path);
            }
            Err(GenerationError::Cancelled) => {
                return Err(PipelineError::Cancelled(ctx.job_id.clone()));
            }
            Err(e) => {
                // Segment k is conditioned on k-1, so one miss sinks the track.
                warn!(
                    "🎵 Soundtrack for job {} failed at segment {}: {}; finishing without audio",
                    ctx.job_id, index, e
                );
                return degraded(total_seconds, &format!("Segment {} failed: {}", index, e));
            }
        }
    }

    let track = if segments.len() == 1 {
        segments[0].location.clone()
    } else {
        let locations: Vec<String> = segments.iter().map(|s| s.location.clone()).collect();
        let combined = ctx.work_file("soundtrack.mp3");
        if let Err(e) = resources.media.concat_audio(&locations, &combined).await {
            warn!(
                "🎵 Could not join music segments for job {}: {}; finishing without audio",
                ctx.job_id, e
            );
            return degraded(total_seconds, &format!("Segment concat failed: {}", e));
        }
        combined
    };

    let cost = pricing::cost_for(&ctx.rates, MUSIC_MODEL, total_seconds);

    info!(
        "🎵 Soundtrack ready for job {}: {} ({}, {} segment(s), ${})",
        ctx.job_id,
        track,
        crate::utils::format_duration(total_seconds),
        segments.len(),
        cost
    );

    let output = SoundtrackOutput {
        track: Some(track),
        duration_seconds: total_seconds,
        segments,
        cost,
        reason: None,
    };
    Ok(serde_json::to_value(output)?)
}

fn degraded(duration_seconds: f64, reason: &str) -> Result<serde_json::Value, PipelineError> {
    let output = SoundtrackOutput {
        track: None,
        duration_seconds,
        segments: Vec::new(),
        cost: Decimal::ZERO,
        reason: Some(reason.to_string()),
    };
    Ok(serde_json::to_value(output)?)
}

fn split_segments(total_seconds: f64) -> Vec<f64> {
    let mut durations = Vec::new();
    let mut remaining = total_seconds;
    while remaining > 0.01 {
        let piece = remaining.min(MAX_SEGMENT_SECONDS);
        durations.push(piece);
        remaining -= piece;
    }
    durations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::TestHarness;
    use crate::pipeline::state::JobOptions;

    #[test]
    fn test_split_segments() {
        assert_eq!(split_segments(20.0), vec![20.0]);
        assert_eq!(split_segments(30.0), vec![30.0]);
        assert_eq!(split_segments(70.0), vec![30.0, 30.0, 10.0]);
        assert!(split_segments(0.0).is_empty());
    }

    #[tokio::test]
    async fn test_short_track_is_a_single_segment() {
        let harness = TestHarness::new("soundtrack_single");
        harness.seed_succeeded_clips("job-1", &[(1, 4.0), (2, 4.0), (3, 4.0), (4, 4.0), (5, 4.0)]);
        let ctx = harness.context("job-1", "camp-1", &JobOptions::default());

        let value = build_soundtrack(&harness.resources(), &ctx)
            .await
            .expect("soundtrack should complete");
        let output: SoundtrackOutput = serde_json::from_value(value).expect("valid output");

        assert!(output.track.is_some());
        assert_eq!(output.duration_seconds, 20.0);
        assert_eq!(output.segments.len(), 1);
        assert_eq!(output.segments[0].continued_from, None);

        let requests = harness.music.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].duration_seconds, 20.0);
        assert_eq!(requests[0].continuation_of, None);

        harness.cleanup();
    }

    #[tokio::test]
    async fn test_long_track_chains_segments_in_order() {
        let harness = TestHarness::new("soundtrack_chain");
        harness.seed_succeeded_clips("job-1", &[(1, 35.0), (2, 35.0)]);
        let ctx = harness.context("job-1", "camp-1", &JobOptions::default());

        let value = build_soundtrack(&harness.resources(), &ctx)
            .await
            .expect("soundtrack should complete");
        let output: SoundtrackOutput = serde_json::from_value(value).expect("valid output");

        assert_eq!(output.duration_seconds, 70.0);
        assert_eq!(output.segments.len(), 3);

        // Each request continues from the previous segment's provider id.
        let requests = harness.music.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(
            requests.iter().map(|r| r.duration_seconds).collect::<Vec<_>>(),
            vec![30.0, 30.0, 10.0]
        );
        assert_eq!(requests[0].continuation_of, None);
        assert_eq!(
            requests[1].continuation_of,
            Some(output.segments[0].provider_id.clone())
        );
        assert_eq!(
            requests[2].continuation_of,
            Some(output.segments[1].provider_id.clone())
        );

        // Each segment records its parent's rendered file.
        assert_eq!(output.segments[0].continued_from, None);
        assert_eq!(
            output.segments[1].continued_from,
            Some(output.segments[0].location.clone())
        );
        assert_eq!(
            output.segments[2].continued_from,
            Some(output.segments[1].location.clone())
        );

        // Joined into one file.
        assert!(output.track.expect("track").ends_with("soundtrack.mp3"));

        harness.cleanup();
    }

    #[tokio::test]
    async fn test_segment_failure_completes_without_audio() {
        let harness = TestHarness::new("soundtrack_degraded");
        harness.seed_succeeded_clips("job-1", &[(1, 35.0), (2, 35.0)]);
        harness.music.fail_at_segment(1);
        let ctx = harness.context("job-1", "camp-1", &JobOptions::default());

        let value = build_soundtrack(&harness.resources(), &ctx)
            .await
            .expect("degraded soundtrack is still a completion");
        let output: SoundtrackOutput = serde_json::from_value(value).expect("valid output");

        assert!(output.track.is_none());
        assert!(output.reason.expect("reason").contains("Segment 1"));
        assert!(output.segments.is_empty());

        // The chain stops at the miss: the third segment is never requested.
        assert_eq!(harness.music.requests().len(), 2);

        harness.cleanup();
    }

    #[tokio::test]
    async fn test_missing_provider_completes_without_audio() {
        let harness = TestHarness::new("soundtrack_silent");
        harness.seed_succeeded_clips("job-1", &[(1, 4.0)]);
        let ctx = harness.context("job-1", "camp-1", &JobOptions::default());

        let value = build_soundtrack(&harness.resources_without_music(), &ctx)
            .await
            .expect("silent job still completes");
        let output: SoundtrackOutput = serde_json::from_value(value).expect("valid output");

        assert!(output.track.is_none());
        assert!(harness.music.requests().is_empty());

        harness.cleanup();
    }
}
