// Clip renderer - drives one clip sub-job to a terminal state
use crate::models::{ClipJob, ClipJobStatus};
use crate::pipeline::error::PipelineError;
use crate::pipeline::state::{JobContext, PipelineResources};
use crate::providers::{ClipRequest, GenerationError};
use crate::services::pricing;
use tracing::{info, warn};

/// How one clip settled. Provider trouble never escapes as an error; only
/// storage failures do, and those abort the whole run.
#[derive(Debug, Clone)]
pub enum RenderOutcome {
    Succeeded {
        sequence_number: i32,
    },
    Failed {
        sequence_number: i32,
        reason: String,
    },
    Cancelled {
        sequence_number: i32,
    },
}

/// Render a single clip: resolve the pair's assets, submit to the provider,
/// wait for the result, download it, and record cost.
///
/// Transient trouble (transport errors, timeouts) is retried up to
/// max_clip_attempts, each attempt re-submitting from scratch. A definitive
/// provider rejection is terminal immediately. Rows already in a terminal
/// state are respected on resume; a crashed run's in-flight provider task is
/// abandoned and rendering restarts with a fresh submission.
pub async fn render_clip(
    resources: &PipelineResources,
    ctx: &JobContext,
    clip: ClipJob,
) -> Result<RenderOutcome, PipelineError> {
    let seq = clip.sequence_number;

    match clip.status {
        ClipJobStatus::Succeeded => {
            if let Some(location) = clip.clip_location.as_deref() {
                if std::path::Path::new(location).exists() {
                    info!(
                        "⏭️ Clip {} of job {} already rendered, reusing {}",
                        seq, ctx.job_id, location
                    );
                    return Ok(RenderOutcome::Succeeded {
                        sequence_number: seq,
                    });
                }
            }
            warn!(
                "Clip {} of job {} marked succeeded but its file is gone, re-rendering",
                seq, ctx.job_id
            );
        }
        ClipJobStatus::Failed => {
            let reason = clip
                .error
                .clone()
                .unwrap_or_else(|| "failed in a previous run".to_string());
            return Ok(RenderOutcome::Failed {
                sequence_number: seq,
                reason,
            });
        }
        ClipJobStatus::Cancelled => {
            return Ok(RenderOutcome::Cancelled {
                sequence_number: seq,
            });
        }
        _ => {}
    }

    let mut attempts = clip.attempt_count.max(0) as u32;
    let mut last_error = String::from("no attempts left from a previous run");

    while attempts < ctx.max_clip_attempts {
        if ctx.cancel.is_cancelled() {
            resources.store.cancel_clip(&clip.id).await?;
            return Ok(RenderOutcome::Cancelled {
                sequence_number: seq,
            });
        }

        attempts += 1;

        // Signed URLs expire, so both frames are re-resolved every attempt.
        let first_url = match resources.assets.resolve(&clip.first_asset_id).await {
            Ok(url) => url,
            Err(e) => {
                last_error = format!("Asset resolution failed: {}", e);
                warn!(
                    "🔁 Clip {} attempt {}/{}: {}",
                    seq, attempts, ctx.max_clip_attempts, last_error
                );
                continue;
            }
        };
        let second_url = match resources.assets.resolve(&clip.second_asset_id).await {
            Ok(url) => url,
            Err(e) => {
                last_error = format!("Asset resolution failed: {}", e);
                warn!(
                    "🔁 Clip {} attempt {}/{}: {}",
                    seq, attempts, ctx.max_clip_attempts, last_error
                );
                continue;
            }
        };

        let request = ClipRequest {
            first_frame_url: first_url,
            last_frame_url: second_url,
            duration_seconds: clip.duration_seconds,
            prompt: clip.scene_prompt.clone(),
        };

        let task_id = match resources.clips.submit(clip.model, &request).await {
            Ok(id) => id,
            Err(GenerationError::Transient(e)) => {
                last_error = e;
                warn!(
                    "🔁 Clip {} submit attempt {}/{} failed: {}",
                    seq, attempts, ctx.max_clip_attempts, last_error
                );
                continue;
            }
            Err(GenerationError::Failed(e)) => {
                resources.store.fail_clip(&clip.id, &e).await?;
                warn!("❌ Clip {} of job {} rejected: {}", seq, ctx.job_id, e);
                return Ok(RenderOutcome::Failed {
                    sequence_number: seq,
                    reason: e,
                });
            }
            Err(GenerationError::Cancelled) => {
                resources.store.cancel_clip(&clip.id).await?;
                return Ok(RenderOutcome::Cancelled {
                    sequence_number: seq,
                });
            }
        };

        resources
            .store
            .mark_clip_submitted(&clip.id, &task_id, attempts as i32)
            .await?;
        resources.store.mark_clip_polling(&clip.id).await?;

        match resources
            .clips
            .await_result(clip.model, &task_id, &ctx.cancel)
            .await
        {
            Ok(output) => {
                let dest = ctx.work_file(&format!("clip_{:03}.mp4", seq));
                match resources.clips.fetch(&output.output_url, &dest).await {
                    Ok(()) => {
                        let duration = output.duration_seconds.unwrap_or(clip.duration_seconds);
                        let cost = pricing::cost_for(&ctx.rates, clip.model.as_str(), duration);
                        resources.store.complete_clip(&clip.id, &dest, cost).await?;
                        info!(
                            "✅ Clip {} of job {} rendered: {} (${})",
                            seq, ctx.job_id, dest, cost
                        );
                        return Ok(RenderOutcome::Succeeded {
                            sequence_number: seq,
                        });
                    }
                    Err(GenerationError::Transient(e)) => {
                        last_error = format!("Download failed: {}", e);
                        warn!(
                            "🔁 Clip {} attempt {}/{}: {}",
                            seq, attempts, ctx.max_clip_attempts, last_error
                        );
                        continue;
                    }
                    Err(GenerationError::Failed(e)) => {
                        resources.store.fail_clip(&clip.id, &e).await?;
                        return Ok(RenderOutcome::Failed {
                            sequence_number: seq,
                            reason: e,
                        });
                    }
                    Err(GenerationError::Cancelled) => {
                        resources.store.cancel_clip(&clip.id).await?;
                        return Ok(RenderOutcome::Cancelled {
                            sequence_number: seq,
                        });
                    }
                }
            }
            Err(GenerationError::Transient(e)) => {
                last_error = e;
                warn!(
                    "🔁 Clip {} generation attempt {}/{} did not settle: {}",
                    seq, attempts, ctx.max_clip_attempts, last_error
                );
                continue;
            }
            Err(GenerationError::Failed(e)) => {
                resources.store.fail_clip(&clip.id, &e).await?;
                warn!("❌ Clip {} of job {} failed: {}", seq, ctx.job_id, e);
                return Ok(RenderOutcome::Failed {
                    sequence_number: seq,
                    reason: e,
                });
            }
            Err(GenerationError::Cancelled) => {
                resources.store.cancel_clip(&clip.id).await?;
                return Ok(RenderOutcome::Cancelled {
                    sequence_number: seq,
                });
            }
        }
    }

    let reason = format!(
        "Gave up after {} attempts: {}",
        ctx.max_clip_attempts, last_error
    );
    resources.store.fail_clip(&clip.id, &reason).await?;
    warn!("❌ Clip {} of job {} failed: {}", seq, ctx.job_id, reason);
    Ok(RenderOutcome::Failed {
        sequence_number: seq,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::state::JobOptions;
    use crate::pipeline::testing::TestHarness;

    #[tokio::test]
    async fn test_success_records_location_and_cost() {
        let harness = TestHarness::new("render_success");
        harness.seed_pending_clips("job-1", 1);
        let ctx = harness.context("job-1", "camp-1", &JobOptions::default());
        let clip = harness.store.clips_snapshot("job-1").remove(0);

        let outcome = render_clip(&harness.resources(), &ctx, clip)
            .await
            .expect("render succeeds");
        assert!(matches!(
            outcome,
            RenderOutcome::Succeeded { sequence_number: 1 }
        ));

        let row = harness.store.clips_snapshot("job-1").remove(0);
        assert_eq!(row.status, ClipJobStatus::Succeeded);
        assert_eq!(row.attempt_count, 1);
        let location = row.clip_location.expect("location recorded");
        assert!(location.ends_with("clip_001.mp4"));
        assert!(std::path::Path::new(&location).exists());
        // 4s of kling at the default rate.
        assert_eq!(row.cost, Some(rust_decimal::Decimal::new(368, 3)));

        harness.cleanup();
    }

    #[tokio::test]
    async fn test_definitive_rejection_fails_without_retries() {
        let harness = TestHarness::new("render_rejected");
        harness.seed_pending_clips("job-1", 1);
        harness.clips.fail_first_frame("https://cdn.test/a1");
        let ctx = harness.context("job-1", "camp-1", &JobOptions::default());
        let clip = harness.store.clips_snapshot("job-1").remove(0);

        let outcome = render_clip(&harness.resources(), &ctx, clip)
            .await
            .expect("provider trouble is not an error");
        match outcome {
            RenderOutcome::Failed {
                sequence_number,
                reason,
            } => {
                assert_eq!(sequence_number, 1);
                assert!(reason.contains("rejected"));
            }
            other => panic!("expected failure, got {:?}", other),
        }

        // One submit, no retry: the rejection was definitive.
        assert_eq!(harness.clips.submit_count(), 1);
        assert_eq!(
            harness.store.clips_snapshot("job-1")[0].status,
            ClipJobStatus::Failed
        );

        harness.cleanup();
    }

    #[tokio::test]
    async fn test_transient_trouble_retries_until_success() {
        let harness = TestHarness::new("render_retry_ok");
        harness.seed_pending_clips("job-1", 1);
        harness.clips.fail_transiently("https://cdn.test/a1", 2);
        let ctx = harness.context("job-1", "camp-1", &JobOptions::default());
        let clip = harness.store.clips_snapshot("job-1").remove(0);

        let outcome = render_clip(&harness.resources(), &ctx, clip)
            .await
            .expect("render settles");
        assert!(matches!(outcome, RenderOutcome::Succeeded { .. }));

        // Two timeouts burned two attempts; the third submission landed.
        assert_eq!(harness.clips.submit_count(), 3);
        let row = harness.store.clips_snapshot("job-1").remove(0);
        assert_eq!(row.status, ClipJobStatus::Succeeded);
        assert_eq!(row.attempt_count, 3);
        assert!(row
            .clip_location
            .expect("location recorded")
            .ends_with("clip_001.mp4"));

        harness.cleanup();
    }

    #[tokio::test]
    async fn test_unresolvable_asset_consumes_attempts() {
        let harness = TestHarness::new("render_no_asset");
        harness.seed_pending_clips("job-1", 1);
        harness.assets.fail_asset("a1");
        let ctx = harness.context("job-1", "camp-1", &JobOptions::default());
        let clip = harness.store.clips_snapshot("job-1").remove(0);

        let outcome = render_clip(&harness.resources(), &ctx, clip)
            .await
            .expect("resolution trouble is not an error");
        match outcome {
            RenderOutcome::Failed { reason, .. } => {
                assert!(reason.contains("Asset resolution failed"));
            }
            other => panic!("expected failure, got {:?}", other),
        }

        // Every attempt died at resolution; the provider never saw the clip.
        assert_eq!(harness.clips.submit_count(), 0);
        assert_eq!(
            harness.store.clips_snapshot("job-1")[0].status,
            ClipJobStatus::Failed
        );

        harness.cleanup();
    }

    #[tokio::test]
    async fn test_settled_failed_row_is_respected_on_resume() {
        let harness = TestHarness::new("render_settled");
        harness.seed_failed_clip("job-1", 1);
        let ctx = harness.context("job-1", "camp-1", &JobOptions::default());
        let clip = harness.store.clips_snapshot("job-1").remove(0);

        let outcome = render_clip(&harness.resources(), &ctx, clip)
            .await
            .expect("settled row");
        match outcome {
            RenderOutcome::Failed { reason, .. } => assert_eq!(reason, "scripted failure"),
            other => panic!("expected the recorded failure, got {:?}", other),
        }
        assert_eq!(harness.clips.submit_count(), 0);

        harness.cleanup();
    }

    #[tokio::test]
    async fn test_succeeded_row_with_missing_file_rerenders() {
        let harness = TestHarness::new("render_gone");
        harness.seed_succeeded_clips("job-1", &[(1, 4.0)]);
        let ctx = harness.context("job-1", "camp-1", &JobOptions::default());
        let clip = harness.store.clips_snapshot("job-1").remove(0);

        // The row says succeeded but its file is gone.
        let outcome = render_clip(&harness.resources(), &ctx, clip)
            .await
            .expect("render succeeds");
        assert!(matches!(outcome, RenderOutcome::Succeeded { .. }));
        assert_eq!(harness.clips.submit_count(), 1);

        harness.cleanup();
    }
}
