// Pipeline state - per-job configuration and task outputs
use crate::assets::AssetResolver;
use crate::media::MediaTools;
use crate::models::ClipModel;
use crate::pipeline::checkpoint::CheckpointStore;
use crate::pipeline::store::JobStore;
use crate::providers::{ClipGeneration, MusicGeneration};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_CLIP_SECONDS: f64 = 4.0;
pub const DEFAULT_MAX_CLIP_ATTEMPTS: u32 = 3;
pub const DEFAULT_FADE_IN_SECONDS: f64 = 1.0;
pub const DEFAULT_FADE_OUT_SECONDS: f64 = 2.0;
pub const DEFAULT_MUSIC_PROMPT: &str = "Upbeat instrumental track for a product promo video";

/// Caller-supplied knobs for a pipeline run. Everything is optional;
/// omitted fields fall back to the defaults above.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JobOptions {
    pub model: Option<String>,
    pub clip_duration_seconds: Option<f64>,
    pub max_scenes: Option<usize>,
    pub music_prompt: Option<String>,
    pub max_concurrent_clips: Option<usize>,
    pub max_clip_attempts: Option<u32>,
}

/// Everything the shared services need to run any job.
#[derive(Clone)]
pub struct PipelineResources {
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub store: Arc<dyn JobStore>,
    pub clips: Arc<dyn ClipGeneration>,
    pub music: Option<Arc<dyn MusicGeneration>>,
    pub assets: Arc<dyn AssetResolver>,
    pub media: Arc<dyn MediaTools>,
}

/// Resolved per-job settings, passed to every task.
#[derive(Clone)]
pub struct JobContext {
    pub job_id: String,
    pub campaign_id: String,
    pub model: ClipModel,
    pub clip_duration_seconds: f64,
    pub max_scenes: Option<usize>,
    pub music_prompt: String,
    pub max_concurrent_clips: Option<usize>,
    pub max_clip_attempts: u32,
    pub fade_in_seconds: f64,
    pub fade_out_seconds: f64,
    pub work_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Per-second model rates keyed by model name, fetched once per run.
    pub rates: HashMap<String, Decimal>,
    pub cancel: CancellationToken,
}

impl JobContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_id: &str,
        campaign_id: &str,
        model: ClipModel,
        options: &JobOptions,
        rates: HashMap<String, Decimal>,
        work_root: &str,
        output_dir: &str,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            campaign_id: campaign_id.to_string(),
            model,
            clip_duration_seconds: options
                .clip_duration_seconds
                .unwrap_or(DEFAULT_CLIP_SECONDS),
            max_scenes: options.max_scenes,
            music_prompt: options
                .music_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_MUSIC_PROMPT.to_string()),
            max_concurrent_clips: options.max_concurrent_clips,
            max_clip_attempts: options
                .max_clip_attempts
                .unwrap_or(DEFAULT_MAX_CLIP_ATTEMPTS),
            fade_in_seconds: DEFAULT_FADE_IN_SECONDS,
            fade_out_seconds: DEFAULT_FADE_OUT_SECONDS,
            work_dir: PathBuf::from(work_root).join(job_id),
            output_dir: PathBuf::from(output_dir),
            rates,
            cancel,
        }
    }

    /// Path of a scratch file inside this job's work directory.
    pub fn work_file(&self, name: &str) -> String {
        self.work_dir.join(name).to_string_lossy().into_owned()
    }

    pub fn output_file(&self, name: &str) -> String {
        self.output_dir.join(name).to_string_lossy().into_owned()
    }
}

/// One selected pair, in playback order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedPair {
    pub pair_id: String,
    pub first_asset_id: String,
    pub second_asset_id: String,
    pub scene_prompt: Option<String>,
}

/// Output of select_pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionOutput {
    pub pairs: Vec<SelectedPair>,
}

/// Output of create_clip_jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipJobsOutput {
    pub total: usize,
    pub inserted: u64,
}

/// Output of generate_clips: sequence numbers of the clips that made it
/// and of the ones that did not, both ascending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateClipsOutput {
    pub total: usize,
    pub succeeded: Vec<i32>,
    pub failed: Vec<i32>,
}

/// One generated music segment. Segment k is conditioned on segment k-1;
/// continued_from records the parent segment's rendered file, None for the
/// first segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSegment {
    pub index: usize,
    pub duration_seconds: f64,
    pub provider_id: String,
    pub location: String,
    pub continued_from: Option<String>,
}

/// Output of build_soundtrack. `track` is None when audio generation failed
/// or no music provider is configured; the job still completes without audio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoundtrackOutput {
    pub track: Option<String>,
    pub duration_seconds: f64,
    pub segments: Vec<AudioSegment>,
    pub cost: Decimal,
    pub reason: Option<String>,
}

/// Output of concat_clips.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcatOutput {
    pub video: String,
    pub clip_count: usize,
}

/// Output of merge_audio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOutput {
    pub video: String,
    pub has_audio: bool,
}

/// Output of store_output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreOutput {
    pub location: String,
    pub total_cost: Decimal,
    pub failed_clip_count: i32,
}
