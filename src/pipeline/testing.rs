// In-memory stores and scripted providers shared by the pipeline tests.
use crate::assets::AssetResolver;
use crate::media::MediaTools;
use crate::models::{ClipJob, ClipJobStatus, ClipModel, ImagePair, JobStatus, VideoJob};
use crate::pipeline::checkpoint::{CheckpointStore, TaskCheckpoint, TaskStatus};
use crate::pipeline::error::PipelineError;
use crate::pipeline::state::{JobContext, JobOptions, PipelineResources};
use crate::pipeline::store::JobStore;
use crate::providers::{
    ClipGeneration, ClipRequest, GenerationError, GenerationOutput, MusicGeneration, MusicOutput,
    MusicRequest,
};
use crate::services::pricing;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Checkpoint store backed by a Vec, mirroring the first-write-wins
/// semantics of the Postgres implementation.
#[derive(Default)]
pub struct MemCheckpoints {
    rows: Mutex<Vec<TaskCheckpoint>>,
    completions: Mutex<Vec<String>>,
}

impl MemCheckpoints {
    /// How many times a completion for this task was actually recorded.
    pub fn completion_count(&self, task_name: &str) -> usize {
        self.completions
            .lock()
            .unwrap()
            .iter()
            .filter(|name| name.as_str() == task_name)
            .count()
    }

    fn with_row<F: FnOnce(&mut TaskCheckpoint)>(&self, job_id: &str, task_name: &str, f: F) {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows
            .iter_mut()
            .find(|r| r.job_id == job_id && r.task_name == task_name)
        {
            f(row);
        } else {
            let mut row = TaskCheckpoint {
                job_id: job_id.to_string(),
                task_name: task_name.to_string(),
                status: TaskStatus::Pending,
                output: None,
                error: None,
                started_at: None,
                completed_at: None,
                updated_at: Utc::now(),
            };
            f(&mut row);
            rows.push(row);
        }
    }
}

#[async_trait]
impl CheckpointStore for MemCheckpoints {
    async fn exists(&self, job_id: &str, task_name: &str) -> Result<bool, PipelineError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .any(|r| {
                r.job_id == job_id
                    && r.task_name == task_name
                    && r.status == TaskStatus::Completed
            }))
    }

    async fn complete(
        &self,
        job_id: &str,
        task_name: &str,
        output: &serde_json::Value,
    ) -> Result<(), PipelineError> {
        let mut recorded = false;
        self.with_row(job_id, task_name, |row| {
            if row.status != TaskStatus::Completed {
                row.status = TaskStatus::Completed;
                row.output = Some(output.clone());
                row.error = None;
                row.completed_at = Some(Utc::now());
                row.updated_at = Utc::now();
                recorded = true;
            }
        });
        if recorded {
            self.completions.lock().unwrap().push(task_name.to_string());
        }
        Ok(())
    }

    async fn get_output(
        &self,
        job_id: &str,
        task_name: &str,
    ) -> Result<Option<serde_json::Value>, PipelineError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| {
                r.job_id == job_id
                    && r.task_name == task_name
                    && r.status == TaskStatus::Completed
            })
            .and_then(|r| r.output.clone()))
    }

    async fn mark_running(&self, job_id: &str, task_name: &str) -> Result<(), PipelineError> {
        self.with_row(job_id, task_name, |row| {
            if row.status != TaskStatus::Completed {
                row.status = TaskStatus::Running;
                row.started_at = Some(Utc::now());
                row.updated_at = Utc::now();
            }
        });
        Ok(())
    }

    async fn mark_failed(
        &self,
        job_id: &str,
        task_name: &str,
        error: &str,
    ) -> Result<(), PipelineError> {
        self.with_row(job_id, task_name, |row| {
            if row.status != TaskStatus::Completed {
                row.status = TaskStatus::Failed;
                row.error = Some(error.to_string());
                row.updated_at = Utc::now();
            }
        });
        Ok(())
    }

    async fn mark_cancelled(&self, job_id: &str, task_name: &str) -> Result<(), PipelineError> {
        self.with_row(job_id, task_name, |row| {
            if row.status != TaskStatus::Completed {
                row.status = TaskStatus::Cancelled;
                row.updated_at = Utc::now();
            }
        });
        Ok(())
    }

    async fn list_for_job(&self, job_id: &str) -> Result<Vec<TaskCheckpoint>, PipelineError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn reset_failed(&self, job_id: &str) -> Result<u64, PipelineError> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| {
            r.job_id != job_id
                || !matches!(r.status, TaskStatus::Failed | TaskStatus::Cancelled)
        });
        Ok((before - rows.len()) as u64)
    }
}

/// Job store backed by hash maps, guard clauses matching the SQL ones.
#[derive(Default)]
pub struct MemJobStore {
    jobs: Mutex<HashMap<String, VideoJob>>,
    clips: Mutex<Vec<ClipJob>>,
    pairs: Mutex<Vec<ImagePair>>,
}

impl MemJobStore {
    pub fn put_job(&self, job: VideoJob) {
        self.jobs.lock().unwrap().insert(job.id.clone(), job);
    }

    pub fn put_clip(&self, clip: ClipJob) {
        self.clips.lock().unwrap().push(clip);
    }

    pub fn put_pair(&self, pair: ImagePair) {
        self.pairs.lock().unwrap().push(pair);
    }

    pub fn job_snapshot(&self, job_id: &str) -> Option<VideoJob> {
        self.jobs.lock().unwrap().get(job_id).cloned()
    }

    pub fn clips_snapshot(&self, job_id: &str) -> Vec<ClipJob> {
        let mut clips: Vec<ClipJob> = self
            .clips
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.job_id == job_id)
            .cloned()
            .collect();
        clips.sort_by_key(|c| c.sequence_number);
        clips
    }

    fn with_clip<F: FnOnce(&mut ClipJob)>(&self, clip_id: &str, f: F) {
        let mut clips = self.clips.lock().unwrap();
        if let Some(clip) = clips.iter_mut().find(|c| c.id == clip_id) {
            f(clip);
            clip.updated_at = Utc::now();
        }
    }
}

#[async_trait]
impl JobStore for MemJobStore {
    // The two calls a start makes before it spawns yield once, like their
    // sqlx counterparts suspend on the wire. Interleavings that only show
    // up against a real database show up here too.
    async fn get_job(&self, job_id: &str) -> Result<Option<VideoJob>, PipelineError> {
        tokio::task::yield_now().await;
        Ok(self.jobs.lock().unwrap().get(job_id).cloned())
    }

    async fn insert_job(&self, job: &VideoJob) -> Result<(), PipelineError> {
        tokio::task::yield_now().await;
        self.jobs
            .lock()
            .unwrap()
            .entry(job.id.clone())
            .or_insert_with(|| job.clone());
        Ok(())
    }

    async fn set_job_status(&self, job_id: &str, status: JobStatus) -> Result<(), PipelineError> {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(job_id) {
            if job.status != JobStatus::Completed {
                job.status = status;
                job.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn fail_job(&self, job_id: &str, error: &str) -> Result<(), PipelineError> {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(job_id) {
            if job.status != JobStatus::Completed {
                job.status = JobStatus::Failed;
                job.error = Some(error.to_string());
                job.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn complete_job(
        &self,
        job_id: &str,
        output_location: &str,
        total_cost: Decimal,
        failed_clip_count: i32,
    ) -> Result<(), PipelineError> {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(job_id) {
            job.status = JobStatus::Completed;
            job.output_location = Some(output_location.to_string());
            job.total_cost = Some(total_cost);
            job.failed_clip_count = failed_clip_count;
            job.error = None;
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn reset_job_for_retry(&self, job_id: &str) -> Result<bool, PipelineError> {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(job_id) {
            if matches!(job.status, JobStatus::Failed | JobStatus::Cancelled) {
                job.status = JobStatus::Created;
                job.error = None;
                job.updated_at = Utc::now();
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn insert_clip_jobs(&self, new_clips: &[ClipJob]) -> Result<u64, PipelineError> {
        let mut clips = self.clips.lock().unwrap();
        let mut inserted = 0u64;
        for clip in new_clips {
            let exists = clips
                .iter()
                .any(|c| c.job_id == clip.job_id && c.sequence_number == clip.sequence_number);
            if !exists {
                clips.push(clip.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn list_clip_jobs(&self, job_id: &str) -> Result<Vec<ClipJob>, PipelineError> {
        Ok(self.clips_snapshot(job_id))
    }

    async fn mark_clip_submitted(
        &self,
        clip_id: &str,
        provider_task_id: &str,
        attempt_count: i32,
    ) -> Result<(), PipelineError> {
        self.with_clip(clip_id, |clip| {
            clip.status = ClipJobStatus::Submitted;
            clip.provider_task_id = Some(provider_task_id.to_string());
            clip.attempt_count = attempt_count;
            clip.error = None;
        });
        Ok(())
    }

    async fn mark_clip_polling(&self, clip_id: &str) -> Result<(), PipelineError> {
        self.with_clip(clip_id, |clip| clip.status = ClipJobStatus::Polling);
        Ok(())
    }

    async fn complete_clip(
        &self,
        clip_id: &str,
        clip_location: &str,
        cost: Decimal,
    ) -> Result<(), PipelineError> {
        self.with_clip(clip_id, |clip| {
            clip.status = ClipJobStatus::Succeeded;
            clip.clip_location = Some(clip_location.to_string());
            clip.cost = Some(cost);
            clip.error = None;
        });
        Ok(())
    }

    async fn fail_clip(&self, clip_id: &str, error: &str) -> Result<(), PipelineError> {
        self.with_clip(clip_id, |clip| {
            clip.status = ClipJobStatus::Failed;
            clip.error = Some(error.to_string());
        });
        Ok(())
    }

    async fn cancel_clip(&self, clip_id: &str) -> Result<(), PipelineError> {
        self.with_clip(clip_id, |clip| clip.status = ClipJobStatus::Cancelled);
        Ok(())
    }

    async fn reset_failed_clips(&self, job_id: &str) -> Result<u64, PipelineError> {
        let mut clips = self.clips.lock().unwrap();
        let mut reset = 0u64;
        for clip in clips.iter_mut() {
            if clip.job_id == job_id
                && matches!(clip.status, ClipJobStatus::Failed | ClipJobStatus::Cancelled)
            {
                clip.status = ClipJobStatus::Pending;
                clip.error = None;
                clip.provider_task_id = None;
                clip.attempt_count = 0;
                reset += 1;
            }
        }
        Ok(reset)
    }

    async fn list_pairs(&self, campaign_id: &str) -> Result<Vec<ImagePair>, PipelineError> {
        let mut pairs: Vec<ImagePair> = self
            .pairs
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.campaign_id == campaign_id)
            .cloned()
            .collect();
        pairs.sort_by_key(|p| p.position);
        Ok(pairs)
    }
}

/// Resolves every asset to a deterministic fake CDN URL.
#[derive(Default)]
pub struct FakeAssets {
    fail: Mutex<HashSet<String>>,
}

impl FakeAssets {
    pub fn fail_asset(&self, asset_id: &str) {
        self.fail.lock().unwrap().insert(asset_id.to_string());
    }
}

#[async_trait]
impl AssetResolver for FakeAssets {
    async fn resolve(&self, asset_id: &str) -> Result<String, String> {
        if self.fail.lock().unwrap().contains(asset_id) {
            return Err(format!("No signed URL for {}", asset_id));
        }
        Ok(format!("https://cdn.test/{}", asset_id))
    }
}

#[derive(Clone)]
struct SubmittedClip {
    first_frame_url: String,
    duration_seconds: f64,
}

#[derive(Default)]
struct ClipScript {
    fail_first_frames: HashSet<String>,
    delays_ms: HashMap<String, u64>,
    always_transient: bool,
    transient_remaining: HashMap<String, usize>,
    tasks: HashMap<String, SubmittedClip>,
    submitted: Vec<String>,
}

/// Scripted clip provider. Failures and delays are keyed on the first-frame
/// URL so tests can target one clip out of a batch.
#[derive(Default)]
pub struct FakeClips {
    script: Mutex<ClipScript>,
    counter: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakeClips {
    /// The provider rejects this clip definitively at submit.
    pub fn fail_first_frame(&self, url: &str) {
        self.script
            .lock()
            .unwrap()
            .fail_first_frames
            .insert(url.to_string());
    }

    pub fn delay_first_frame(&self, url: &str, millis: u64) {
        self.script
            .lock()
            .unwrap()
            .delays_ms
            .insert(url.to_string(), millis);
    }

    /// Every generation times out transiently until switched off again.
    pub fn set_always_transient(&self, on: bool) {
        self.script.lock().unwrap().always_transient = on;
    }

    /// The next `times` generations of this clip time out transiently,
    /// after which it renders normally.
    pub fn fail_transiently(&self, url: &str, times: usize) {
        self.script
            .lock()
            .unwrap()
            .transient_remaining
            .insert(url.to_string(), times);
    }

    pub fn submit_count(&self) -> usize {
        self.script.lock().unwrap().submitted.len()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClipGeneration for FakeClips {
    async fn submit(
        &self,
        _model: ClipModel,
        request: &ClipRequest,
    ) -> Result<String, GenerationError> {
        let mut script = self.script.lock().unwrap();
        script.submitted.push(request.first_frame_url.clone());
        if script.fail_first_frames.contains(&request.first_frame_url) {
            return Err(GenerationError::Failed(format!(
                "Provider rejected {}",
                request.first_frame_url
            )));
        }
        let id = format!("task-{}", self.counter.fetch_add(1, Ordering::SeqCst));
        script.tasks.insert(
            id.clone(),
            SubmittedClip {
                first_frame_url: request.first_frame_url.clone(),
                duration_seconds: request.duration_seconds,
            },
        );
        Ok(id)
    }

    async fn await_result(
        &self,
        _model: ClipModel,
        provider_task_id: &str,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutput, GenerationError> {
        let (duration, delay, transient) = {
            let mut script = self.script.lock().unwrap();
            let task = script.tasks.get(provider_task_id).cloned().ok_or_else(|| {
                GenerationError::Failed(format!("Unknown task {}", provider_task_id))
            })?;
            let delay = script
                .delays_ms
                .get(&task.first_frame_url)
                .copied()
                .unwrap_or(5);
            let mut transient = script.always_transient;
            if let Some(remaining) = script.transient_remaining.get_mut(&task.first_frame_url) {
                if *remaining > 0 {
                    *remaining -= 1;
                    transient = true;
                }
            }
            (task.duration_seconds, delay, transient)
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(GenerationError::Cancelled),
            _ = tokio::time::sleep(std::time::Duration::from_millis(delay)) => {
                if transient {
                    Err(GenerationError::Transient(
                        "scripted generation timeout".to_string(),
                    ))
                } else {
                    Ok(GenerationOutput {
                        output_url: format!("https://clips.test/{}.mp4", provider_task_id),
                        duration_seconds: Some(duration),
                    })
                }
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn fetch(&self, _url: &str, dest: &str) -> Result<(), GenerationError> {
        write_stub_file(dest).map_err(GenerationError::Failed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedMusicRequest {
    pub prompt: String,
    pub duration_seconds: f64,
    pub continuation_of: Option<String>,
}

/// Scripted music provider recording every segment request.
#[derive(Default)]
pub struct FakeMusic {
    requests: Mutex<Vec<RecordedMusicRequest>>,
    fail_at: Mutex<Option<usize>>,
    counter: AtomicUsize,
}

impl FakeMusic {
    pub fn requests(&self) -> Vec<RecordedMusicRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// The nth segment request (zero-based) fails definitively.
    pub fn fail_at_segment(&self, index: usize) {
        *self.fail_at.lock().unwrap() = Some(index);
    }
}

#[async_trait]
impl MusicGeneration for FakeMusic {
    async fn generate(
        &self,
        request: &MusicRequest,
        dest: &str,
        cancel: &CancellationToken,
    ) -> Result<MusicOutput, GenerationError> {
        if cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }
        let index = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(RecordedMusicRequest {
                prompt: request.prompt.clone(),
                duration_seconds: request.duration_seconds,
                continuation_of: request.continuation_of.clone(),
            });
            requests.len() - 1
        };
        if *self.fail_at.lock().unwrap() == Some(index) {
            return Err(GenerationError::Failed(
                "scripted segment failure".to_string(),
            ));
        }
        write_stub_file(dest).map_err(GenerationError::Failed)?;
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(MusicOutput {
            file_path: dest.to_string(),
            provider_id: format!("gen-{}", n),
            duration_seconds: Some(request.duration_seconds),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaCall {
    ConcatVideos { inputs: Vec<String>, output: String },
    ConcatAudio { inputs: Vec<String>, output: String },
    Fade { input: String, output: String },
    Mux { video: String, audio: String, output: String },
}

/// Records media operations and writes stub output files so downstream
/// filesystem checks see something real.
#[derive(Default)]
pub struct FakeMedia {
    calls: Mutex<Vec<MediaCall>>,
    durations: Mutex<HashMap<String, f64>>,
    concat_videos_broken: AtomicBool,
}

impl FakeMedia {
    pub fn calls(&self) -> Vec<MediaCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_duration(&self, path: &str, seconds: f64) {
        self.durations
            .lock()
            .unwrap()
            .insert(path.to_string(), seconds);
    }

    pub fn fail_concat_videos(&self) {
        self.concat_videos_broken.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaTools for FakeMedia {
    async fn probe_duration(&self, path: &str) -> Result<f64, String> {
        Ok(self
            .durations
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or(20.0))
    }

    async fn concat_videos(&self, inputs: &[String], output: &str) -> Result<(), String> {
        if self.concat_videos_broken.load(Ordering::SeqCst) {
            return Err("scripted concat failure".to_string());
        }
        self.calls.lock().unwrap().push(MediaCall::ConcatVideos {
            inputs: inputs.to_vec(),
            output: output.to_string(),
        });
        write_stub_file(output)
    }

    async fn concat_audio(&self, inputs: &[String], output: &str) -> Result<(), String> {
        self.calls.lock().unwrap().push(MediaCall::ConcatAudio {
            inputs: inputs.to_vec(),
            output: output.to_string(),
        });
        write_stub_file(output)
    }

    async fn fade_audio(
        &self,
        input: &str,
        output: &str,
        _fade_in: f64,
        _fade_out: f64,
        _duration: f64,
    ) -> Result<(), String> {
        self.calls.lock().unwrap().push(MediaCall::Fade {
            input: input.to_string(),
            output: output.to_string(),
        });
        write_stub_file(output)
    }

    async fn mux_audio(&self, video: &str, audio: &str, output: &str) -> Result<(), String> {
        self.calls.lock().unwrap().push(MediaCall::Mux {
            video: video.to_string(),
            audio: audio.to_string(),
            output: output.to_string(),
        });
        write_stub_file(output)
    }
}

/// One bundle of fakes plus a scratch directory on disk. Tests seed it,
/// run pipeline code against `resources()`, and inspect the fakes after.
pub struct TestHarness {
    pub checkpoints: Arc<MemCheckpoints>,
    pub store: Arc<MemJobStore>,
    pub clips: Arc<FakeClips>,
    pub music: Arc<FakeMusic>,
    pub assets: Arc<FakeAssets>,
    pub media: Arc<FakeMedia>,
    pub root: PathBuf,
}

impl TestHarness {
    pub fn new(tag: &str) -> Self {
        let root = std::env::temp_dir()
            .join("promo_forge_tests")
            .join(format!("{}-{}", tag, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(root.join("work")).expect("create work dir");
        std::fs::create_dir_all(root.join("outputs")).expect("create output dir");
        Self {
            checkpoints: Arc::new(MemCheckpoints::default()),
            store: Arc::new(MemJobStore::default()),
            clips: Arc::new(FakeClips::default()),
            music: Arc::new(FakeMusic::default()),
            assets: Arc::new(FakeAssets::default()),
            media: Arc::new(FakeMedia::default()),
            root,
        }
    }

    pub fn resources(&self) -> PipelineResources {
        PipelineResources {
            checkpoints: self.checkpoints.clone(),
            store: self.store.clone(),
            clips: self.clips.clone(),
            music: Some(self.music.clone() as Arc<dyn MusicGeneration>),
            assets: self.assets.clone(),
            media: self.media.clone(),
        }
    }

    pub fn resources_without_music(&self) -> PipelineResources {
        let mut resources = self.resources();
        resources.music = None;
        resources
    }

    pub fn context(&self, job_id: &str, campaign_id: &str, options: &JobOptions) -> JobContext {
        let model = ClipModel::parse(options.model.as_deref().unwrap_or("kling-v1-6"))
            .expect("test model");
        JobContext::new(
            job_id,
            campaign_id,
            model,
            options,
            pricing::default_rates(),
            &self.root.join("work").to_string_lossy(),
            &self.root.join("outputs").to_string_lossy(),
            CancellationToken::new(),
        )
    }

    pub fn seed_job(&self, job_id: &str, campaign_id: &str) {
        let now = Utc::now();
        self.store.put_job(VideoJob {
            id: job_id.to_string(),
            campaign_id: campaign_id.to_string(),
            status: JobStatus::Created,
            output_location: None,
            total_cost: None,
            failed_clip_count: 0,
            error: None,
            created_at: now,
            updated_at: now,
        });
    }

    /// Pairs `pair-1..pair-n` at positions 1..n with assets `a{i}`/`b{i}`.
    pub fn seed_pairs(&self, campaign_id: &str, count: usize) {
        for i in 1..=count {
            self.store.put_pair(ImagePair {
                id: format!("pair-{}", i),
                campaign_id: campaign_id.to_string(),
                position: i as i32,
                first_asset_id: format!("a{}", i),
                second_asset_id: format!("b{}", i),
                score: 1.0 - i as f64 * 0.01,
                rationale: Some(format!("Scene {}", i)),
            });
        }
    }

    /// Fresh pending clip rows as create_clip_jobs would have written them.
    pub fn seed_pending_clips(&self, job_id: &str, count: usize) {
        for i in 1..=count {
            let now = Utc::now();
            self.store.put_clip(ClipJob {
                id: format!("{}-clip-{}", job_id, i),
                job_id: job_id.to_string(),
                sequence_number: i as i32,
                first_asset_id: format!("a{}", i),
                second_asset_id: format!("b{}", i),
                model: ClipModel::KlingV16,
                duration_seconds: 4.0,
                scene_prompt: Some(format!("Scene {}", i)),
                status: ClipJobStatus::Pending,
                clip_location: None,
                provider_task_id: None,
                cost: None,
                attempt_count: 0,
                error: None,
                created_at: now,
                updated_at: now,
            });
        }
    }

    /// Clip rows as a finished earlier run would have left them.
    pub fn seed_succeeded_clips(&self, job_id: &str, clips: &[(i32, f64)]) {
        let rates = pricing::default_rates();
        for (seq, duration) in clips {
            let now = Utc::now();
            self.store.put_clip(ClipJob {
                id: format!("{}-clip-{}", job_id, seq),
                job_id: job_id.to_string(),
                sequence_number: *seq,
                first_asset_id: format!("a{}", seq),
                second_asset_id: format!("b{}", seq),
                model: ClipModel::KlingV16,
                duration_seconds: *duration,
                scene_prompt: None,
                status: ClipJobStatus::Succeeded,
                clip_location: Some(format!("clips/{}_{:03}.mp4", job_id, seq)),
                provider_task_id: Some(format!("task-seed-{}", seq)),
                cost: Some(pricing::cost_for(&rates, "kling-v1-6", *duration)),
                attempt_count: 1,
                error: None,
                created_at: now,
                updated_at: now,
            });
        }
    }

    pub fn seed_failed_clip(&self, job_id: &str, sequence_number: i32) {
        let now = Utc::now();
        self.store.put_clip(ClipJob {
            id: format!("{}-clip-{}", job_id, sequence_number),
            job_id: job_id.to_string(),
            sequence_number,
            first_asset_id: format!("a{}", sequence_number),
            second_asset_id: format!("b{}", sequence_number),
            model: ClipModel::KlingV16,
            duration_seconds: 4.0,
            scene_prompt: None,
            status: ClipJobStatus::Failed,
            clip_location: None,
            provider_task_id: None,
            cost: None,
            attempt_count: 3,
            error: Some("scripted failure".to_string()),
            created_at: now,
            updated_at: now,
        });
    }

    pub async fn complete(&self, job_id: &str, task_name: &str, output: serde_json::Value) {
        self.checkpoints
            .complete(job_id, task_name, &output)
            .await
            .expect("in-memory checkpoint");
    }

    pub fn write_stub(&self, path: &str) {
        write_stub_file(path).expect("write stub");
    }

    pub fn cleanup(&self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

fn write_stub_file(path: &str) -> Result<(), String> {
    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
    }
    std::fs::write(path, b"stub").map_err(|e| format!("Failed to write {}: {}", path.display(), e))
}
