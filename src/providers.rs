// src/providers.rs
// Uniform submit/poll/cancel surface over the external generation providers,
// plus the suspend-until-ready adapters that own the poll-sleep loop.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::models::ClipModel;

#[derive(Error, Debug, Clone)]
pub enum GenerationError {
    #[error("Transient provider error: {0}")]
    Transient(String),
    #[error("Generation failed: {0}")]
    Failed(String),
    #[error("Generation cancelled")]
    Cancelled,
}

/// Where an external generation task currently stands, normalized across
/// providers (each maps its own status strings onto these).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenerationTaskStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct GenerationPoll {
    pub status: GenerationTaskStatus,
    pub output_url: Option<String>,
    pub duration_seconds: Option<f64>,
    pub error: Option<String>,
}

/// One clip generation request: animate from the first still to the second.
#[derive(Debug, Clone)]
pub struct ClipRequest {
    pub first_frame_url: String,
    pub last_frame_url: String,
    pub duration_seconds: f64,
    pub prompt: Option<String>,
}

/// One music segment request. `continuation_of` carries the provider id of
/// the previous segment so the new one picks up where it left off.
#[derive(Debug, Clone)]
pub struct MusicRequest {
    pub prompt: String,
    pub duration_seconds: f64,
    pub continuation_of: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub output_url: String,
    pub duration_seconds: Option<f64>,
}

/// Poll/cancel surface shared by every long-running provider task.
#[async_trait]
pub trait GenerationTask: Send + Sync {
    async fn poll(&self, provider_task_id: &str) -> Result<GenerationPoll, GenerationError>;

    /// Best-effort provider-side cancellation. Returns whether the provider
    /// accepted the request; providers without a cancel endpoint return
    /// Ok(false).
    async fn cancel(&self, provider_task_id: &str) -> Result<bool, GenerationError>;
}

/// One external image-to-video provider.
#[async_trait]
pub trait ClipGenerator: GenerationTask {
    async fn submit(&self, request: &ClipRequest) -> Result<String, GenerationError>;
}

/// The music generation provider.
#[async_trait]
pub trait MusicGenerator: GenerationTask {
    async fn submit(&self, request: &MusicRequest) -> Result<String, GenerationError>;
}

#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub deadline: Duration,
}

impl PollConfig {
    pub fn clips() -> Self {
        Self {
            interval: Duration::from_secs(10),
            deadline: Duration::from_secs(900),
        }
    }

    pub fn music() -> Self {
        Self {
            interval: Duration::from_secs(5),
            deadline: Duration::from_secs(600),
        }
    }
}

/// Wait for a submitted provider task to settle: poll on a fixed interval,
/// observe cancellation between polls, and give up at the deadline. This is
/// the only poll-sleep loop in the crate; both clip and music generation go
/// through it.
///
/// Transient poll errors do not abort the wait (the task may well still be
/// running provider-side); the deadline bounds how long we keep trying.
pub async fn await_settled<T: GenerationTask + ?Sized>(
    task: &T,
    provider_task_id: &str,
    poll: PollConfig,
    cancel: &CancellationToken,
) -> Result<GenerationOutput, GenerationError> {
    let started = tokio::time::Instant::now();

    loop {
        if cancel.is_cancelled() {
            let _ = task.cancel(provider_task_id).await;
            return Err(GenerationError::Cancelled);
        }

        match task.poll(provider_task_id).await {
            Ok(state) => match state.status {
                GenerationTaskStatus::Succeeded => {
                    let output_url = state.output_url.ok_or_else(|| {
                        GenerationError::Failed(
                            "Provider reported success without an output URL".to_string(),
                        )
                    })?;
                    return Ok(GenerationOutput {
                        output_url,
                        duration_seconds: state.duration_seconds,
                    });
                }
                GenerationTaskStatus::Failed => {
                    return Err(GenerationError::Failed(state.error.unwrap_or_else(|| {
                        "Provider reported failure without details".to_string()
                    })));
                }
                GenerationTaskStatus::Cancelled => return Err(GenerationError::Cancelled),
                GenerationTaskStatus::Pending | GenerationTaskStatus::Processing => {}
            },
            Err(GenerationError::Transient(e)) => {
                tracing::warn!("Poll failed for task {} (still waiting): {}", provider_task_id, e);
            }
            Err(e) => return Err(e),
        }

        if started.elapsed() >= poll.deadline {
            let _ = task.cancel(provider_task_id).await;
            return Err(GenerationError::Transient(format!(
                "Timed out after {}s waiting for task {}",
                poll.deadline.as_secs(),
                provider_task_id
            )));
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = task.cancel(provider_task_id).await;
                return Err(GenerationError::Cancelled);
            }
            _ = tokio::time::sleep(poll.interval) => {}
        }
    }
}

/// Download a provider output to a local file.
pub async fn download_file(
    client: &reqwest::Client,
    url: &str,
    dest: &str,
) -> Result<(), GenerationError> {
    tracing::info!("⬇️ Downloading {} -> {}", url, dest);

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_connect() || e.is_timeout() {
            GenerationError::Transient(format!("Download connection error: {}", e))
        } else {
            GenerationError::Failed(format!("Download request error: {}", e))
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(GenerationError::Transient(format!(
                "Download failed with status {}",
                status
            )));
        }
        return Err(GenerationError::Failed(format!(
            "Download failed with status {}",
            status
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| GenerationError::Transient(format!("Failed to read download body: {}", e)))?;

    if let Some(parent) = std::path::Path::new(dest).parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| GenerationError::Failed(format!("Failed to create directory: {}", e)))?;
    }

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| GenerationError::Failed(format!("Failed to create {}: {}", dest, e)))?;
    file.write_all(&bytes)
        .await
        .map_err(|e| GenerationError::Failed(format!("Failed to write {}: {}", dest, e)))?;
    file.flush()
        .await
        .map_err(|e| GenerationError::Failed(format!("Failed to flush {}: {}", dest, e)))?;

    tracing::info!("✅ Downloaded {} bytes to {}", bytes.len(), dest);
    Ok(())
}

/// Generation client seam the clip renderer drives. Split into submit /
/// await / fetch so the renderer can persist the provider task id and its
/// own state transitions between the steps.
#[async_trait]
pub trait ClipGeneration: Send + Sync {
    async fn submit(
        &self,
        model: ClipModel,
        request: &ClipRequest,
    ) -> Result<String, GenerationError>;

    async fn await_result(
        &self,
        model: ClipModel,
        provider_task_id: &str,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutput, GenerationError>;

    async fn fetch(&self, url: &str, dest: &str) -> Result<(), GenerationError>;
}

/// Generation client seam the audio track builder drives. Music segments
/// have no per-segment database row, so a single one-shot operation is
/// enough.
#[async_trait]
pub trait MusicGeneration: Send + Sync {
    async fn generate(
        &self,
        request: &MusicRequest,
        dest: &str,
        cancel: &CancellationToken,
    ) -> Result<MusicOutput, GenerationError>;
}

#[derive(Debug, Clone)]
pub struct MusicOutput {
    pub file_path: String,
    pub provider_id: String,
    pub duration_seconds: Option<f64>,
}

/// Routes clip requests to the configured provider for the requested model.
/// Models whose provider is not configured fail definitively at submit.
pub struct ClipClient {
    kling: Option<Arc<dyn ClipGenerator>>,
    luma: Option<Arc<dyn ClipGenerator>>,
    poll: PollConfig,
    http: reqwest::Client,
}

impl ClipClient {
    pub fn new(
        kling: Option<Arc<dyn ClipGenerator>>,
        luma: Option<Arc<dyn ClipGenerator>>,
    ) -> Self {
        Self {
            kling,
            luma,
            poll: PollConfig::clips(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn has_provider(&self, model: ClipModel) -> bool {
        self.generator(model).is_ok()
    }

    fn generator(&self, model: ClipModel) -> Result<&Arc<dyn ClipGenerator>, GenerationError> {
        let slot = match model {
            ClipModel::KlingV16 => &self.kling,
            ClipModel::LumaRay2 => &self.luma,
        };
        slot.as_ref().ok_or_else(|| {
            GenerationError::Failed(format!(
                "No provider configured for model {}",
                model.as_str()
            ))
        })
    }
}

#[async_trait]
impl ClipGeneration for ClipClient {
    async fn submit(
        &self,
        model: ClipModel,
        request: &ClipRequest,
    ) -> Result<String, GenerationError> {
        self.generator(model)?.submit(request).await
    }

    async fn await_result(
        &self,
        model: ClipModel,
        provider_task_id: &str,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutput, GenerationError> {
        let generator = self.generator(model)?;
        await_settled(generator.as_ref(), provider_task_id, self.poll, cancel).await
    }

    async fn fetch(&self, url: &str, dest: &str) -> Result<(), GenerationError> {
        download_file(&self.http, url, dest).await
    }
}

/// Suspend-until-ready adapter over the music provider: submit, wait for
/// the segment to settle, download it.
pub struct MusicClient {
    generator: Arc<dyn MusicGenerator>,
    poll: PollConfig,
    http: reqwest::Client,
}

impl MusicClient {
    pub fn new(generator: Arc<dyn MusicGenerator>) -> Self {
        Self {
            generator,
            poll: PollConfig::music(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }
}

#[async_trait]
impl MusicGeneration for MusicClient {
    async fn generate(
        &self,
        request: &MusicRequest,
        dest: &str,
        cancel: &CancellationToken,
    ) -> Result<MusicOutput, GenerationError> {
        let provider_id = self.generator.submit(request).await?;
        tracing::info!("🎵 Music segment submitted: {}", provider_id);

        let output =
            await_settled(self.generator.as_ref(), &provider_id, self.poll, cancel).await?;
        download_file(&self.http, &output.output_url, dest).await?;

        Ok(MusicOutput {
            file_path: dest.to_string(),
            provider_id,
            duration_seconds: output.duration_seconds,
        })
    }
}
