// src/kling_client.rs
// Kling image-to-video API client (start frame + end frame interpolation)

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::providers::{
    ClipGenerator, ClipRequest, GenerationError, GenerationPoll, GenerationTask,
    GenerationTaskStatus,
};

#[derive(Clone)]
pub struct KlingClient {
    api_key: String,
    client: Client,
    base_url: String,
}

// ============================================================================
// API REQUEST/RESPONSE STRUCTURES
// ============================================================================

#[derive(Serialize, Debug)]
pub struct Image2VideoRequest {
    pub model_name: String,
    pub image: String,      // first frame URL
    pub image_tail: String, // last frame URL
    pub duration: String,   // seconds, as a string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct KlingResponse<T> {
    pub code: i64,
    pub message: String,
    pub data: Option<T>,
}

#[derive(Deserialize, Debug)]
pub struct TaskData {
    pub task_id: String,
    pub task_status: String, // "submitted", "processing", "succeed", "failed"
    #[serde(default)]
    pub task_status_msg: Option<String>,
    #[serde(default)]
    pub task_result: Option<TaskResult>,
}

#[derive(Deserialize, Debug)]
pub struct TaskResult {
    pub videos: Vec<TaskVideo>,
}

#[derive(Deserialize, Debug)]
pub struct TaskVideo {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub duration: Option<String>, // seconds, as a string
}

// ============================================================================
// IMPLEMENTATION
// ============================================================================

impl KlingClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: Client::new(),
            base_url: "https://api.klingai.com".to_string(),
        }
    }

    /// Create an image-to-video task (Step 1). Transient HTTP failures are
    /// retried with exponential backoff; API rejections are permanent.
    pub async fn create_image2video_task(
        &self,
        request_body: &Image2VideoRequest,
    ) -> Result<String, GenerationError> {
        let url = format!("{}/v1/videos/image2video", self.base_url);

        let backoff_config = ExponentialBackoff {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(60)),
            ..Default::default()
        };

        let operation = || async {
            let response = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(request_body)
                .send()
                .await
                .map_err(|e| {
                    if e.is_connect() || e.is_timeout() {
                        tracing::warn!("Kling API connection error (retrying): {}", e);
                        backoff::Error::transient(GenerationError::Transient(format!(
                            "Connection error: {}",
                            e
                        )))
                    } else {
                        tracing::error!("Kling API permanent error: {}", e);
                        backoff::Error::permanent(GenerationError::Failed(format!(
                            "Request error: {}",
                            e
                        )))
                    }
                })?;

            let status = response.status();
            let response_text = response.text().await.map_err(|e| {
                backoff::Error::permanent(GenerationError::Failed(format!(
                    "Failed to read response: {}",
                    e
                )))
            })?;

            // Retry on 503, 502, 429 (rate limit), 500 errors
            if status.as_u16() == 503
                || status.as_u16() == 502
                || status.as_u16() == 429
                || status.as_u16() == 500
            {
                tracing::warn!("Kling API returned {} (retrying): {}", status, response_text);
                return Err(backoff::Error::transient(GenerationError::Transient(
                    format!("API error ({}): {}", status, response_text),
                )));
            }

            if !status.is_success() {
                tracing::error!("Kling API permanent error ({}): {}", status, response_text);
                return Err(backoff::Error::permanent(GenerationError::Failed(format!(
                    "API error ({}): {}",
                    status, response_text
                ))));
            }

            let parsed: KlingResponse<TaskData> =
                serde_json::from_str(&response_text).map_err(|e| {
                    backoff::Error::permanent(GenerationError::Failed(format!(
                        "Failed to parse response: {}",
                        e
                    )))
                })?;

            if parsed.code != 0 {
                return Err(backoff::Error::permanent(GenerationError::Failed(format!(
                    "Kling rejected the task ({}): {}",
                    parsed.code, parsed.message
                ))));
            }

            let data = parsed.data.ok_or_else(|| {
                backoff::Error::permanent(GenerationError::Failed(
                    "Kling response missing task data".to_string(),
                ))
            })?;

            Ok(data.task_id)
        };

        retry(backoff_config, operation).await
    }

    /// Check task status (Step 2: poll for the result).
    pub async fn get_task_status(&self, task_id: &str) -> Result<TaskData, GenerationError> {
        let url = format!("{}/v1/videos/image2video/{}", self.base_url, task_id);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| GenerationError::Transient(format!("Connection error: {}", e)))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| GenerationError::Transient(format!("Failed to read response: {}", e)))?;

        if status.is_server_error() || status.as_u16() == 429 {
            return Err(GenerationError::Transient(format!(
                "API error ({}): {}",
                status, response_text
            )));
        }
        if !status.is_success() {
            return Err(GenerationError::Failed(format!(
                "API error ({}): {}",
                status, response_text
            )));
        }

        let parsed: KlingResponse<TaskData> = serde_json::from_str(&response_text)
            .map_err(|e| GenerationError::Failed(format!("Failed to parse response: {}", e)))?;

        if parsed.code != 0 {
            return Err(GenerationError::Failed(format!(
                "Kling status error ({}): {}",
                parsed.code, parsed.message
            )));
        }

        parsed
            .data
            .ok_or_else(|| GenerationError::Failed("Kling response missing task data".to_string()))
    }
}

fn map_task_status(task_status: &str) -> GenerationTaskStatus {
    match task_status {
        "submitted" => GenerationTaskStatus::Pending,
        "processing" => GenerationTaskStatus::Processing,
        "succeed" => GenerationTaskStatus::Succeeded,
        "failed" => GenerationTaskStatus::Failed,
        // Unknown states keep the poll loop waiting; the deadline bounds it.
        _ => GenerationTaskStatus::Processing,
    }
}

#[async_trait]
impl GenerationTask for KlingClient {
    async fn poll(&self, provider_task_id: &str) -> Result<GenerationPoll, GenerationError> {
        let data = self.get_task_status(provider_task_id).await?;
        let video = data.task_result.as_ref().and_then(|r| r.videos.first());

        Ok(GenerationPoll {
            status: map_task_status(&data.task_status),
            output_url: video.map(|v| v.url.clone()),
            duration_seconds: video.and_then(|v| v.duration.as_deref()).and_then(|d| d.parse().ok()),
            error: data.task_status_msg,
        })
    }

    async fn cancel(&self, _provider_task_id: &str) -> Result<bool, GenerationError> {
        // Kling exposes no cancellation endpoint; in-flight tasks run out.
        Ok(false)
    }
}

#[async_trait]
impl ClipGenerator for KlingClient {
    async fn submit(&self, request: &ClipRequest) -> Result<String, GenerationError> {
        let request_body = Image2VideoRequest {
            model_name: "kling-v1-6".to_string(),
            image: request.first_frame_url.clone(),
            image_tail: request.last_frame_url.clone(),
            duration: format!("{}", request.duration_seconds.round() as u32),
            prompt: request.prompt.clone(),
            mode: Some("pro".to_string()),
        };

        let task_id = self.create_image2video_task(&request_body).await?;
        tracing::info!("🎬 Kling task created: {}", task_id);
        Ok(task_id)
    }
}
