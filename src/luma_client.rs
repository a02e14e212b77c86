// src/luma_client.rs
// Luma Dream Machine API client (keyframe-driven image-to-video)

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
pub struct LumaClient {
    api_key: String,
    client: Client,
    base_url: String,
}

// ============================================================================
// API REQUEST/RESPONSE STRUCTURES
// ============================================================================

#[derive(Serialize, Debug)]
pub struct GenerationRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub keyframes: Keyframes,
    pub duration: String, // e.g. "4s"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct Keyframes {
    pub frame0: Keyframe,
    pub frame1: Keyframe,
}

#[derive(Serialize, Debug)]
pub struct Keyframe {
    #[serde(rename = "type")]
    pub kind: String, // "image"
    pub url: String,
}

#[derive(Deserialize, Debug)]
pub struct Generation {
    pub id: String,
    pub state: String, // "queued", "dreaming", "completed", "failed"
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub assets: Option<GenerationAssets>,
}

#[derive(Deserialize, Debug)]
pub struct GenerationAssets {
    #[serde(default)]
    pub video: Option<String>,
}

// ============================================================================
// IMPLEMENTATION
// ============================================================================

impl LumaClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: Client::new(),
            base_url: "https://api.lumalabs.ai".to_string(),
        }
    }

    /// Create a generation (Step 1). Transient HTTP failures are retried
    /// with exponential backoff; API rejections are permanent.
    pub async fn create_generation(
        &self,
        request_body: &GenerationRequest,
    ) -> Result<String, GenerationError> {
        let url = format!("{}/dream-machine/v1/generations", self.base_url);

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
                        tracing::warn!("Luma API connection error (retrying): {}", e);
                        backoff::Error::transient(GenerationError::Transient(format!(
                            "Connection error: {}",
                            e
                        )))
                    } else {
                        tracing::error!("Luma API permanent error: {}", e);
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
                tracing::warn!("Luma API returned {} (retrying): {}", status, response_text);
                return Err(backoff::Error::transient(GenerationError::Transient(
                    format!("API error ({}): {}", status, response_text),
                )));
            }

            if !status.is_success() {
                tracing::error!("Luma API permanent error ({}): {}", status, response_text);
                return Err(backoff::Error::permanent(GenerationError::Failed(format!(
                    "API error ({}): {}",
                    status, response_text
                ))));
            }

            let generation: Generation = serde_json::from_str(&response_text).map_err(|e| {
                backoff::Error::permanent(GenerationError::Failed(format!(
                    "Failed to parse response: {}",
                    e
                )))
            })?;

            Ok(generation.id)
        };

        retry(backoff_config, operation).await
    }

    /// Fetch a generation's current state (Step 2: poll for the result).
    pub async fn get_generation(&self, generation_id: &str) -> Result<Generation, GenerationError> {
        let url = format!(
            "{}/dream-machine/v1/generations/{}",
            self.base_url, generation_id
        );

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

        serde_json::from_str(&response_text)
            .map_err(|e| GenerationError::Failed(format!("Failed to parse response: {}", e)))
    }

    /// Delete a generation, which also aborts it if still running.
    pub async fn delete_generation(&self, generation_id: &str) -> Result<(), GenerationError> {
        let url = format!(
            "{}/dream-machine/v1/generations/{}",
            self.base_url, generation_id
        );

        let response = self
            .client
            .delete(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| GenerationError::Transient(format!("Connection error: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GenerationError::Failed(format!(
                "Failed to delete generation ({}): {}",
                status, error_text
            )));
        }

        Ok(())
    }
}

fn map_state(state: &str) -> GenerationTaskStatus {
    match state {
        "queued" => GenerationTaskStatus::Pending,
        "dreaming" => GenerationTaskStatus::Processing,
        "completed" => GenerationTaskStatus::Succeeded,
        "failed" => GenerationTaskStatus::Failed,
        _ => GenerationTaskStatus::Processing,
    }
}

#[async_trait]
impl GenerationTask for LumaClient {
    async fn poll(&self, provider_task_id: &str) -> Result<GenerationPoll, GenerationError> {
        let generation = self.get_generation(provider_task_id).await?;

        Ok(GenerationPoll {
            status: map_state(&generation.state),
            output_url: generation.assets.and_then(|a| a.video),
            // Luma does not report an output duration; callers fall back to
            // the requested one.
            duration_seconds: None,
            error: generation.failure_reason,
        })
    }

    async fn cancel(&self, provider_task_id: &str) -> Result<bool, GenerationError> {
        self.delete_generation(provider_task_id).await?;
        Ok(true)
    }
}

#[async_trait]
impl ClipGenerator for LumaClient {
    async fn submit(&self, request: &ClipRequest) -> Result<String, GenerationError> {
        let request_body = GenerationRequest {
            model: "ray-2".to_string(),
            prompt: request.prompt.clone(),
            keyframes: Keyframes {
                frame0: Keyframe {
                    kind: "image".to_string(),
                    url: request.first_frame_url.clone(),
                },
                frame1: Keyframe {
                    kind: "image".to_string(),
                    url: request.last_frame_url.clone(),
                },
            },
            duration: format!("{}s", request.duration_seconds.round() as u32),
            resolution: Some("1080p".to_string()),
        };

        let generation_id = self.create_generation(&request_body).await?;
        tracing::info!("🎬 Luma generation created: {}", generation_id);
        Ok(generation_id)
    }
}
