// src/elevenlabs_client.rs
// Eleven Labs API Client
// Supports: Music Generation with sequential continuation

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::providers::{
    GenerationError, GenerationPoll, GenerationTask, GenerationTaskStatus, MusicGenerator,
    MusicRequest,
};

#[derive(Clone)]
pub struct ElevenLabsClient {
    api_key: String,
    client: Client,
    base_url: String,
}

// ============================================================================
// API REQUEST/RESPONSE STRUCTURES
// ============================================================================

#[derive(Serialize, Debug)]
pub struct MusicGenerationRequest {
    pub prompt: String,
    pub duration: u32, // milliseconds (10000-300000)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    /// Generation id of the segment this one continues from. The provider
    /// conditions the new segment on the referenced audio.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continue_from: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct MusicGenerationResponse {
    pub generation_id: String,
}

#[derive(Deserialize, Debug)]
pub struct MusicStatusResponse {
    pub status: String, // "pending", "completed", "failed"
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

// ============================================================================
// IMPLEMENTATION
// ============================================================================

impl ElevenLabsClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: Client::new(),
            base_url: "https://api.elevenlabs.io/v1".to_string(),
        }
    }

    /// Generate music from a text prompt (Step 1: create task). Transient
    /// HTTP failures are retried with exponential backoff.
    pub async fn generate_music_task(
        &self,
        request_body: &MusicGenerationRequest,
    ) -> Result<String, GenerationError> {
        let url = format!("{}/music-generation", self.base_url);

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
                .header("xi-api-key", &self.api_key)
                .header("Content-Type", "application/json")
                .json(request_body)
                .send()
                .await
                .map_err(|e| {
                    if e.is_connect() || e.is_timeout() {
                        tracing::warn!("Eleven Labs API connection error (retrying): {}", e);
                        backoff::Error::transient(GenerationError::Transient(format!(
                            "Connection error: {}",
                            e
                        )))
                    } else {
                        tracing::error!("Eleven Labs API permanent error: {}", e);
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
                tracing::warn!(
                    "Eleven Labs API returned {} (retrying): {}",
                    status,
                    response_text
                );
                return Err(backoff::Error::transient(GenerationError::Transient(
                    format!("API error ({}): {}", status, response_text),
                )));
            }

            if !status.is_success() {
                tracing::error!(
                    "Eleven Labs API permanent error ({}): {}",
                    status,
                    response_text
                );
                return Err(backoff::Error::permanent(GenerationError::Failed(format!(
                    "API error ({}): {}",
                    status, response_text
                ))));
            }

            let response_data: MusicGenerationResponse = serde_json::from_str(&response_text)
                .map_err(|e| {
                    backoff::Error::permanent(GenerationError::Failed(format!(
                        "Failed to parse response: {}",
                        e
                    )))
                })?;

            Ok(response_data.generation_id)
        };

        retry(backoff_config, operation).await
    }

    /// Check music generation status (Step 2: poll for the result).
    pub async fn get_music_status(
        &self,
        generation_id: &str,
    ) -> Result<MusicStatusResponse, GenerationError> {
        let url = format!("{}/music-generation/{}", self.base_url, generation_id);

        let response = self
            .client
            .get(&url)
            .header("xi-api-key", &self.api_key)
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
}

fn map_music_status(status: &str) -> GenerationTaskStatus {
    match status {
        "pending" => GenerationTaskStatus::Processing,
        "completed" => GenerationTaskStatus::Succeeded,
        "failed" => GenerationTaskStatus::Failed,
        _ => GenerationTaskStatus::Processing,
    }
}

#[async_trait]
impl GenerationTask for ElevenLabsClient {
    async fn poll(&self, provider_task_id: &str) -> Result<GenerationPoll, GenerationError> {
        let status = self.get_music_status(provider_task_id).await?;

        Ok(GenerationPoll {
            status: map_music_status(&status.status),
            output_url: status.audio_url,
            duration_seconds: None,
            error: status.error,
        })
    }

    async fn cancel(&self, _provider_task_id: &str) -> Result<bool, GenerationError> {
        // No cancellation endpoint; a pending generation runs out.
        Ok(false)
    }
}

#[async_trait]
impl MusicGenerator for ElevenLabsClient {
    async fn submit(&self, request: &MusicRequest) -> Result<String, GenerationError> {
        let request_body = MusicGenerationRequest {
            prompt: request.prompt.clone(),
            duration: (request.duration_seconds * 1000.0).round() as u32,
            model_id: Some("eleven_music_v1".to_string()),
            continue_from: request.continuation_of.clone(),
        };

        self.generate_music_task(&request_body).await
    }
}
