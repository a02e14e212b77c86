// src/models/clip.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Supported image-to-video models. Dispatch is a closed set: an unknown
/// model tag is rejected when parsed, not at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClipModel {
    #[serde(rename = "kling-v1-6")]
    KlingV16,
    #[serde(rename = "luma-ray-2")]
    LumaRay2,
}

impl ClipModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClipModel::KlingV16 => "kling-v1-6",
            ClipModel::LumaRay2 => "luma-ray-2",
        }
    }

    pub fn parse(model: &str) -> Result<Self, String> {
        match model {
            "kling-v1-6" => Ok(ClipModel::KlingV16),
            "luma-ray-2" => Ok(ClipModel::LumaRay2),
            other => Err(format!("Unknown clip model: {}", other)),
        }
    }
}

/// Per-clip generation lifecycle. Terminal states are never left again;
/// a retried pipeline creates no new row, it re-drives the same one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipJobStatus {
    Pending,
    Submitted,
    Polling,
    Succeeded,
    Failed,
    Cancelled,
}

impl ClipJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClipJobStatus::Pending => "pending",
            ClipJobStatus::Submitted => "submitted",
            ClipJobStatus::Polling => "polling",
            ClipJobStatus::Succeeded => "succeeded",
            ClipJobStatus::Failed => "failed",
            ClipJobStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(status: &str) -> Self {
        match status {
            "pending" => ClipJobStatus::Pending,
            "submitted" => ClipJobStatus::Submitted,
            "polling" => ClipJobStatus::Polling,
            "succeeded" => ClipJobStatus::Succeeded,
            "failed" => ClipJobStatus::Failed,
            "cancelled" => ClipJobStatus::Cancelled,
            _ => ClipJobStatus::Pending, // Default fallback
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ClipJobStatus::Succeeded | ClipJobStatus::Failed | ClipJobStatus::Cancelled
        )
    }
}

/// One image pair's clip generation: the atomic unit of parallel work.
/// `sequence_number` fixes the clip's place in the final video regardless
/// of which generation finishes first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipJob {
    pub id: String,
    pub job_id: String,
    pub sequence_number: i32,
    pub first_asset_id: String,
    pub second_asset_id: String,
    pub model: ClipModel,
    pub duration_seconds: f64,
    pub scene_prompt: Option<String>,
    pub status: ClipJobStatus,
    pub clip_location: Option<String>,
    pub provider_task_id: Option<String>,
    pub cost: Option<Decimal>,
    pub attempt_count: i32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
