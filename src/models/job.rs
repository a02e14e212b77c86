// src/models/job.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle of a video job. A job moves forward through the generation
/// stages and ends in exactly one of Completed, Failed or Cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    SelectingAssets,
    GeneratingClips,
    BuildingAudio,
    CombiningVideo,
    MergingAudio,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::SelectingAssets => "selecting_assets",
            JobStatus::GeneratingClips => "generating_clips",
            JobStatus::BuildingAudio => "building_audio",
            JobStatus::CombiningVideo => "combining_video",
            JobStatus::MergingAudio => "merging_audio",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(status: &str) -> Self {
        match status {
            "created" => JobStatus::Created,
            "selecting_assets" => JobStatus::SelectingAssets,
            "generating_clips" => JobStatus::GeneratingClips,
            "building_audio" => JobStatus::BuildingAudio,
            "combining_video" => JobStatus::CombiningVideo,
            "merging_audio" => JobStatus::MergingAudio,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            "cancelled" => JobStatus::Cancelled,
            _ => JobStatus::Created, // Default fallback
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// One end-to-end request to turn a campaign's image pairs into a finished
/// marketing video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoJob {
    pub id: String,
    pub campaign_id: String,
    pub status: JobStatus,
    pub output_location: Option<String>,
    pub total_cost: Option<Decimal>,
    pub failed_clip_count: i32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
