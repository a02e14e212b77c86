// src/models/pair.rs
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// An upstream-selected pair of still images. `position` is the narrative
/// order chosen during asset selection; the pipeline reads pairs, it never
/// writes them.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ImagePair {
    pub id: String,
    pub campaign_id: String,
    pub position: i32,
    pub first_asset_id: String,
    pub second_asset_id: String,
    pub score: f64,
    pub rationale: Option<String>,
}
