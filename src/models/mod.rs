// src/models/mod.rs
pub mod clip;
pub mod job;
pub mod pair;

pub use clip::{ClipJob, ClipJobStatus, ClipModel};
pub use job::{JobStatus, VideoJob};
pub use pair::ImagePair;
