// src/pipeline/mod.rs
// Checkpointed task graph turning a campaign's image pairs into a finished
// promo video.
pub mod assembly;
pub mod checkpoint;
pub mod error;
pub mod executor;
pub mod fanout;
pub mod graph;
pub mod renderer;
pub mod selection;
pub mod service;
pub mod soundtrack;
pub mod state;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use error::PipelineError;
pub use service::PipelineService;
pub use state::{JobOptions, PipelineResources};
