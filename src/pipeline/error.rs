// src/pipeline/error.rs
use thiserror::Error;

/// Errors surfaced by the pipeline runtime.
///
/// Infrastructure failures (database, serialization, checkpoint storage) are
/// fatal: the run aborts immediately and resumes later from persisted state.
/// `TaskFailed` is the ordinary outcome of a task that ran and lost; it stops
/// that task's downstream branch but leaves independent branches running.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Task {task} failed: {reason}")]
    TaskFailed { task: String, reason: String },

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Job {job_id} cannot be started: {reason}")]
    NotStartable { job_id: String, reason: String },

    #[error("Job {0} was cancelled")]
    Cancelled(String),
}

impl PipelineError {
    pub fn task_failed(task: &str, reason: impl Into<String>) -> Self {
        PipelineError::TaskFailed {
            task: task.to_string(),
            reason: reason.into(),
        }
    }

    /// Fatal errors abort the whole run instead of failing a single task.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::Database(_)
                | PipelineError::Serialization(_)
                | PipelineError::Storage(_)
        )
    }
}
