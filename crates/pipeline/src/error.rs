//! Pipeline error type.

use mosaic_core::error::CoreError;
use mosaic_core::ffmpeg::FfmpegError;
use mosaic_core::types::DbId;

/// Errors surfaced by pipeline stages.
///
/// Per-step recoverable failures (one source unreachable, one image refused)
/// are logged and swallowed inside the stage; only unrecoverable conditions
/// travel up as this type and fail the task.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("notebook {0} not found")]
    NotebookNotFound(DbId),

    #[error("model client error: {0}")]
    Client(#[from] mosaic_clients::ClientError),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Ffmpeg(#[from] FfmpegError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("task error: {0}")]
    Task(#[from] mosaic_tasks::TaskManagerError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
