//! Error types for pathtile.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, TileError>;

#[derive(Debug, Error)]
pub enum TileError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid slide description: {0}")]
    InvalidSlide(String),

    #[error("no slide is loaded")]
    SlideNotLoaded,

    #[error("pyramid level {level} does not exist (slide has {levels} levels)")]
    UnknownLevel { level: u32, levels: usize },

    #[error("invalid annotation: {0}")]
    InvalidAnnotation(String),

    /// Failure reported by a slide reader or rasterizer.
    #[error("backend error: {0}")]
    Backend(String),

    #[error("worker pool is shut down")]
    WorkerUnavailable,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}
