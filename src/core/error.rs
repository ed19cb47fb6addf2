//! Error types for the terragraph engine
//!
//! Only setup paths return these (configuration, graph loading, thread pool
//! creation, export I/O). Tree evaluation never fails with an error; it
//! reports [`crate::core::diagnostics::Diagnostics`] and keeps going.

use thiserror::Error;

/// Main error type for the engine
#[derive(Debug, Error)]
pub enum Error {
    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}
