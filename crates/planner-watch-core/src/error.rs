use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File not ready: {}", .0.display())]
    NotReadyFile(PathBuf),

    #[error("Extraction timed out after {0:?}")]
    ExtractionTimeout(Duration),

    #[error("Extraction failed: {0}")]
    ExtractionFailure(String),

    #[error("phase 1 ok, phase 2 failed: {0}")]
    UploadFailure(String),

    #[error("Decision filter unavailable: {0}")]
    DecisionFilter(String),

    #[error("Batch handling failed: {0}")]
    BatchHandling(String),

    #[error("{0}")]
    Other(String),
}
