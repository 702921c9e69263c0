pub mod command;
pub mod output;
pub mod retry;

use std::io;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::error::Error;
use crate::models::{ExtractionOutput, FailureKind, Phase};

pub use command::{CommandExtractor, CommandUploader};
pub use retry::{BatchOutcome, ProcessingConfig, RetryOrchestrator, UploadRetryPolicy};

/// Failure of one call to an external service.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("exited with status {code:?}: {message}")]
    Status { code: Option<i32>, message: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("unreadable output: {0}")]
    Parse(String),
}

impl ServiceError {
    /// Lift into the crate error for the phase that produced it.
    pub fn into_error(self, phase: Phase) -> Error {
        match (phase, self) {
            (Phase::Extract, ServiceError::Timeout(after)) => Error::ExtractionTimeout(after),
            (Phase::Extract, other) => Error::ExtractionFailure(other.to_string()),
            (Phase::Upload, other) => Error::UploadFailure(other.to_string()),
        }
    }
}

impl Error {
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Error::ExtractionTimeout(_) => Some(FailureKind::ExtractionTimeout),
            Error::ExtractionFailure(_) => Some(FailureKind::ExtractionFailure),
            Error::UploadFailure(_) => Some(FailureKind::UploadFailure),
            _ => None,
        }
    }
}

/// Phase 1: turn a planner image into structured data.
pub trait Extractor: Send + Sync {
    fn extract(&self, image: &Path, timeout: Duration) -> Result<ExtractionOutput, ServiceError>;
}

/// Phase 2: push extracted data to the record store.
pub trait Uploader: Send + Sync {
    fn upload(
        &self,
        image: &Path,
        payload: &ExtractionOutput,
        timeout: Duration,
    ) -> Result<(), ServiceError>;
}
