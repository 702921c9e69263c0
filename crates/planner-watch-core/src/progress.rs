use crate::models::{BatchStats, DigitizerResult};
use std::path::Path;

/// Trait for reporting batch progress.
///
/// CLI implements with indicatif; the watcher runs with the silent reporter.
/// All methods have default no-op implementations.
pub trait BatchReporter: Send + Sync {
    fn on_batch_start(&self, _total_files: usize) {}
    fn on_chunk_start(&self, _chunk: usize, _total_chunks: usize, _files: usize) {}
    fn on_file_start(&self, _index: usize, _path: &Path) {}
    fn on_attempt_failed(&self, _path: &Path, _attempt: u32, _error: &str) {}
    fn on_file_complete(&self, _result: &DigitizerResult) {}
    fn on_batch_complete(&self, _stats: &BatchStats) {}
}

/// No-op reporter for silent operation.
pub struct SilentReporter;

impl BatchReporter for SilentReporter {}
