use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::{Extractor, Uploader};
use crate::error::Error;
use crate::models::{AttemptResult, BatchStats, DigitizerResult, ExtractionOutput, Phase};
use crate::progress::BatchReporter;

/// What a phase-2 (upload) failure costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadRetryPolicy {
    /// Retry only the upload, with its own attempt budget. Extraction is not re-run.
    #[default]
    UploadOnly,
    /// Count the failure against the shared budget and re-extract on the next attempt.
    FullPipeline,
}

#[derive(Debug, Clone)]
pub struct ProcessingConfig {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
    pub batch_size: usize,
    pub inter_file_delay: Duration,
    pub upload_policy: UploadRetryPolicy,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(5),
            timeout: Duration::from_secs(120),
            batch_size: 5,
            inter_file_delay: Duration::from_millis(500),
            upload_policy: UploadRetryPolicy::UploadOnly,
        }
    }
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub results: Vec<DigitizerResult>,
    pub stats: BatchStats,
}

/// Drives files through extract → upload with bounded attempts.
pub struct RetryOrchestrator {
    config: ProcessingConfig,
    extractor: Arc<dyn Extractor>,
    uploader: Option<Arc<dyn Uploader>>,
}

/// Per-file bookkeeping while attempts are running.
struct FileRun<'a> {
    image: &'a Path,
    started: Instant,
    attempts: Vec<AttemptResult>,
    failed: u32,
    last_error: Option<Error>,
}

impl RetryOrchestrator {
    pub fn new(config: ProcessingConfig, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            config,
            extractor,
            uploader: None,
        }
    }

    pub fn with_uploader(mut self, uploader: Arc<dyn Uploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    pub fn has_uploader(&self) -> bool {
        self.uploader.is_some()
    }

    /// Process files in fixed-size chunks, one file at a time, pausing briefly
    /// between files to keep load on the external service predictable.
    pub fn process_batch(
        &self,
        images: &[PathBuf],
        upload: bool,
        reporter: &dyn BatchReporter,
    ) -> BatchOutcome {
        let total = images.len();
        let chunk_size = self.config.batch_size.max(1);
        let total_chunks = total.div_ceil(chunk_size);

        info!("Processing batch of {} images", total);
        reporter.on_batch_start(total);

        let mut results = Vec::with_capacity(total);
        for (chunk_index, chunk) in images.chunks(chunk_size).enumerate() {
            info!(
                "Processing sub-batch {}/{} ({} images)",
                chunk_index + 1,
                total_chunks,
                chunk.len()
            );
            reporter.on_chunk_start(chunk_index + 1, total_chunks, chunk.len());

            for image in chunk {
                reporter.on_file_start(results.len(), image);
                let result = self.process_file(image, upload, reporter);
                reporter.on_file_complete(&result);
                results.push(result);

                if results.len() < total && !self.config.inter_file_delay.is_zero() {
                    thread::sleep(self.config.inter_file_delay);
                }
            }
        }

        let stats = BatchStats::from_results(&results);
        info!(
            "Batch complete: {} success, {} errors, {:.1}s total",
            stats.success_count,
            stats.error_count,
            stats.total_time.as_secs_f64()
        );
        reporter.on_batch_complete(&stats);

        BatchOutcome { results, stats }
    }

    /// Run one file to a terminal result. Never panics on service failure and
    /// never returns early with an error: every outcome is a `DigitizerResult`.
    pub fn process_file(
        &self,
        image: &Path,
        upload: bool,
        reporter: &dyn BatchReporter,
    ) -> DigitizerResult {
        let absolute = std::path::absolute(image).unwrap_or_else(|_| image.to_path_buf());
        let mut run = FileRun {
            image: &absolute,
            started: Instant::now(),
            attempts: Vec::new(),
            failed: 0,
            last_error: None,
        };
        let uploader = if upload { self.uploader.as_deref() } else { None };
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            info!("Processing {} (attempt {})", display_name(run.image), attempt);

            let output = match self.extract(&mut run, attempt, reporter) {
                Some(output) => output,
                None => {
                    self.pause_before_retry(attempt, max_attempts);
                    continue;
                }
            };

            let Some(uploader) = uploader else {
                return run.succeed(output);
            };

            match self.config.upload_policy {
                UploadRetryPolicy::UploadOnly => {
                    return self.upload_until_exhausted(run, uploader, output, reporter);
                }
                UploadRetryPolicy::FullPipeline => {
                    if self.upload(&mut run, uploader, &output, attempt, reporter) {
                        return run.succeed(output);
                    }
                    self.pause_before_retry(attempt, max_attempts);
                }
            }
        }

        run.exhausted(max_attempts, None)
    }

    fn upload_until_exhausted(
        &self,
        mut run: FileRun<'_>,
        uploader: &dyn Uploader,
        output: ExtractionOutput,
        reporter: &dyn BatchReporter,
    ) -> DigitizerResult {
        let max_attempts = self.config.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            if self.upload(&mut run, uploader, &output, attempt, reporter) {
                return run.succeed(output);
            }
            self.pause_before_retry(attempt, max_attempts);
        }
        run.exhausted(max_attempts, Some(output))
    }

    fn extract(
        &self,
        run: &mut FileRun<'_>,
        attempt: u32,
        reporter: &dyn BatchReporter,
    ) -> Option<ExtractionOutput> {
        let started = Instant::now();
        let result = self.extractor.extract(run.image, self.config.timeout);
        match result {
            Ok(output) => {
                run.record(Phase::Extract, attempt, started, None);
                Some(output)
            }
            Err(e) => {
                let err = e.into_error(Phase::Extract);
                run.fail(Phase::Extract, attempt, started, err, reporter);
                None
            }
        }
    }

    fn upload(
        &self,
        run: &mut FileRun<'_>,
        uploader: &dyn Uploader,
        output: &ExtractionOutput,
        attempt: u32,
        reporter: &dyn BatchReporter,
    ) -> bool {
        let started = Instant::now();
        match uploader.upload(run.image, output, self.config.timeout) {
            Ok(()) => {
                run.record(Phase::Upload, attempt, started, None);
                true
            }
            Err(e) => {
                let err = e.into_error(Phase::Upload);
                run.fail(Phase::Upload, attempt, started, err, reporter);
                false
            }
        }
    }

    fn pause_before_retry(&self, attempt: u32, max_attempts: u32) {
        if attempt < max_attempts && !self.config.retry_delay.is_zero() {
            thread::sleep(self.config.retry_delay);
        }
    }
}

impl FileRun<'_> {
    fn record(&mut self, phase: Phase, attempt: u32, started: Instant, error: Option<String>) {
        self.attempts.push(AttemptResult {
            phase,
            attempt,
            success: error.is_none(),
            error,
            elapsed: started.elapsed(),
        });
    }

    fn fail(
        &mut self,
        phase: Phase,
        attempt: u32,
        started: Instant,
        err: Error,
        reporter: &dyn BatchReporter,
    ) {
        let message = err.to_string();
        warn!(
            "Attempt {} ({}) failed for {}: {}",
            attempt,
            phase.as_str(),
            display_name(self.image),
            message
        );
        reporter.on_attempt_failed(self.image, attempt, &message);
        self.record(phase, attempt, started, Some(message));
        self.failed += 1;
        self.last_error = Some(err);
    }

    fn succeed(self, output: ExtractionOutput) -> DigitizerResult {
        info!("Successfully processed {}", display_name(self.image));
        DigitizerResult {
            success: true,
            image_path: self.image.to_path_buf(),
            output_data: Some(output),
            error_message: None,
            failure: None,
            processing_time: self.started.elapsed(),
            retry_count: self.failed,
            attempts: self.attempts,
        }
    }

    fn exhausted(self, max_attempts: u32, output: Option<ExtractionOutput>) -> DigitizerResult {
        let (message, failure) = match &self.last_error {
            Some(err) => (err.to_string(), err.failure_kind()),
            None => (format!("Failed after {} attempts", max_attempts), None),
        };
        warn!(
            "Giving up on {} after {} attempts: {}",
            display_name(self.image),
            max_attempts,
            message
        );
        DigitizerResult {
            success: false,
            image_path: self.image.to_path_buf(),
            output_data: output,
            error_message: Some(message),
            failure,
            processing_time: self.started.elapsed(),
            retry_count: max_attempts,
            attempts: self.attempts,
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
