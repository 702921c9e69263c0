use chrono::NaiveDate;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::dates::{
    AlwaysNew, DateIndexHandle, DateIndexSource, DatedDecisionFilter, DecisionFilter,
    ExistingDateIndex, GapDetector, SummaryFileSource,
};
use crate::digitizer::{CommandExtractor, CommandUploader, Extractor, RetryOrchestrator};
use crate::error::Error;
use crate::models::{DateGap, DigitizerResult, ProcessingDecision, ProcessingResult};
use crate::notification::{Notification, NotificationSink};
use crate::progress::{BatchReporter, SilentReporter};
use crate::watcher::{BatchCallback, FolderWatcher};

pub const FILE_PROCESSING_ERROR: &str = "File Processing Error";

/// Runs each fired batch through decision filtering, processing, gap
/// detection and notification. Batches never overlap.
pub struct Coordinator {
    orchestrator: RetryOrchestrator,
    filter: Arc<dyn DecisionFilter>,
    sink: Arc<dyn NotificationSink>,
    reporter: Arc<dyn BatchReporter>,
    index_source: Option<Arc<dyn DateIndexSource>>,
    index: DateIndexHandle,
    gaps: GapDetector,
    upload: bool,
    batch_lock: Mutex<()>,
}

/// What one `handle_batch` call did.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub decisions: Vec<(PathBuf, ProcessingDecision)>,
    pub results: Vec<DigitizerResult>,
    pub summary: Option<ProcessingResult>,
    pub gaps: Vec<DateGap>,
    /// Set when the batch was aborted and reported as a critical error.
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn processed(&self) -> bool {
        self.summary.is_some()
    }

    pub fn skipped(&self) -> usize {
        self.decisions
            .iter()
            .filter(|(_, d)| !d.action.should_process())
            .count()
    }
}

impl Coordinator {
    pub fn new(orchestrator: RetryOrchestrator, sink: Arc<dyn NotificationSink>) -> Self {
        let upload = orchestrator.has_uploader();
        Self {
            orchestrator,
            filter: Arc::new(AlwaysNew),
            sink,
            reporter: Arc::new(SilentReporter),
            index_source: None,
            index: DateIndexHandle::default(),
            gaps: GapDetector,
            upload,
            batch_lock: Mutex::new(()),
        }
    }

    /// Wire up command-backed services from configuration. With a
    /// `date_index` section, files are classified by planner date against the
    /// index; otherwise every file is treated as new.
    pub fn from_config(config: &AppConfig, sink: Arc<dyn NotificationSink>) -> Result<Self, Error> {
        config.validate()?;
        let processing = config.processing();
        let timeout = processing.timeout;
        let extractor: Arc<dyn Extractor> = Arc::new(CommandExtractor::new(config.extractor.clone()));

        let mut orchestrator = RetryOrchestrator::new(processing, Arc::clone(&extractor));
        if let Some(uploader) = &config.uploader {
            orchestrator = orchestrator.with_uploader(Arc::new(CommandUploader::new(uploader.clone())));
        }

        let mut coordinator = Self::new(orchestrator, sink).with_upload(config.upload_enabled);
        if let Some(index_config) = &config.date_index {
            coordinator = coordinator
                .with_index_source(Arc::new(SummaryFileSource::from_config(index_config)))
                .with_decision_filter(Arc::new(DatedDecisionFilter::new(extractor, timeout)));
        }
        Ok(coordinator)
    }

    pub fn with_decision_filter(mut self, filter: Arc<dyn DecisionFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_index_source(mut self, source: Arc<dyn DateIndexSource>) -> Self {
        self.index_source = Some(source);
        self
    }

    pub fn with_index(self, index: ExistingDateIndex) -> Self {
        self.index.replace(index);
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn BatchReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Request phase 2 for processed files. Has no effect without an uploader.
    pub fn with_upload(mut self, upload: bool) -> Self {
        self.upload = upload && self.orchestrator.has_uploader();
        self
    }

    pub fn index(&self) -> Arc<ExistingDateIndex> {
        self.index.snapshot()
    }

    /// Reload the index from its source. Without a source this is a no-op.
    /// On failure the previous index stays in place.
    pub fn refresh_index(&self) -> Result<(), Error> {
        let Some(source) = &self.index_source else {
            return Ok(());
        };
        let fresh = source.load()?;
        info!("Refreshed existing dates cache ({} dates)", fresh.len());
        self.index.replace(fresh);
        Ok(())
    }

    /// Callback for a [`FolderWatcher`] that hands every fired batch to
    /// [`Coordinator::handle_batch`].
    pub fn batch_callback(self: &Arc<Self>) -> BatchCallback {
        let coordinator = Arc::clone(self);
        Arc::new(move |files| {
            coordinator.handle_batch(files);
        })
    }

    /// Process files already waiting in the watch folder, newest first.
    /// Returns `None` when there was nothing to do.
    pub fn process_existing(
        &self,
        watcher: &FolderWatcher,
        limit: usize,
    ) -> Result<Option<BatchReport>, Error> {
        let files = watcher.existing_files(Some(limit))?;
        if files.is_empty() {
            info!("No existing files to process");
            return Ok(None);
        }
        info!("Processing {} existing files", files.len());
        Ok(Some(self.handle_batch(files)))
    }

    /// Start the live watch, then work through up to `startup_limit` files
    /// already waiting. Pages dropped while the startup batch runs are picked
    /// up by the watch. A failed folder scan is logged and the watch keeps
    /// running.
    pub fn start_watching(
        &self,
        watcher: &FolderWatcher,
        startup_limit: Option<usize>,
    ) -> Result<(), Error> {
        watcher.start()?;
        if let Some(limit) = startup_limit {
            if let Err(err) = self.process_existing(watcher, limit) {
                error!("Error processing existing files: {}", err);
            }
        }
        Ok(())
    }

    /// Handle one fired batch end to end. Never fails: anything that goes
    /// wrong is pushed to the sink as a critical error and noted in the report.
    pub fn handle_batch(&self, files: Vec<PathBuf>) -> BatchReport {
        let _guard = self
            .batch_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let started = Instant::now();
        info!("Handling batch of {} files", files.len());

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_batch(&files)));
        let mut report = match outcome {
            Ok(Ok(report)) => report,
            Ok(Err(err)) => self.report_failure(&files, &err),
            Err(payload) => {
                let err = Error::BatchHandling(panic_message(payload.as_ref()));
                self.report_failure(&files, &err)
            }
        };
        report.elapsed = started.elapsed();
        report
    }

    fn run_batch(&self, files: &[PathBuf]) -> Result<BatchReport, Error> {
        let mut report = BatchReport::default();

        // Phase 1: decide
        if let Err(err) = self.refresh_index() {
            let err = match err {
                Error::DecisionFilter(_) => err,
                other => Error::DecisionFilter(other.to_string()),
            };
            error!("Error refreshing existing dates: {}", err);
        }
        let index = self.index.snapshot();
        report.decisions = files
            .iter()
            .map(|file| (file.clone(), self.decide(file, &index)))
            .collect();

        let to_process: Vec<PathBuf> = report
            .decisions
            .iter()
            .filter(|(_, decision)| decision.action.should_process())
            .map(|(file, _)| file.clone())
            .collect();
        for (file, decision) in &report.decisions {
            if !decision.action.should_process() {
                info!("Skipping {}: {}", display_name(file), decision.reason);
            }
        }

        if to_process.is_empty() {
            info!("No files to process after validation");
            return Ok(report);
        }

        // Phase 2: process
        let outcome = self
            .orchestrator
            .process_batch(&to_process, self.upload, self.reporter.as_ref());
        let decisions: Vec<ProcessingDecision> =
            report.decisions.iter().map(|(_, d)| d.clone()).collect();
        let summary = ProcessingResult::from_batch(&outcome.results, &decisions);

        self.notify(&Notification::BatchSummary {
            result: summary.clone(),
            files: files.to_vec(),
        });
        report.results = outcome.results;
        report.summary = Some(summary);

        // Phase 3: gaps
        let decided_dates: Vec<NaiveDate> = decisions.iter().filter_map(|d| d.date).collect();
        if !decided_dates.is_empty() {
            report.gaps = self.gaps.detect(&decided_dates, &index);
            if !report.gaps.is_empty() {
                self.notify(&Notification::GapReport {
                    gaps: report.gaps.clone(),
                    analyzed_dates: decided_dates.len(),
                });
            }
        }

        Ok(report)
    }

    fn decide(&self, file: &Path, index: &ExistingDateIndex) -> ProcessingDecision {
        let decision = match self.filter.decide(file, index) {
            Ok(decision) => decision,
            Err(err) => {
                error!("Error validating {}: {}", file.display(), err);
                ProcessingDecision::new_entry(None, format!("Validation unavailable: {}", err))
            }
        };
        info!(
            "{}: {} - {}",
            display_name(file),
            decision.action,
            decision.reason
        );
        decision
    }

    fn notify(&self, notification: &Notification) {
        if !self.sink.push(notification) {
            warn!("Failed to deliver {} notification", notification.kind());
        }
    }

    fn report_failure(&self, files: &[PathBuf], err: &Error) -> BatchReport {
        let message = err.to_string();
        error!("Error handling batch of {} files: {}", files.len(), message);

        let mut context = BTreeMap::new();
        context.insert("file_count".to_string(), files.len().to_string());
        context.insert(
            "files".to_string(),
            files
                .iter()
                .map(|f| display_name(f))
                .collect::<Vec<_>>()
                .join(", "),
        );
        self.notify(&Notification::CriticalError {
            error_type: FILE_PROCESSING_ERROR.to_string(),
            message: message.clone(),
            context,
        });

        BatchReport {
            error: Some(message),
            ..BatchReport::default()
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "batch handler panicked".to_string()
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
