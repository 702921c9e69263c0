use chrono::NaiveDate;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// What the coordinator intends to do with one dropped file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    New,
    Update,
    Skip,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::New => "new",
            Action::Update => "update",
            Action::Skip => "skip",
        }
    }

    pub fn should_process(&self) -> bool {
        matches!(self, Action::New | Action::Update)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingDecision {
    pub action: Action,
    pub date: Option<NaiveDate>,
    pub reason: String,
    pub existing_id: Option<String>,
}

impl ProcessingDecision {
    pub fn new_entry(date: Option<NaiveDate>, reason: impl Into<String>) -> Self {
        Self {
            action: Action::New,
            date,
            reason: reason.into(),
            existing_id: None,
        }
    }

    pub fn update(date: NaiveDate, existing_id: String, reason: impl Into<String>) -> Self {
        Self {
            action: Action::Update,
            date: Some(date),
            reason: reason.into(),
            existing_id: Some(existing_id),
        }
    }

    pub fn skip(reason: impl Into<String>) -> Self {
        Self {
            action: Action::Skip,
            date: None,
            reason: reason.into(),
            existing_id: None,
        }
    }
}

/// Structured payload returned by the extraction service.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionOutput {
    pub date: Option<NaiveDate>,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Extract,
    Upload,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Extract => "extract",
            Phase::Upload => "upload",
        }
    }
}

/// Outcome of a single attempt of one phase for one file.
#[derive(Debug, Clone)]
pub struct AttemptResult {
    pub phase: Phase,
    pub attempt: u32,
    pub success: bool,
    pub error: Option<String>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    ExtractionTimeout,
    ExtractionFailure,
    UploadFailure,
}

/// Terminal outcome for one file after all of its attempts.
#[derive(Debug, Clone)]
pub struct DigitizerResult {
    pub success: bool,
    pub image_path: PathBuf,
    pub output_data: Option<ExtractionOutput>,
    pub error_message: Option<String>,
    pub failure: Option<FailureKind>,
    pub processing_time: Duration,
    pub retry_count: u32,
    pub attempts: Vec<AttemptResult>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchStats {
    pub success_count: usize,
    pub error_count: usize,
    pub total_time: Duration,
}

impl BatchStats {
    pub fn from_results(results: &[DigitizerResult]) -> Self {
        let success_count = results.iter().filter(|r| r.success).count();
        Self {
            success_count,
            error_count: results.len() - success_count,
            total_time: results.iter().map(|r| r.processing_time).sum(),
        }
    }
}

/// Aggregate of one coordinator batch, as reported to the notification sink.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessingResult {
    pub success_count: usize,
    pub error_count: usize,
    pub new_entries: usize,
    pub updated_entries: usize,
    pub skipped_count: usize,
    pub processing_time: Duration,
    pub errors: Vec<String>,
}

impl ProcessingResult {
    pub fn from_batch(results: &[DigitizerResult], decisions: &[ProcessingDecision]) -> Self {
        let stats = BatchStats::from_results(results);
        let count = |action: Action| decisions.iter().filter(|d| d.action == action).count();

        Self {
            success_count: stats.success_count,
            error_count: stats.error_count,
            new_entries: count(Action::New),
            updated_entries: count(Action::Update),
            skipped_count: count(Action::Skip),
            processing_time: stats.total_time,
            errors: results
                .iter()
                .filter_map(|r| r.error_message.clone())
                .collect(),
        }
    }

    pub fn total_processed(&self) -> usize {
        self.success_count + self.error_count
    }

    /// Percentage of processed files that succeeded, 0 when nothing ran.
    pub fn success_rate(&self) -> f64 {
        match self.total_processed() {
            0 => 0.0,
            total => self.success_count as f64 / total as f64 * 100.0,
        }
    }

    /// The first `limit` errors plus how many were left out.
    pub fn sampled_errors(&self, limit: usize) -> (&[String], usize) {
        let shown = self.errors.len().min(limit);
        (&self.errors[..shown], self.errors.len() - shown)
    }
}

/// A run of missing days between two known dates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateGap {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub missing_dates: Vec<NaiveDate>,
}

impl fmt::Display for DateGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} → {} ({} missing days)",
            self.start_date.format(DATE_FORMAT),
            self.end_date.format(DATE_FORMAT),
            self.missing_dates.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(success: bool, error: Option<&str>, secs: u64) -> DigitizerResult {
        DigitizerResult {
            success,
            image_path: PathBuf::from("/drop/page.jpg"),
            output_data: None,
            error_message: error.map(str::to_string),
            failure: None,
            processing_time: Duration::from_secs(secs),
            retry_count: 0,
            attempts: Vec::new(),
        }
    }

    #[test]
    fn test_processing_result_counts_actions_and_errors() {
        let results = vec![
            result(true, None, 2),
            result(false, Some("timed out"), 3),
            result(true, None, 1),
        ];
        let date = NaiveDate::from_ymd_opt(2025, 5, 28).unwrap();
        let decisions = vec![
            ProcessingDecision::new_entry(Some(date), "new"),
            ProcessingDecision::update(date, "page-1".to_string(), "exists"),
            ProcessingDecision::new_entry(None, "new"),
            ProcessingDecision::skip("no date"),
        ];

        let summary = ProcessingResult::from_batch(&results, &decisions);
        assert_eq!(summary.success_count, 2);
        assert_eq!(summary.error_count, 1);
        assert_eq!(summary.new_entries, 2);
        assert_eq!(summary.updated_entries, 1);
        assert_eq!(summary.skipped_count, 1);
        assert_eq!(summary.processing_time, Duration::from_secs(6));
        assert_eq!(summary.errors, vec!["timed out".to_string()]);
    }

    #[test]
    fn test_sampled_errors_keeps_full_list() {
        let summary = ProcessingResult {
            errors: (0..8).map(|i| format!("error {}", i)).collect(),
            ..ProcessingResult::default()
        };
        let (shown, hidden) = summary.sampled_errors(5);
        assert_eq!(shown.len(), 5);
        assert_eq!(hidden, 3);
        assert_eq!(summary.errors.len(), 8);
    }

    #[test]
    fn test_success_rate_with_no_files() {
        assert_eq!(ProcessingResult::default().success_rate(), 0.0);
    }
}
