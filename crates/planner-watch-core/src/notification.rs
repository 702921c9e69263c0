//! Batch outcome notifications and their plain-text rendering.

use chrono::Local;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::models::{DateGap, ProcessingResult, DATE_FORMAT};

const MAX_FILES_SHOWN: usize = 10;
const MAX_ERRORS_SHOWN: usize = 5;
const MAX_GAPS_SHOWN: usize = 10;
const MAX_MISSING_LISTED: usize = 5;
const MISSING_PREVIEW: usize = 3;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    BatchSummary {
        result: ProcessingResult,
        files: Vec<PathBuf>,
    },
    GapReport {
        gaps: Vec<DateGap>,
        analyzed_dates: usize,
    },
    CriticalError {
        error_type: String,
        message: String,
        context: BTreeMap<String, String>,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::BatchSummary { .. } => "batch_summary",
            Notification::GapReport { .. } => "gap_report",
            Notification::CriticalError { .. } => "critical_error",
        }
    }

    /// One-line headline, used for log records and terminal output.
    pub fn headline(&self) -> String {
        match self {
            Notification::BatchSummary { result, .. } => format!(
                "Processing complete - {}/{} successful",
                result.success_count,
                result.total_processed()
            ),
            Notification::GapReport { gaps, .. } => {
                format!("Date gaps detected: {} gaps found in sequence", gaps.len())
            }
            Notification::CriticalError {
                error_type,
                message,
                ..
            } => format!("Critical error - {}: {}", error_type, message),
        }
    }

    /// Full multi-line report.
    pub fn render(&self) -> String {
        match self {
            Notification::BatchSummary { result, files } => render_summary(result, files),
            Notification::GapReport {
                gaps,
                analyzed_dates,
            } => render_gaps(gaps, *analyzed_dates),
            Notification::CriticalError {
                error_type,
                message,
                context,
            } => render_error(error_type, message, context),
        }
    }
}

/// `SUCCESS` at 90% or better, `PARTIAL SUCCESS` at 70%, otherwise `FAILED`.
pub fn summary_status(success_rate: f64) -> &'static str {
    if success_rate >= 90.0 {
        "SUCCESS"
    } else if success_rate >= 70.0 {
        "PARTIAL SUCCESS"
    } else {
        "FAILED"
    }
}

fn rule() -> String {
    "=".repeat(50)
}

fn render_summary(result: &ProcessingResult, files: &[PathBuf]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "PLANNER PROCESSING {}", summary_status(result.success_rate()));
    let _ = writeln!(out, "{}", rule());
    let _ = writeln!(out, "PROCESSING SUMMARY:");
    let _ = writeln!(out, "   - Total files processed: {}", result.total_processed());
    let _ = writeln!(
        out,
        "   - Successful: {} ({:.1}%)",
        result.success_count,
        result.success_rate()
    );
    let _ = writeln!(out, "   - Failed: {}", result.error_count);
    let _ = writeln!(out, "   - New entries created: {}", result.new_entries);
    let _ = writeln!(out, "   - Existing entries updated: {}", result.updated_entries);
    let _ = writeln!(out, "   - Files skipped: {}", result.skipped_count);
    let _ = writeln!(
        out,
        "   - Total processing time: {:.1} seconds",
        result.processing_time.as_secs_f64()
    );

    if !files.is_empty() {
        let _ = writeln!(out, "\nPROCESSED FILES:");
        for (i, file) in files.iter().take(MAX_FILES_SHOWN).enumerate() {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.display().to_string());
            let _ = writeln!(out, "   {}. {}", i + 1, name);
        }
        if files.len() > MAX_FILES_SHOWN {
            let _ = writeln!(out, "   ... and {} more files", files.len() - MAX_FILES_SHOWN);
        }
    }

    let (errors, hidden) = result.sampled_errors(MAX_ERRORS_SHOWN);
    if !errors.is_empty() {
        let _ = writeln!(out, "\nERRORS ENCOUNTERED:");
        for (i, error) in errors.iter().enumerate() {
            let _ = writeln!(out, "   {}. {}", i + 1, error);
        }
        if hidden > 0 {
            let _ = writeln!(out, "   ... and {} more errors", hidden);
        }
    }

    let _ = write!(out, "\nCompleted at: {}", Local::now().format(TIMESTAMP_FORMAT));
    out
}

fn render_gaps(gaps: &[DateGap], analyzed_dates: usize) -> String {
    let total_missing: usize = gaps.iter().map(|g| g.missing_dates.len()).sum();

    let mut out = String::new();
    let _ = writeln!(out, "DATE GAP DETECTION RESULTS");
    let _ = writeln!(out, "{}", rule());
    let _ = writeln!(out, "ANALYSIS SUMMARY:");
    let _ = writeln!(out, "   - Gaps found: {}", gaps.len());
    let _ = writeln!(out, "   - Total missing days: {}", total_missing);
    let _ = writeln!(out, "   - Dates analyzed: {}", analyzed_dates);

    if gaps.is_empty() {
        return out.trim_end().to_string();
    }

    let _ = writeln!(out, "\nDETECTED GAPS:");
    for (i, gap) in gaps.iter().take(MAX_GAPS_SHOWN).enumerate() {
        let _ = writeln!(out, "   {}. Gap: {}", i + 1, gap);
        let missing: Vec<String> = gap
            .missing_dates
            .iter()
            .map(|d| d.format(DATE_FORMAT).to_string())
            .collect();
        if missing.len() <= MAX_MISSING_LISTED {
            let _ = writeln!(out, "      Missing: {}", missing.join(", "));
        } else {
            let _ = writeln!(
                out,
                "      Missing: {}... and {} more",
                missing[..MISSING_PREVIEW].join(", "),
                missing.len() - MISSING_PREVIEW
            );
        }
    }
    if gaps.len() > MAX_GAPS_SHOWN {
        let _ = writeln!(out, "   ... and {} more gaps", gaps.len() - MAX_GAPS_SHOWN);
    }
    let _ = write!(
        out,
        "\nACTION REQUIRED: Please scan missing planner pages to maintain complete records"
    );
    out
}

fn render_error(error_type: &str, message: &str, context: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "CRITICAL AUTOMATION ERROR");
    let _ = writeln!(out, "{}", rule());
    let _ = writeln!(out, "ERROR DETAILS:");
    let _ = writeln!(out, "   - Type: {}", error_type);
    let _ = writeln!(out, "   - Message: {}", message);
    let _ = writeln!(out, "   - Timestamp: {}", Local::now().format(TIMESTAMP_FORMAT));

    if !context.is_empty() {
        let _ = writeln!(out, "\nCONTEXT INFORMATION:");
        for (key, value) in context {
            let _ = writeln!(out, "   - {}: {}", key, value);
        }
    }
    let _ = write!(out, "\nCheck the automation log for the detailed error trace");
    out
}

/// Where batch outcomes go. Returns whether delivery succeeded; delivery
/// failures never affect processing.
pub trait NotificationSink: Send + Sync {
    fn push(&self, notification: &Notification) -> bool;
}

/// Writes every notification to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn push(&self, notification: &Notification) -> bool {
        let body = notification.render();
        match notification {
            Notification::BatchSummary { .. } => {
                info!("{}", notification.headline());
                info!("\n{}", body);
            }
            Notification::GapReport { .. } => {
                warn!("{}", notification.headline());
                warn!("\n{}", body);
            }
            Notification::CriticalError { .. } => {
                error!("{}", notification.headline());
                error!("\n{}", body);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::time::Duration;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn test_summary_status_thresholds() {
        assert_eq!(summary_status(100.0), "SUCCESS");
        assert_eq!(summary_status(90.0), "SUCCESS");
        assert_eq!(summary_status(75.0), "PARTIAL SUCCESS");
        assert_eq!(summary_status(69.9), "FAILED");
    }

    #[test]
    fn test_summary_samples_files_and_errors() {
        let result = ProcessingResult {
            success_count: 5,
            error_count: 7,
            new_entries: 12,
            processing_time: Duration::from_secs(42),
            errors: (1..=7).map(|i| format!("failure {}", i)).collect(),
            ..ProcessingResult::default()
        };
        let files: Vec<PathBuf> = (1..=12)
            .map(|i| PathBuf::from(format!("/drop/page-{}.jpg", i)))
            .collect();

        let text = Notification::BatchSummary { result, files }.render();
        assert!(text.starts_with("PLANNER PROCESSING FAILED"));
        assert!(text.contains("10. page-10.jpg"));
        assert!(!text.contains("page-11.jpg"));
        assert!(text.contains("... and 2 more files"));
        assert!(text.contains("5. failure 5"));
        assert!(!text.contains("failure 6"));
        assert!(text.contains("... and 2 more errors"));
    }

    #[test]
    fn test_gap_report_abbreviates_long_gaps() {
        let short = DateGap {
            start_date: day("2025-05-26"),
            end_date: day("2025-05-30"),
            missing_dates: vec![day("2025-05-27"), day("2025-05-28"), day("2025-05-29")],
        };
        let long = DateGap {
            start_date: day("2025-06-01"),
            end_date: day("2025-06-09"),
            missing_dates: day("2025-06-02").iter_days().take(7).collect(),
        };

        let text = Notification::GapReport {
            gaps: vec![short, long],
            analyzed_dates: 6,
        }
        .render();
        assert!(text.contains("Missing: 2025-05-27, 2025-05-28, 2025-05-29\n"));
        assert!(text.contains("Missing: 2025-06-02, 2025-06-03, 2025-06-04... and 4 more"));
        assert!(text.contains("Total missing days: 10"));
    }

    #[test]
    fn test_error_report_lists_context() {
        let mut context = BTreeMap::new();
        context.insert("file_count".to_string(), "2".to_string());
        let notification = Notification::CriticalError {
            error_type: "File Processing Error".to_string(),
            message: "boom".to_string(),
            context,
        };

        assert_eq!(notification.headline(), "Critical error - File Processing Error: boom");
        assert!(notification.render().contains("   - file_count: 2"));
        assert!(LogSink.push(&notification));
    }
}
