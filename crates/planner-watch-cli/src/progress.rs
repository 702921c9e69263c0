use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use planner_watch_core::models::{BatchStats, DigitizerResult};
use planner_watch_core::BatchReporter;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// Batch progress as an indicatif bar: one tick per finished file, failed
/// attempts printed above the bar.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.bar.lock().unwrap();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        let mut guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.take() {
            pb.finish_and_clear();
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        let guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.as_ref() {
            f(pb);
        }
    }
}

impl BatchReporter for CliReporter {
    fn on_batch_start(&self, total_files: usize) {
        let pb = ProgressBar::new(total_files as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "  {spinner:.cyan} Batch {prefix} [{bar:30.cyan/dim}] {pos}/{len} files {msg}",
            )
            .unwrap()
            .progress_chars("━╸─")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_chunk_start(&self, chunk: usize, total_chunks: usize, _files: usize) {
        self.with_bar(|pb| pb.set_prefix(format!("{}/{}", chunk, total_chunks)));
    }

    fn on_file_start(&self, _index: usize, path: &Path) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.with_bar(|pb| pb.set_message(name));
    }

    fn on_attempt_failed(&self, path: &Path, attempt: u32, error: &str) {
        self.with_bar(|pb| {
            pb.println(format!(
                "  {} attempt {} failed for {}: {}",
                "!".yellow(),
                attempt,
                path.display(),
                error
            ))
        });
    }

    fn on_file_complete(&self, result: &DigitizerResult) {
        self.with_bar(|pb| {
            if !result.success {
                pb.println(format!(
                    "  {} {}",
                    "✗".red(),
                    result.image_path.display()
                ));
            }
            pb.inc(1);
        });
    }

    fn on_batch_complete(&self, stats: &BatchStats) {
        self.finish_bar();
        eprintln!(
            "  {} Batch complete: {} succeeded, {} failed in {:.2}s",
            "✓".green(),
            stats.success_count,
            stats.error_count,
            stats.total_time.as_secs_f64()
        );
    }
}
