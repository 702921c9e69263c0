use std::env;
use std::ffi::OsStr;
use std::path::Path;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_FILE: &str = "./logs/planner-watch.log";

/// `LOG_ROTATION` picks how often the automation log rolls over.
fn rotation() -> (Rotation, &'static str) {
    match env::var("LOG_ROTATION").as_deref() {
        Ok("hourly") => (Rotation::HOURLY, "hourly"),
        Ok("never") => (Rotation::NEVER, "no"),
        _ => (Rotation::DAILY, "daily"),
    }
}

/// Directory and file-name prefix for the rolling appender.
fn split_log_path(path: &Path) -> (&Path, &OsStr) {
    let directory = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .unwrap_or_else(|| OsStr::new("planner-watch.log"));
    (directory, file_name)
}

/// Terminal output stays compact because batches print their own reports.
/// The file log carries thread names so timer-thread batches can be told
/// apart from startup processing.
pub fn init_logger() -> WorkerGuard {
    let filter = env::var("TRACING_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter_layer = EnvFilter::new(filter);

    let log_file_path = env::var("LOG_FILE_PATH").unwrap_or_else(|_| DEFAULT_LOG_FILE.to_string());
    let log_file_path = Path::new(&log_file_path);
    let (directory, file_name) = split_log_path(log_file_path);

    let (rotation, rotation_name) = rotation();
    let file_appender = RollingFileAppender::new(rotation, directory, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .compact()
                .with_target(false)
                .with_thread_names(true)
                .without_time()
                .with_ansi(true),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_thread_names(true)
                .with_ansi(false),
        )
        .with(filter_layer)
        .init();

    info!("Logging to {} ({} rotation)", log_file_path.display(), rotation_name);

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_log_path() {
        let (dir, name) = split_log_path(Path::new(DEFAULT_LOG_FILE));
        assert_eq!(dir, Path::new("./logs"));
        assert_eq!(name, "planner-watch.log");

        let (dir, name) = split_log_path(Path::new("automation.log"));
        assert_eq!(dir, Path::new("."));
        assert_eq!(name, "automation.log");

        let (dir, name) = split_log_path(Path::new("/"));
        assert_eq!(dir, Path::new("."));
        assert_eq!(name, "planner-watch.log");
    }
}
