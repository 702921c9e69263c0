use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;

use planner_watch_core::config::parse_configuration;
use planner_watch_core::dates::ExistingDateIndex;
use planner_watch_core::digitizer::{Extractor, ProcessingConfig, RetryOrchestrator, ServiceError};
use planner_watch_core::models::{Action, ExtractionOutput, DATE_FORMAT};
use planner_watch_core::watcher::{FileEvent, FolderWatcher, ManualClock, WatchConfig};
use planner_watch_core::{Coordinator, Notification, NotificationSink};

/// Forwards every notification to a channel so tests can wait on it.
struct ChannelSink {
    tx: Mutex<mpsc::Sender<Notification>>,
}

impl NotificationSink for ChannelSink {
    fn push(&self, notification: &Notification) -> bool {
        self.tx.lock().unwrap().send(notification.clone()).is_ok()
    }
}

fn channel_sink() -> (Arc<ChannelSink>, mpsc::Receiver<Notification>) {
    let (tx, rx) = mpsc::channel();
    (Arc::new(ChannelSink { tx: Mutex::new(tx) }), rx)
}

/// Dates each page from its file stem; stems starting with `torn` never succeed.
struct StemExtractor {
    calls: AtomicUsize,
}

impl Extractor for StemExtractor {
    fn extract(&self, image: &Path, _timeout: Duration) -> Result<ExtractionOutput, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let stem = image.file_stem().unwrap().to_string_lossy().into_owned();
        if stem.starts_with("torn") {
            return Err(ServiceError::Status {
                code: Some(1),
                message: "page could not be read".to_string(),
            });
        }
        Ok(ExtractionOutput {
            date: NaiveDate::parse_from_str(&stem, DATE_FORMAT).ok(),
            data: serde_json::json!({ "stem": stem }),
        })
    }
}

fn fast_processing() -> ProcessingConfig {
    ProcessingConfig {
        max_attempts: 3,
        retry_delay: Duration::ZERO,
        timeout: Duration::from_secs(5),
        batch_size: 2,
        inter_file_delay: Duration::ZERO,
        ..ProcessingConfig::default()
    }
}

fn drop_page(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, b"scan").unwrap();
    path
}

#[test]
fn test_fired_batch_flows_into_summary() {
    let dir = tempdir().unwrap();
    let (sink, notifications) = channel_sink();
    let extractor = Arc::new(StemExtractor {
        calls: AtomicUsize::new(0),
    });
    let coordinator = Arc::new(Coordinator::new(
        RetryOrchestrator::new(fast_processing(), extractor.clone()),
        sink,
    ));

    let clock = Arc::new(ManualClock::new());
    let watcher = FolderWatcher::with_clock(
        &WatchConfig {
            folder: dir.path().to_path_buf(),
            quiet_period: Duration::from_secs(120),
            extensions: vec!["jpg".to_string()],
            ignore_patterns: Vec::new(),
        },
        coordinator.batch_callback(),
        clock.clone(),
    )
    .unwrap();
    watcher.start_timer().unwrap();

    for name in ["2025-05-25.jpg", "2025-05-26.jpg", "torn.jpg"] {
        watcher.on_event(FileEvent::created(drop_page(dir.path(), name)));
    }
    clock.advance(Duration::from_secs(121));
    watcher.tick();

    match notifications.recv_timeout(Duration::from_secs(10)).unwrap() {
        Notification::BatchSummary { result, files } => {
            assert_eq!(files.len(), 3);
            assert_eq!(result.success_count, 2);
            assert_eq!(result.error_count, 1);
            assert_eq!(result.new_entries, 3);
            assert_eq!(result.errors.len(), 1);
            assert!(result.errors[0].contains("page could not be read"));
        }
        other => panic!("expected a batch summary, got {:?}", other),
    }
    // torn.jpg used every attempt.
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 5);
    watcher.stop();
}

#[test]
fn test_process_existing_then_gap_report() {
    let dir = tempdir().unwrap();
    for name in ["2025-05-25.jpg", "2025-05-31.jpg", "2025-05-30.jpg"] {
        drop_page(dir.path(), name);
    }

    let (sink, notifications) = channel_sink();
    let extractor = Arc::new(StemExtractor {
        calls: AtomicUsize::new(0),
    });
    let coordinator = Coordinator::new(
        RetryOrchestrator::new(fast_processing(), extractor.clone()),
        sink,
    )
    .with_decision_filter(Arc::new(planner_watch_core::dates::DatedDecisionFilter::new(
        extractor,
        Duration::from_secs(5),
    )))
    .with_index(ExistingDateIndex::from_entries([("2025-05-26", "page-26")]));

    let watcher = FolderWatcher::new(
        &WatchConfig {
            folder: dir.path().to_path_buf(),
            quiet_period: Duration::from_secs(120),
            extensions: vec!["jpg".to_string()],
            ignore_patterns: Vec::new(),
        },
        Arc::new(|_: Vec<PathBuf>| {}),
    )
    .unwrap();

    let report = coordinator.process_existing(&watcher, 10).unwrap().unwrap();
    assert!(report.decisions.iter().all(|(_, d)| d.action == Action::New));
    assert_eq!(report.results.len(), 3);

    assert!(matches!(
        notifications.recv_timeout(Duration::from_secs(5)).unwrap(),
        Notification::BatchSummary { .. }
    ));
    match notifications.recv_timeout(Duration::from_secs(5)).unwrap() {
        Notification::GapReport { gaps, analyzed_dates } => {
            assert_eq!(analyzed_dates, 3);
            assert_eq!(gaps.len(), 1);
            assert_eq!(gaps[0].start_date, NaiveDate::from_ymd_opt(2025, 5, 26).unwrap());
            assert_eq!(gaps[0].end_date, NaiveDate::from_ymd_opt(2025, 5, 30).unwrap());
            assert_eq!(gaps[0].missing_dates.len(), 3);
        }
        other => panic!("expected a gap report, got {:?}", other),
    }
}

/// Drops another page into the folder the first time it is called.
struct LateDropExtractor {
    folder: PathBuf,
    dropped: AtomicBool,
}

impl Extractor for LateDropExtractor {
    fn extract(&self, _image: &Path, _timeout: Duration) -> Result<ExtractionOutput, ServiceError> {
        if !self.dropped.swap(true, Ordering::SeqCst) {
            drop_page(&self.folder, "late.jpg");
            std::thread::sleep(Duration::from_millis(200));
        }
        Ok(ExtractionOutput {
            date: None,
            data: serde_json::Value::Null,
        })
    }
}

#[test]
fn test_page_dropped_during_startup_is_processed() {
    let dir = tempdir().unwrap();
    drop_page(dir.path(), "waiting.jpg");

    let (sink, notifications) = channel_sink();
    let extractor = Arc::new(LateDropExtractor {
        folder: dir.path().to_path_buf(),
        dropped: AtomicBool::new(false),
    });
    let coordinator = Arc::new(Coordinator::new(
        RetryOrchestrator::new(fast_processing(), extractor),
        sink,
    ));
    let watcher = FolderWatcher::new(
        &WatchConfig {
            folder: dir.path().to_path_buf(),
            quiet_period: Duration::from_millis(300),
            extensions: vec!["jpg".to_string()],
            ignore_patterns: Vec::new(),
        },
        coordinator.batch_callback(),
    )
    .unwrap();

    coordinator.start_watching(&watcher, Some(10)).unwrap();

    let batch_names = |notification: Notification| match notification {
        Notification::BatchSummary { files, .. } => files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
            .collect::<Vec<_>>(),
        other => panic!("expected a batch summary, got {:?}", other),
    };
    let startup = batch_names(notifications.recv_timeout(Duration::from_secs(5)).unwrap());
    assert_eq!(startup, vec!["waiting.jpg"]);
    let live = batch_names(notifications.recv_timeout(Duration::from_secs(10)).unwrap());
    assert_eq!(live, vec!["late.jpg"]);

    watcher.stop();
}

#[test]
fn test_startup_processing_can_be_skipped() {
    let dir = tempdir().unwrap();
    drop_page(dir.path(), "waiting.jpg");

    let (sink, notifications) = channel_sink();
    let extractor = Arc::new(StemExtractor {
        calls: AtomicUsize::new(0),
    });
    let coordinator = Arc::new(Coordinator::new(
        RetryOrchestrator::new(fast_processing(), extractor.clone()),
        sink,
    ));
    let watcher = FolderWatcher::new(
        &WatchConfig {
            folder: dir.path().to_path_buf(),
            quiet_period: Duration::from_secs(120),
            extensions: vec!["jpg".to_string()],
            ignore_patterns: Vec::new(),
        },
        coordinator.batch_callback(),
    )
    .unwrap();

    coordinator.start_watching(&watcher, None).unwrap();
    assert!(watcher.is_running());
    assert!(notifications.recv_timeout(Duration::from_millis(200)).is_err());
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    watcher.stop();
}

#[test]
fn test_empty_folder_has_nothing_to_process() {
    let dir = tempdir().unwrap();
    let (sink, notifications) = channel_sink();
    let coordinator = Coordinator::new(
        RetryOrchestrator::new(
            fast_processing(),
            Arc::new(StemExtractor {
                calls: AtomicUsize::new(0),
            }),
        ),
        sink,
    );
    let watcher = FolderWatcher::new(
        &WatchConfig {
            folder: dir.path().to_path_buf(),
            quiet_period: Duration::from_secs(120),
            extensions: vec!["jpg".to_string()],
            ignore_patterns: Vec::new(),
        },
        Arc::new(|_: Vec<PathBuf>| {}),
    )
    .unwrap();

    assert!(coordinator.process_existing(&watcher, 10).unwrap().is_none());
    assert!(notifications.try_recv().is_err());
}

#[cfg(unix)]
#[test]
fn test_configured_commands_end_to_end() {
    let dir = tempdir().unwrap();
    let drop_dir = dir.path().join("drop");
    fs::create_dir_all(&drop_dir).unwrap();
    let summary = dir.path().join("pages_summary.json");
    fs::write(
        &summary,
        r#"{"pages": [{"date": "2025-05-28", "id": "existing-page"}]}"#,
    )
    .unwrap();
    let uploads = dir.path().join("uploads.jsonl");

    let toml = format!(
        r#"
watch_folder = "{drop}"
retry_delay_secs = 0
inter_file_delay_ms = 0
timeout_secs = 10

[extractor]
program = "sh"
args = ["-c", "echo '{{\"date\": \"2025-05-28\", \"source\": \"'\"$0\"'\"}}'", "{{path}}"]
parser_type = "shell"

[uploader]
program = "sh"
args = ["-c", "cat >> {uploads}; echo >> {uploads}"]

[date_index]
summary_file = "{summary}"
"#,
        drop = drop_dir.display(),
        uploads = uploads.display(),
        summary = summary.display(),
    );
    let config = parse_configuration(&toml).unwrap();
    let (sink, notifications) = channel_sink();
    let coordinator = Coordinator::from_config(&config, sink).unwrap();

    let page = drop_page(&drop_dir, "page.jpg");
    let report = coordinator.handle_batch(vec![page]);

    assert_eq!(report.decisions[0].1.action, Action::Update);
    assert_eq!(report.decisions[0].1.existing_id.as_deref(), Some("existing-page"));
    assert!(report.results[0].success, "{:?}", report.results[0].error_message);
    assert_eq!(coordinator.index().len(), 1);

    let uploaded = fs::read_to_string(&uploads).unwrap();
    let line: serde_json::Value = serde_json::from_str(uploaded.lines().next().unwrap()).unwrap();
    assert_eq!(line["date"], "2025-05-28");
    assert!(line["data"]["source"].as_str().unwrap().ends_with("page.jpg"));

    assert!(matches!(
        notifications.recv_timeout(Duration::from_secs(5)).unwrap(),
        Notification::BatchSummary { .. }
    ));
}
