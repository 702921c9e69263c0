pub mod debounce;
pub mod existing;
pub mod filter;
pub mod folder;

use std::path::PathBuf;
use std::time::Duration;

pub use debounce::{Clock, Debouncer, ManualClock, Poll, SystemClock};
pub use filter::FileFilter;
pub use folder::{BatchCallback, FolderWatcher};

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub folder: PathBuf,
    pub quiet_period: Duration,
    pub extensions: Vec<String>,
    pub ignore_patterns: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Created,
    MovedIn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
}

impl FileEvent {
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: FileEventKind::Created,
        }
    }

    pub fn moved_in(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: FileEventKind::MovedIn,
        }
    }
}
