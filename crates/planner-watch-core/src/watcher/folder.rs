//! Drop-folder watcher with a pause trigger.
//!
//! A `notify::RecommendedWatcher` feeds qualifying events into a shared
//! [`Debouncer`]; a dedicated timer thread sleeps until the quiet period has
//! elapsed and then hands the accumulated batch to the callback. The batch is
//! swapped out under the state lock and the callback runs outside it, so
//! events arriving mid-callback start the next batch instead of extending the
//! one in flight.

use notify::event::{AccessKind, AccessMode, CreateKind, ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

use super::debounce::{Clock, Debouncer, Poll, SystemClock};
use super::existing;
use super::filter::FileFilter;
use super::{FileEvent, FileEventKind, WatchConfig};
use crate::error::Error;

pub type BatchCallback = Arc<dyn Fn(Vec<PathBuf>) + Send + Sync>;

pub struct FolderWatcher {
    folder: PathBuf,
    shared: Arc<Shared>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    state: Mutex<TimerState>,
    wake: Condvar,
    clock: Arc<dyn Clock>,
    filter: FileFilter,
    callback: BatchCallback,
}

struct TimerState {
    debouncer: Debouncer,
    running: bool,
}

impl FolderWatcher {
    pub fn new(config: &WatchConfig, callback: BatchCallback) -> Result<Self, Error> {
        Self::with_clock(config, callback, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: &WatchConfig,
        callback: BatchCallback,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, Error> {
        let folder = &config.folder;
        if !folder.exists() {
            error!("Watch folder does not exist: {}", folder.display());
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Watch folder not found: {}", folder.display()),
            )));
        }
        if !folder.is_dir() {
            error!("Watch path is not a directory: {}", folder.display());
            return Err(Error::Other(format!(
                "Watch path is not a directory: {}",
                folder.display()
            )));
        }

        info!(
            "Folder watcher initialized for {} (pause trigger {:?})",
            folder.display(),
            config.quiet_period
        );

        Ok(Self {
            folder: folder.clone(),
            shared: Arc::new(Shared {
                state: Mutex::new(TimerState {
                    debouncer: Debouncer::new(config.quiet_period),
                    running: false,
                }),
                wake: Condvar::new(),
                clock,
                filter: FileFilter::new(&config.extensions, &config.ignore_patterns),
                callback,
            }),
            watcher: Mutex::new(None),
            timer: Mutex::new(None),
        })
    }

    /// Start the timer thread and the OS watch. Calling it twice is a no-op.
    pub fn start(&self) -> Result<(), Error> {
        self.start_timer()?;

        let mut watcher_slot = lock(&self.watcher);
        if watcher_slot.is_some() {
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    for file_event in classify(&event) {
                        shared.on_event(file_event);
                    }
                }
                Err(e) => warn!("Filesystem watcher error: {}", e),
            },
            notify::Config::default(),
        );

        let mut watcher = match watcher {
            Ok(w) => w,
            Err(e) => {
                drop(watcher_slot);
                self.stop();
                return Err(e.into());
            }
        };

        if let Err(e) = watcher.watch(&self.folder, RecursiveMode::Recursive) {
            error!("Failed to start folder watcher: {}", e);
            drop(watcher_slot);
            self.stop();
            return Err(e.into());
        }

        *watcher_slot = Some(watcher);
        info!(
            "Started watching {} for: {}",
            self.folder.display(),
            self.shared.filter.extensions().join(", ")
        );
        Ok(())
    }

    /// Start only the debounce timer, without an OS watch. Events are then
    /// delivered through [`FolderWatcher::on_event`].
    pub fn start_timer(&self) -> Result<(), Error> {
        let mut timer_slot = lock(&self.timer);
        if timer_slot.is_some() {
            warn!("Folder watcher is already running");
            return Ok(());
        }

        self.shared.lock_state().running = true;

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("planner-watch-timer".to_string())
            .spawn(move || run_timer(shared))?;
        *timer_slot = Some(handle);
        Ok(())
    }

    /// Stop watching. Cancels the armed timer, releases the OS watch, and waits
    /// for a callback already in flight. Safe to call from any thread, including
    /// from inside the callback itself.
    pub fn stop(&self) {
        {
            let mut state = self.shared.lock_state();
            state.running = false;
            state.debouncer.cancel();
        }
        self.shared.wake.notify_all();

        if lock(&self.watcher).take().is_some() {
            debug!("Released watch on {}", self.folder.display());
        }

        let handle = lock(&self.timer).take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                // Called from the callback; the timer loop exits on its own.
                debug!("Folder watcher stop requested from the timer thread");
            } else if handle.join().is_err() {
                warn!("Folder watcher timer thread did not stop gracefully");
            }
            info!("Folder watcher stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        let running = self.shared.lock_state().running;
        running && lock(&self.timer).is_some()
    }

    /// Feed one event through the filter and into the pending batch.
    /// Returns `true` if the event armed or reset the timer.
    pub fn on_event(&self, event: FileEvent) -> bool {
        self.shared.on_event(event)
    }

    /// Re-evaluate the deadline now. Only needed with a manual clock.
    pub fn tick(&self) {
        let _state = self.shared.lock_state();
        self.shared.wake.notify_all();
    }

    /// Take the pending batch without waiting for the quiet period.
    pub fn flush(&self) -> Vec<PathBuf> {
        self.shared.lock_state().debouncer.flush()
    }

    pub fn pending_len(&self) -> usize {
        self.shared.lock_state().debouncer.pending_len()
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn filter(&self) -> &FileFilter {
        &self.shared.filter
    }

    /// Supported files already present in the folder, newest first.
    pub fn existing_files(&self, limit: Option<usize>) -> Result<Vec<PathBuf>, Error> {
        Ok(existing::scan_existing(&self.folder, &self.shared.filter, limit)?)
    }
}

impl Drop for FolderWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, TimerState> {
        lock(&self.state)
    }

    fn on_event(&self, event: FileEvent) -> bool {
        let path = event.path;
        if path.is_dir() || !self.filter.is_supported(&path) {
            return false;
        }

        if let Err(e) = FileFilter::check_ready(&path) {
            debug!("{}; waiting for a later event", e);
            return false;
        }

        {
            let mut state = self.lock_state();
            if !state.running {
                debug!("Ignoring {} after stop", path.display());
                return false;
            }
            let name = display_name(&path);
            if state.debouncer.record(path, self.clock.now()) {
                match event.kind {
                    FileEventKind::Created => info!("New file detected: {}", name),
                    FileEventKind::MovedIn => info!("File moved to watch folder: {}", name),
                }
            }
            debug!("Timer reset for {:?}", state.debouncer.quiet_period());
        }

        self.wake.notify_all();
        true
    }
}

fn run_timer(shared: Arc<Shared>) {
    let mut state = shared.lock_state();
    loop {
        if !state.running {
            break;
        }

        match state.debouncer.poll(shared.clock.now()) {
            Poll::Idle => {
                state = shared.wake.wait(state).unwrap_or_else(|e| e.into_inner());
            }
            Poll::Wait(remaining) => {
                state = shared
                    .wake
                    .wait_timeout(state, remaining)
                    .unwrap_or_else(|e| e.into_inner())
                    .0;
            }
            Poll::Fire(batch) => {
                drop(state);
                info!("Pause trigger activated. Processing {} files", batch.len());
                let callback = Arc::clone(&shared.callback);
                if panic::catch_unwind(AssertUnwindSafe(|| callback(batch))).is_err() {
                    error!("Batch callback panicked; watcher keeps running");
                }
                state = shared.lock_state();
            }
        }
    }
    debug!("Folder watcher timer thread exiting");
}

/// Map a raw notify event onto the two event kinds the trigger cares about.
/// A close-after-write counts as a creation so a file first seen empty is
/// picked up once its writer finishes.
pub(crate) fn classify(event: &notify::Event) -> Vec<FileEvent> {
    match event.kind {
        EventKind::Create(CreateKind::Folder) => Vec::new(),
        EventKind::Create(_) | EventKind::Access(AccessKind::Close(AccessMode::Write)) => event
            .paths
            .iter()
            .cloned()
            .map(FileEvent::created)
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event
            .paths
            .iter()
            .cloned()
            .map(FileEvent::moved_in)
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => event
            .paths
            .last()
            .cloned()
            .map(FileEvent::moved_in)
            .into_iter()
            .collect(),
        _ => Vec::new(),
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
