pub mod config;
pub mod coordinator;
pub mod dates;
pub mod digitizer;
pub mod error;
pub mod models;
pub mod notification;
pub mod progress;
pub mod watcher;

pub use config::AppConfig;
pub use coordinator::{BatchReport, Coordinator};
pub use error::Error;
pub use notification::{LogSink, Notification, NotificationSink};
pub use progress::{BatchReporter, SilentReporter};
pub use watcher::FolderWatcher;
