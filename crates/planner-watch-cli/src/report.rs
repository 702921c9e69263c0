use colored::*;
use planner_watch_core::notification::summary_status;
use planner_watch_core::{LogSink, Notification, NotificationSink};
use std::io::{self, IsTerminal};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Prints notifications to the terminal in colour and records the headline
/// in the log.
pub struct ConsoleSink;

impl NotificationSink for ConsoleSink {
    fn push(&self, notification: &Notification) -> bool {
        let headline = notification.headline();
        let banner = match notification {
            Notification::BatchSummary { result, .. } => {
                info!("{}", headline);
                match summary_status(result.success_rate()) {
                    "SUCCESS" => headline.green(),
                    "PARTIAL SUCCESS" => headline.yellow(),
                    _ => headline.red(),
                }
            }
            Notification::GapReport { .. } => {
                warn!("{}", headline);
                headline.yellow()
            }
            Notification::CriticalError { .. } => {
                error!("{}", headline);
                headline.red().bold()
            }
        };

        println!();
        println!("{}", banner);
        println!("{}", notification.render());
        true
    }
}

/// Coloured console reports on a terminal; plain log records when running
/// under a service manager or with output redirected.
pub fn notification_sink(interactive: bool) -> Arc<dyn NotificationSink> {
    if interactive {
        Arc::new(ConsoleSink)
    } else {
        Arc::new(LogSink)
    }
}

pub fn stdout_is_terminal() -> bool {
    io::stdout().is_terminal()
}
