//! Console/file logger with per-resource summary collection.
use std::path::PathBuf;
use std::sync::Mutex;

use super::subscriber::STAGE_TARGET;
use super::types::{BuildStatus, Log, ResourceEntry};
use super::utils::log_file_path;

/// Implement the display methods of [`Log`] by delegating to inherent methods
/// of the same name on the implementing type.
macro_rules! forward_log_methods {
    ($($method:ident),+ $(,)?) => {
        $(
            fn $method(&self, msg: &str) {
                self.$method(msg);
            }
        )+
    };
}

/// Logger that forwards to [`tracing`] and collects resource outcomes.
///
/// Messages are always mirrored to `$XDG_CACHE_HOME/provision/<command>.log`
/// by the file layer installed in
/// [`init_subscriber`](super::subscriber::init_subscriber).
#[derive(Debug)]
pub struct Logger {
    resources: Mutex<Vec<ResourceEntry>>,
    log_file: Option<PathBuf>,
}

impl Logger {
    /// Create a new logger for `command`.
    ///
    /// Only remembers the log file path for the summary; the file itself is
    /// created by the subscriber.
    #[must_use]
    pub fn new(command: &str) -> Self {
        Self {
            resources: Mutex::new(Vec::new()),
            log_file: log_file_path(command),
        }
    }

    /// Return the log file path, if available.
    #[cfg(test)]
    pub const fn log_path(&self) -> Option<&PathBuf> {
        self.log_file.as_ref()
    }

    /// Return a clone of all recorded resource entries.
    #[must_use]
    pub fn resource_entries(&self) -> Vec<ResourceEntry> {
        self.resources.lock().map_or_else(|_| vec![], |g| g.clone())
    }

    /// Log an error message.
    pub fn error(&self, msg: &str) {
        tracing::error!("{msg}");
    }

    /// Log a warning message.
    pub fn warn(&self, msg: &str) {
        tracing::warn!("{msg}");
    }

    /// Log a stage header.
    pub fn stage(&self, msg: &str) {
        tracing::info!(target: STAGE_TARGET, "{msg}");
    }

    /// Log an informational message.
    pub fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    /// Log a debug message (suppressed on console unless verbose).
    pub fn debug(&self, msg: &str) {
        tracing::debug!("{msg}");
    }

    /// Record a resource result for the summary.
    pub fn record_resource(&self, label: &str, status: BuildStatus, message: Option<&str>) {
        if let Ok(mut guard) = self.resources.lock() {
            guard.push(ResourceEntry {
                label: label.to_string(),
                status,
                message: message.map(String::from),
            });
        }
    }

    /// Count the number of failed resources.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.resources.lock().map_or(0, |guard| {
            guard
                .iter()
                .filter(|r| r.status == BuildStatus::Failed)
                .count()
        })
    }

    /// Print the summary of all recorded resources.
    #[allow(clippy::print_stdout)]
    pub fn print_summary(&self) {
        let entries = self.resource_entries();
        if entries.is_empty() {
            return;
        }

        println!();
        self.stage("Summary");

        let mut ok = 0u32;
        let mut skipped = 0u32;
        let mut failed = 0u32;

        for entry in &entries {
            let (icon, color) = match entry.status {
                BuildStatus::Ok => {
                    ok += 1;
                    ("✓", "\x1b[32m")
                }
                BuildStatus::Skipped => {
                    skipped += 1;
                    ("○", "\x1b[33m")
                }
                BuildStatus::Failed => {
                    failed += 1;
                    ("✗", "\x1b[31m")
                }
            };

            let suffix = entry
                .message
                .as_ref()
                .map_or_else(String::new, |msg| format!(" ({msg})"));

            self.info(&format!("{color}{icon} {}{suffix}\x1b[0m", entry.label));
        }

        println!();
        let total = ok + skipped + failed;
        self.info(&format!(
            "{total} resources: \x1b[32m{ok} ok\x1b[0m, \x1b[33m{skipped} skipped\x1b[0m, \x1b[31m{failed} failed\x1b[0m"
        ));

        if let Some(path) = &self.log_file {
            self.info(&format!("\x1b[2mlog: {}\x1b[0m", path.display()));
        }
    }
}

impl Log for Logger {
    forward_log_methods!(stage, info, debug, warn, error);

    fn record_resource(&self, label: &str, status: BuildStatus, message: Option<&str>) {
        self.record_resource(label, status, message);
    }
}
