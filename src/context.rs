//! Shared state threaded through every resource operation.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::agreement::{AgreementGate, Prompt};
use crate::download::{Downloader, HttpDownloader};
use crate::exec::{Executor, SystemExecutor};
use crate::logging::Log;
use crate::resources::commands::CommandSet;

/// Everything resource construction, acquisition and install need, passed
/// explicitly instead of living in globals.
pub struct BuildContext {
    /// Directory artifacts are downloaded into by default.
    pub download_dir: PathBuf,
    /// Logger for output and summary recording.
    pub log: Arc<dyn Log>,
    /// Runs installers and package managers.
    pub executor: Arc<dyn Executor>,
    /// Fetches remote artifacts.
    pub downloader: Arc<dyn Downloader>,
    /// Command templates for every install mechanism.
    pub commands: CommandSet,
    /// Consent gate checked on resource construction.
    pub gate: AgreementGate,
    /// Keep building remaining top-level resources after a failure.
    pub continue_on_error: bool,
}

impl std::fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildContext")
            .field("download_dir", &self.download_dir)
            .field("log", &"<dyn Log>")
            .field("executor", &self.executor)
            .field("downloader", &self.downloader)
            .field("commands", &self.commands)
            .field("gate", &self.gate)
            .field("continue_on_error", &self.continue_on_error)
            .finish()
    }
}

impl BuildContext {
    /// Create a context with the system executor, an HTTP downloader and
    /// the default command templates.
    #[must_use]
    pub fn new(download_dir: PathBuf, log: Arc<dyn Log>, prompt: Box<dyn Prompt>) -> Self {
        Self {
            download_dir,
            log,
            executor: Arc::new(SystemExecutor::new()),
            downloader: Arc::new(HttpDownloader::default()),
            commands: CommandSet::default(),
            gate: AgreementGate::new(prompt),
            continue_on_error: false,
        }
    }

    /// Replace the executor.
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    /// Replace the downloader.
    #[must_use]
    pub fn with_downloader(mut self, downloader: Arc<dyn Downloader>) -> Self {
        self.downloader = downloader;
        self
    }

    /// Replace the command templates.
    #[must_use]
    pub fn with_commands(mut self, commands: CommandSet) -> Self {
        self.commands = commands;
        self
    }

    /// Set the failure policy of [`build`](crate::pipeline::build).
    #[must_use]
    pub const fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Default artifact path for `label` with `extension`.
    #[must_use]
    pub fn default_target(&self, label: &str, extension: &str) -> PathBuf {
        self.download_dir.join(format!("{label}{extension}"))
    }

    /// Download directory.
    #[must_use]
    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }
}
