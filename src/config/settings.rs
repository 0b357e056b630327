//! User settings loaded from `config.toml`.
//!
//! Every key is optional; command-line flags take precedence over the file.
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use super::toml_loader::load_config;
use crate::error::ConfigError;
use crate::platform::Platform;
use crate::resources::commands::{CommandSet, CommandTemplate};

/// Settings file contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Directory artifacts are downloaded into.
    pub download_dir: Option<PathBuf>,
    /// Keep building after a failing resource.
    pub continue_on_error: bool,
    /// Kill installers still running after this many seconds.
    pub process_timeout_secs: Option<u64>,
    /// Abort transfers taking longer than this many seconds.
    pub download_timeout_secs: Option<u64>,
    /// Show download progress bars (default `true`).
    pub progress: Option<bool>,
    /// Command template overrides.
    pub commands: CommandOverrides,
}

/// Per-operation command overrides; unset entries keep the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommandOverrides {
    /// Launches an exe installer.
    pub exe: Option<CommandTemplate>,
    /// Launches an msi installer.
    pub msi: Option<CommandTemplate>,
    /// Installs a local package file.
    pub deb: Option<CommandTemplate>,
    /// Refreshes the package index.
    pub refresh: Option<CommandTemplate>,
    /// Installs one named package.
    pub install_package: Option<CommandTemplate>,
    /// Registers a package repository.
    pub add_repository: Option<CommandTemplate>,
}

impl Settings {
    /// Load settings from `path`; a missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        load_config(path)
    }

    /// `<config dir>/provision/config.toml` for `platform`.
    #[must_use]
    pub fn default_path(platform: &Platform) -> Option<PathBuf> {
        platform
            .config_dir()
            .map(|dir| dir.join("provision").join("config.toml"))
    }

    /// Installer deadline, if configured.
    #[must_use]
    pub fn process_timeout(&self) -> Option<Duration> {
        self.process_timeout_secs.map(Duration::from_secs)
    }

    /// Transfer deadline, if configured.
    #[must_use]
    pub fn download_timeout(&self) -> Option<Duration> {
        self.download_timeout_secs.map(Duration::from_secs)
    }

    /// Whether progress bars are enabled.
    #[must_use]
    pub fn show_progress(&self) -> bool {
        self.progress.unwrap_or(true)
    }

    /// Default command templates with this file's overrides applied.
    #[must_use]
    pub fn command_set(&self) -> CommandSet {
        let mut set = CommandSet::default();
        let overrides = &self.commands;
        let slots = [
            (&mut set.exe, &overrides.exe),
            (&mut set.msi, &overrides.msi),
            (&mut set.deb, &overrides.deb),
            (&mut set.refresh, &overrides.refresh),
            (&mut set.install_package, &overrides.install_package),
            (&mut set.add_repository, &overrides.add_repository),
        ];
        for (slot, replacement) in slots {
            if let Some(template) = replacement {
                slot.clone_from(template);
            }
        }
        set
    }
}
