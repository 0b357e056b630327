//! The `build` subcommand: wire the real executor and downloader into a
//! [`BuildContext`] and build every resource file given on the command line.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};

use crate::agreement::TerminalPrompt;
use crate::cli::{BuildOpts, GlobalOpts};
use crate::config::settings::Settings;
use crate::context::BuildContext;
use crate::download::HttpDownloader;
use crate::error::ProvisionError;
use crate::exec::SystemExecutor;
use crate::logging::{Log, Logger};
use crate::pipeline;
use crate::platform::Platform;

/// Run the build command.
///
/// # Errors
///
/// Returns an error if settings or resource files fail to load, the
/// installation agreement is declined, or any resource fails to build.
pub fn run(global: &GlobalOpts, opts: &BuildOpts, log: &Arc<Logger>) -> Result<()> {
    let platform = Platform::detect();

    let version = option_env!("PROVISION_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"));
    log.info(&format!("provision {version}"));

    log.stage("Loading configuration");
    let settings = load_settings(global, &platform)?;
    let download_dir = resolve_download_dir(
        opts.download_dir.as_deref(),
        &settings,
        platform.default_download_dir(),
    )?;
    log.debug(&format!("download directory: {}", download_dir.display()));

    let sink: Arc<dyn Log> = log.clone();
    let ctx = BuildContext::new(download_dir, sink, Box::new(TerminalPrompt))
        .with_executor(Arc::new(SystemExecutor::with_timeout(
            settings.process_timeout(),
        )))
        .with_downloader(Arc::new(HttpDownloader::new(
            settings.download_timeout(),
            settings.show_progress() && !opts.no_progress,
        )))
        .with_commands(settings.command_set())
        .with_continue_on_error(opts.continue_on_error || settings.continue_on_error);

    let result = pipeline::build_files(&ctx, &opts.files, opts.accept_agreement);
    log.print_summary();

    match result {
        Ok(report) => {
            log.debug(&format!(
                "built {}, skipped {}",
                report.built.len(),
                report.skipped.len()
            ));
            Ok(())
        }
        Err(ProvisionError::Build(e)) => {
            let count = log.failure_count();
            Err(anyhow::Error::new(e).context(format!("{count} resource(s) failed")))
        }
        Err(e) => Err(e.into()),
    }
}

/// Load settings from `--config`, or from the platform default path when
/// no flag is given.
fn load_settings(global: &GlobalOpts, platform: &Platform) -> Result<Settings> {
    if let Some(path) = &global.config {
        if !path.is_file() {
            anyhow::bail!("settings file not found: {}", path.display());
        }
        return Ok(Settings::load(path)?);
    }
    match Settings::default_path(platform) {
        Some(path) => Ok(Settings::load(&path)?),
        None => Ok(Settings::default()),
    }
}

/// Pick the download directory: command-line flag, then settings, then the
/// platform default.
fn resolve_download_dir(
    flag: Option<&Path>,
    settings: &Settings,
    platform_default: Option<PathBuf>,
) -> Result<PathBuf> {
    flag.map(Path::to_path_buf)
        .or_else(|| settings.download_dir.clone())
        .or(platform_default)
        .context("cannot determine download directory; pass --download-dir")
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn download_dir_prefers_flag() {
        let settings = Settings {
            download_dir: Some(PathBuf::from("/from/settings")),
            ..Settings::default()
        };
        let dir = resolve_download_dir(
            Some(Path::new("/from/flag")),
            &settings,
            Some(PathBuf::from("/from/platform")),
        )
        .unwrap();
        assert_eq!(dir, PathBuf::from("/from/flag"));
    }

    #[test]
    fn download_dir_falls_back_to_settings_then_platform() {
        let settings = Settings {
            download_dir: Some(PathBuf::from("/from/settings")),
            ..Settings::default()
        };
        assert_eq!(
            resolve_download_dir(None, &settings, Some(PathBuf::from("/p"))).unwrap(),
            PathBuf::from("/from/settings")
        );
        assert_eq!(
            resolve_download_dir(None, &Settings::default(), Some(PathBuf::from("/p"))).unwrap(),
            PathBuf::from("/p")
        );
    }

    #[test]
    fn download_dir_errors_when_unresolvable() {
        let err = resolve_download_dir(None, &Settings::default(), None).unwrap_err();
        assert!(err.to_string().contains("--download-dir"));
    }

    #[test]
    fn explicit_missing_settings_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let global = GlobalOpts {
            config: Some(dir.path().join("absent.toml")),
        };
        let err = load_settings(&global, &Platform::detect()).unwrap_err();
        assert!(err.to_string().contains("settings file not found"));
    }

    #[test]
    fn explicit_settings_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "continue_on_error = true\n").unwrap();
        let global = GlobalOpts { config: Some(path) };
        let settings = load_settings(&global, &Platform::detect()).unwrap();
        assert!(settings.continue_on_error);
    }
}
