//! Binary installers (`.exe`, `.msi`) and package files (`.deb`).
use std::path::Path;

use crate::exec::Executor;

use super::InstallerFormat;
use super::commands::{self, CommandSet};
use super::error::InstallError;

/// Run the installer at `path`, blocking until it exits.
///
/// # Errors
///
/// Returns [`InstallError::ProcessFailure`] if the installer cannot be
/// launched, exits non-zero or times out, and
/// [`InstallError::FilesystemFailure`] if it cannot be made executable.
pub fn run_installer(
    executor: &dyn Executor,
    commands: &CommandSet,
    format: InstallerFormat,
    path: &Path,
    arguments: &[String],
) -> Result<(), InstallError> {
    let template = match format {
        InstallerFormat::Exe => {
            make_executable(path)?;
            &commands.exe
        }
        InstallerFormat::Msi => &commands.msi,
    };
    let file = path.to_string_lossy();
    template.run(executor, &[(commands::FILE, &*file)], arguments)?;
    Ok(())
}

/// Hand the package file at `path` to the system package manager.
///
/// # Errors
///
/// Returns [`InstallError::ProcessFailure`] if the package manager fails.
pub fn install_package_file(
    executor: &dyn Executor,
    commands: &CommandSet,
    path: &Path,
    arguments: &[String],
) -> Result<(), InstallError> {
    let file = path.to_string_lossy();
    commands
        .deb
        .run(executor, &[(commands::FILE, &*file)], arguments)?;
    Ok(())
}

/// Downloaded files lose their execute bit; restore it before launching.
#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), InstallError> {
    use std::os::unix::fs::PermissionsExt as _;
    let Ok(metadata) = std::fs::metadata(path) else {
        // Missing files surface as a launch failure from the executor.
        return Ok(());
    };
    let mut perms = metadata.permissions();
    if perms.mode() & 0o111 == 0 {
        perms.set_mode(perms.mode() | 0o755);
        std::fs::set_permissions(path, perms).map_err(|e| InstallError::filesystem(path, e))?;
    }
    Ok(())
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
const fn make_executable(_path: &Path) -> Result<(), InstallError> {
    Ok(())
}
