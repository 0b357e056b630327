//! Package-manager backed resources: system repositories and third-party
//! repositories.
use std::io;

use crate::exec::{ExecError, Executor};

use super::commands::{self, CommandSet, CommandTemplate};

/// A non-empty, ordered list of package names.
///
/// Loaders accept either a single name or a list and normalise into this
/// type, so the install loop never has to handle an empty request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageList(Vec<String>);

impl PackageList {
    /// Build a list from `names`; `None` when it is empty.
    #[must_use]
    pub fn new(names: Vec<String>) -> Option<Self> {
        if names.is_empty() {
            None
        } else {
            Some(Self(names))
        }
    }

    /// A list holding a single package.
    #[must_use]
    pub fn one(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    /// Iterate over the package names in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Number of packages.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; present for API symmetry with `len`.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for PackageList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join(", "))
    }
}

/// Fail early with a launch error when the template's program is missing.
///
/// Package managers are looked up on `PATH` before the first call so a
/// missing `apt-get`/`sudo` is reported once with a clear message instead of
/// per package.
fn require_program(executor: &dyn Executor, template: &CommandTemplate) -> Result<(), ExecError> {
    if executor.which(&template.program) {
        return Ok(());
    }
    Err(ExecError::Launch {
        program: template.program.clone(),
        source: io::Error::new(io::ErrorKind::NotFound, "program not found on PATH"),
    })
}

/// Register `repository` (when given) and refresh the package index.
///
/// # Errors
///
/// Returns [`ExecError`] if either command is missing or fails.
pub fn prepare(
    executor: &dyn Executor,
    commands: &CommandSet,
    repository: Option<&str>,
) -> Result<(), ExecError> {
    if let Some(repository) = repository {
        require_program(executor, &commands.add_repository)?;
        commands
            .add_repository
            .run(executor, &[(commands::REPOSITORY, repository)], &[])?;
    }
    require_program(executor, &commands.refresh)?;
    commands.refresh.run(executor, &[], &[])?;
    Ok(())
}

/// Install each package in order, stopping at the first failure.
///
/// Packages installed before the failing one are left in place.
///
/// # Errors
///
/// Returns the [`ExecError`] of the first package that fails.
pub fn install_packages(
    executor: &dyn Executor,
    commands: &CommandSet,
    packages: &PackageList,
    arguments: &[String],
) -> Result<(), ExecError> {
    require_program(executor, &commands.install_package)?;
    for package in packages.iter() {
        commands
            .install_package
            .run(executor, &[(commands::PACKAGE, package)], arguments)?;
    }
    Ok(())
}
