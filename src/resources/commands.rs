//! Command templates for installer and package-manager invocations.
//!
//! Each install mechanism is described by a [`CommandTemplate`]: a program
//! plus arguments that may contain `{file}`, `{package}` and `{repository}`
//! placeholders.  The defaults target Windows installers and Debian-family
//! package management; all of them can be overridden from the settings
//! file.
use serde::Deserialize;

use crate::exec::{ExecError, ExecResult, Executor};

/// Placeholder replaced with the local artifact path.
pub const FILE: &str = "{file}";
/// Placeholder replaced with a package name.
pub const PACKAGE: &str = "{package}";
/// Placeholder replaced with a repository identifier.
pub const REPOSITORY: &str = "{repository}";

/// A program and its argument list, with placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandTemplate {
    /// Program to launch.  May itself be a placeholder (e.g. `{file}` for
    /// self-contained installers).
    pub program: String,
    /// Arguments passed before any resource-specific arguments.
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandTemplate {
    /// Create a template from a program and arguments.
    #[must_use]
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
        }
    }

    /// Substitute `vars` (`(placeholder, value)` pairs) into the program and
    /// every argument, then append `extra` verbatim.
    #[must_use]
    pub fn render(&self, vars: &[(&str, &str)], extra: &[String]) -> (String, Vec<String>) {
        let substitute = |s: &str| {
            vars.iter()
                .fold(s.to_string(), |acc, (key, value)| acc.replace(key, value))
        };
        let program = substitute(&self.program);
        let args = self
            .args
            .iter()
            .map(|a| substitute(a))
            .chain(extra.iter().cloned())
            .collect();
        (program, args)
    }

    /// Render the template and run it through `executor`.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError`] if the program cannot be launched, exits
    /// non-zero, or times out.
    pub fn run(
        &self,
        executor: &dyn Executor,
        vars: &[(&str, &str)],
        extra: &[String],
    ) -> Result<ExecResult, ExecError> {
        let (program, args) = self.render(vars, extra);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        executor.run(&program, &args)
    }
}

/// The full set of templates used by the install executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSet {
    /// Runs an `.exe` installer.
    pub exe: CommandTemplate,
    /// Runs an `.msi` installer.
    pub msi: CommandTemplate,
    /// Installs a `.deb` package file.
    pub deb: CommandTemplate,
    /// Refreshes the system package index.
    pub refresh: CommandTemplate,
    /// Installs one named package from the configured repositories.
    pub install_package: CommandTemplate,
    /// Registers a third-party repository.
    pub add_repository: CommandTemplate,
}

impl Default for CommandSet {
    fn default() -> Self {
        Self {
            exe: CommandTemplate::new(FILE, &[]),
            msi: CommandTemplate::new("msiexec", &["/i", FILE]),
            deb: CommandTemplate::new("sudo", &["apt-get", "install", "-y", FILE]),
            refresh: CommandTemplate::new("sudo", &["apt-get", "update"]),
            install_package: CommandTemplate::new("sudo", &["apt-get", "install", "-y", PACKAGE]),
            add_repository: CommandTemplate::new("sudo", &["add-apt-repository", "-y", REPOSITORY]),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::resources::test_helpers::RecordingExecutor;

    fn command_line(template: &CommandTemplate, vars: &[(&str, &str)], extra: &[&str]) -> String {
        let extra: Vec<String> = extra.iter().map(|s| (*s).to_string()).collect();
        let (program, args) = template.render(vars, &extra);
        std::iter::once(program)
            .chain(args)
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn default_commands_render() {
        let set = CommandSet::default();
        let rendered = [
            command_line(&set.exe, &[(FILE, "/dl/Golang.exe")], &["/quiet"]),
            command_line(&set.msi, &[(FILE, "/dl/Node.msi")], &["/qn"]),
            command_line(&set.deb, &[(FILE, "/dl/code.deb")], &[]),
            command_line(&set.refresh, &[], &[]),
            command_line(&set.install_package, &[(PACKAGE, "nano")], &[]),
            command_line(&set.add_repository, &[(REPOSITORY, "ppa:git-core/ppa")], &[]),
        ]
        .join("\n");
        insta::assert_snapshot!(rendered, @r"
        /dl/Golang.exe /quiet
        msiexec /i /dl/Node.msi /qn
        sudo apt-get install -y /dl/code.deb
        sudo apt-get update
        sudo apt-get install -y nano
        sudo add-apt-repository -y ppa:git-core/ppa
        ");
    }

    #[test]
    fn render_leaves_unknown_placeholders() {
        let template = CommandTemplate::new("tool", &["{other}", FILE]);
        let (_, args) = template.render(&[(FILE, "x")], &[]);
        assert_eq!(args, vec!["{other}".to_string(), "x".to_string()]);
    }

    #[test]
    fn extra_arguments_are_not_substituted() {
        let template = CommandTemplate::new(FILE, &[]);
        let (program, args) = template.render(&[(FILE, "setup.exe")], &["{file}".to_string()]);
        assert_eq!(program, "setup.exe");
        assert_eq!(args, vec!["{file}".to_string()]);
    }

    #[test]
    fn run_goes_through_executor() {
        let executor = RecordingExecutor::new();
        CommandSet::default()
            .install_package
            .run(&executor, &[(PACKAGE, "curl")], &[])
            .unwrap();
        assert_eq!(executor.calls(), vec!["sudo apt-get install -y curl"]);
    }

    #[test]
    fn template_deserializes_without_args() {
        let template: CommandTemplate = toml::from_str(r#"program = "dpkg""#).unwrap();
        assert_eq!(template, CommandTemplate::new("dpkg", &[]));
    }
}
