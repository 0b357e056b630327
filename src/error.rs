//! Domain-specific error types for the provisioning engine.
//!
//! Library modules return the typed errors below; command handlers at the
//! CLI boundary convert them to [`anyhow::Error`] with the `?` operator.
//!
//! # Error hierarchy
//!
//! ```text
//! ProvisionError
//! ├── Config(ConfigError)          resource files and settings
//! ├── Build(BuildError)            acquire / install failures, cycles
//! ├── Agreement(AgreementDeclined) consent refused
//! └── DownloadDir                  download directory not creatable
//! ```
//!
//! Per-phase errors live next to the resources:
//! [`AcquireError`](crate::resources::error::AcquireError) and
//! [`InstallError`](crate::resources::error::InstallError).

use std::path::PathBuf;

use thiserror::Error;

use crate::agreement::AgreementDeclined;
use crate::resources::error::{AcquireError, InstallError};

/// Top-level error type for the provisioning engine.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Resource file or settings problem.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A resource could not be built.
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    /// The user refused the installation agreement.
    #[error(transparent)]
    Agreement(#[from] AgreementDeclined),

    /// The download directory could not be created.
    #[error("Cannot create download directory {path}: {source}", path = path.display())]
    DownloadDir {
        /// Directory that was requested.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Errors raised while loading resource files or settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A config file could not be read.
    #[error("IO error reading config file {path}: {source}")]
    Io {
        /// Path to the file that could not be read.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid YAML/TOML or has the wrong shape.
    #[error("Invalid syntax in {file}: {message}")]
    InvalidSyntax {
        /// File that failed to parse.
        file: String,
        /// Parser message.
        message: String,
    },

    /// A required top-level section is absent.
    #[error("Missing required section '{0}'")]
    MissingSection(String),

    /// A resource lacks a field its type requires.
    #[error("Resource {label} does not specify {field}")]
    MissingField {
        /// Label of the offending resource.
        label: String,
        /// Name of the missing field.
        field: &'static str,
    },

    /// A resource names a type tag this engine does not know.
    #[error("Resource {label} has unknown type '{kind}'")]
    UnknownType {
        /// Label of the offending resource.
        label: String,
        /// The unrecognised tag.
        kind: String,
    },

    /// A resource depends on a label that is not declared.
    #[error("Resource {label} depends on unknown resource '{dependency}'")]
    UnknownDependency {
        /// Label of the declaring resource.
        label: String,
        /// The undeclared dependency.
        dependency: String,
    },

    /// The declared dependencies form a cycle.
    #[error("Resource dependency cycle detected: {0}")]
    DependencyCycle(String),

    /// A resource label is empty or not a string.
    #[error("Invalid resource label: {0}")]
    InvalidLabel(String),

    /// Two resource files declare the same label.
    #[error("Resource {label} is declared in both {first} and {second}")]
    DuplicateLabel {
        /// The repeated label.
        label: String,
        /// File holding the first declaration.
        first: String,
        /// File holding the second declaration.
        second: String,
    },
}

/// Errors raised while building resources.
#[derive(Error, Debug)]
pub enum BuildError {
    /// Acquisition of `label` failed.
    #[error("Resource {label} failed to acquire ({}): {source}", .source.kind())]
    Acquire {
        /// Label of the failing resource.
        label: String,
        /// Underlying acquisition error.
        #[source]
        source: AcquireError,
    },

    /// Installation of `label` failed.
    #[error("Resource {label} failed to install ({}): {source}", .source.kind())]
    Install {
        /// Label of the failing resource.
        label: String,
        /// Underlying install error.
        #[source]
        source: InstallError,
    },

    /// A resource (transitively) depends on itself.
    #[error("Resource dependency cycle detected: {}", .chain.join(" -> "))]
    CyclicDependency {
        /// Labels from the outermost resource to the repeated one.
        chain: Vec<String>,
    },

    /// A label was built earlier in this run from a different declaration.
    #[error("Resource {label} is declared more than once with different contents")]
    ConflictingLabel {
        /// The repeated label.
        label: String,
    },

    /// Several top-level resources failed in continue-on-error mode.
    #[error("{} resources failed: {}", .0.len(), failed_labels(.0))]
    Failed(Vec<Self>),
}

impl BuildError {
    /// Label of the resource the error is about.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Acquire { label, .. }
            | Self::Install { label, .. }
            | Self::ConflictingLabel { label } => Some(label),
            Self::CyclicDependency { chain } => chain.last().map(String::as_str),
            Self::Failed(_) => None,
        }
    }

    /// Short name of the error kind, used in summaries.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Acquire { source, .. } => source.kind(),
            Self::Install { source, .. } => source.kind(),
            Self::CyclicDependency { .. } => "dependency cycle",
            Self::ConflictingLabel { .. } => "conflicting declaration",
            Self::Failed(_) => "multiple failures",
        }
    }
}

fn failed_labels(errors: &[BuildError]) -> String {
    errors
        .iter()
        .map(|e| e.label().unwrap_or("?"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::exec::ExecError;
    use std::io;

    // -----------------------------------------------------------------------
    // ConfigError
    // -----------------------------------------------------------------------

    #[test]
    fn config_error_missing_field_display() {
        let e = ConfigError::MissingField {
            label: "Golang".to_string(),
            field: "location",
        };
        assert_eq!(e.to_string(), "Resource Golang does not specify location");
    }

    #[test]
    fn config_error_unknown_type_display() {
        let e = ConfigError::UnknownType {
            label: "Golang".to_string(),
            kind: "rpm".to_string(),
        };
        assert_eq!(e.to_string(), "Resource Golang has unknown type 'rpm'");
    }

    #[test]
    fn config_error_missing_section_display() {
        let e = ConfigError::MissingSection("Resources".to_string());
        assert_eq!(e.to_string(), "Missing required section 'Resources'");
    }

    #[test]
    fn config_error_duplicate_label_names_both_files() {
        let e = ConfigError::DuplicateLabel {
            label: "Editors".to_string(),
            first: "a.yaml".to_string(),
            second: "b.yaml".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "Resource Editors is declared in both a.yaml and b.yaml"
        );
    }

    #[test]
    fn config_error_io_has_source() {
        use std::error::Error as StdError;
        let e = ConfigError::Io {
            path: "/conf/resources.yaml".to_string(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"),
        };
        assert!(e.to_string().contains("/conf/resources.yaml"));
        assert!(e.source().is_some());
    }

    // -----------------------------------------------------------------------
    // BuildError
    // -----------------------------------------------------------------------

    #[test]
    fn build_error_names_label_and_kind() {
        let e = BuildError::Install {
            label: "Editors".to_string(),
            source: InstallError::ProcessFailure(ExecError::Failed {
                program: "sudo".to_string(),
                code: 100,
                detail: "Unable to locate package nano".to_string(),
            }),
        };
        let msg = e.to_string();
        assert!(msg.starts_with("Resource Editors failed to install (process failure)"));
        assert!(msg.contains("Unable to locate package nano"));
        assert_eq!(e.label(), Some("Editors"));
        assert_eq!(e.kind(), "process failure");
    }

    #[test]
    fn build_error_acquire_display() {
        let e = BuildError::Acquire {
            label: "Golang".to_string(),
            source: AcquireError::NetworkFailure {
                url: "https://example.com/go.exe".to_string(),
                reason: "http status: 404".to_string(),
            },
        };
        assert!(
            e.to_string()
                .starts_with("Resource Golang failed to acquire (network failure)")
        );
    }

    #[test]
    fn cyclic_dependency_display() {
        let e = BuildError::CyclicDependency {
            chain: vec!["A".to_string(), "B".to_string(), "A".to_string()],
        };
        assert_eq!(e.to_string(), "Resource dependency cycle detected: A -> B -> A");
        assert_eq!(e.label(), Some("A"));
    }

    #[test]
    fn failed_lists_labels() {
        let e = BuildError::Failed(vec![
            BuildError::CyclicDependency {
                chain: vec!["X".to_string(), "X".to_string()],
            },
            BuildError::Install {
                label: "Y".to_string(),
                source: InstallError::NotAcquired {
                    label: "Y".to_string(),
                },
            },
        ]);
        assert_eq!(e.to_string(), "2 resources failed: X, Y");
        assert_eq!(e.label(), None);
    }

    // -----------------------------------------------------------------------
    // ProvisionError conversions
    // -----------------------------------------------------------------------

    #[test]
    fn provision_error_from_config_error() {
        let e: ProvisionError = ConfigError::InvalidLabel("''".to_string()).into();
        assert!(e.to_string().contains("Configuration error"));
    }

    #[test]
    fn provision_error_from_agreement_is_transparent() {
        let e: ProvisionError = AgreementDeclined.into();
        assert_eq!(e.to_string(), "installation agreement declined");
    }

    #[test]
    fn provision_error_download_dir_names_path() {
        let e = ProvisionError::DownloadDir {
            path: "/srv/downloads".into(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(
            e.to_string(),
            "Cannot create download directory /srv/downloads: denied"
        );
    }

    // -----------------------------------------------------------------------
    // Send + Sync bounds / anyhow conversion
    // -----------------------------------------------------------------------

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn all_error_types_are_send_sync() {
        assert_send_sync::<ProvisionError>();
        assert_send_sync::<ConfigError>();
        assert_send_sync::<BuildError>();
    }

    #[test]
    fn build_error_converts_to_anyhow() {
        let e = BuildError::CyclicDependency {
            chain: vec!["A".to_string()],
        };
        let anyhow_err: anyhow::Error = e.into();
        assert!(anyhow_err.downcast_ref::<BuildError>().is_some());
    }
}
