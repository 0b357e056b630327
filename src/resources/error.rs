//! Typed error variants for the two resource lifecycle phases.
//!
//! [`AcquireError`] covers getting an artifact onto the local machine,
//! [`InstallError`] covers applying it.  The build pipeline wraps both with
//! the label of the failing resource.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::exec::ExecError;

/// Errors that arise while acquiring a resource.
#[derive(Error, Debug)]
pub enum AcquireError {
    /// The transfer from a remote location failed.
    #[error("network failure fetching {url}: {reason}")]
    NetworkFailure {
        /// Location that was being fetched.
        url: String,
        /// Human-readable reason (HTTP status, connection error, ...).
        reason: String,
    },

    /// A local file could not be written, read or found.
    #[error("filesystem failure at {}: {source}", .path.display())]
    FilesystemFailure {
        /// Path the operation was performed on.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The downloaded bytes did not match the declared SHA-256 digest.
    #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Location that was fetched.
        url: String,
        /// Digest declared for the resource.
        expected: String,
        /// Digest of the bytes actually received.
        actual: String,
    },

    /// A package-index refresh or repository registration command failed.
    #[error("command failure: {0}")]
    CommandFailure(#[from] ExecError),
}

impl AcquireError {
    /// Build a [`AcquireError::FilesystemFailure`] for `path`.
    pub fn filesystem(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::FilesystemFailure {
            path: path.into(),
            source,
        }
    }
}

/// Errors that arise while applying (installing) a resource.
#[derive(Error, Debug)]
pub enum InstallError {
    /// Apply was requested for a resource whose artifact is not local yet.
    #[error("resource '{label}' has not been acquired")]
    NotAcquired {
        /// Label of the resource.
        label: String,
    },

    /// An installer or package-manager process failed, could not start, or
    /// timed out.
    #[error("process failure: {0}")]
    ProcessFailure(#[from] ExecError),

    /// The archive could not be read or contains malformed entries.
    #[error("corrupt archive {}: {reason}", .path.display())]
    ArchiveCorrupt {
        /// Archive that failed to extract.
        path: PathBuf,
        /// Decoder error message.
        reason: String,
    },

    /// A file or directory involved in installation could not be written or
    /// removed.
    #[error("filesystem failure at {}: {source}", .path.display())]
    FilesystemFailure {
        /// Path the operation was performed on.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl InstallError {
    /// Build an [`InstallError::FilesystemFailure`] for `path`.
    pub fn filesystem(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::FilesystemFailure {
            path: path.into(),
            source,
        }
    }

    /// Short name of the error kind, used in summaries.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotAcquired { .. } => "not acquired",
            Self::ProcessFailure(_) => "process failure",
            Self::ArchiveCorrupt { .. } => "corrupt archive",
            Self::FilesystemFailure { .. } => "filesystem failure",
        }
    }
}

impl AcquireError {
    /// Short name of the error kind, used in summaries.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NetworkFailure { .. } => "network failure",
            Self::FilesystemFailure { .. } => "filesystem failure",
            Self::ChecksumMismatch { .. } => "checksum mismatch",
            Self::CommandFailure(_) => "command failure",
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn network_failure_display() {
        let e = AcquireError::NetworkFailure {
            url: "https://example.com/a.exe".to_string(),
            reason: "http status: 404".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "network failure fetching https://example.com/a.exe: http status: 404"
        );
        assert_eq!(e.kind(), "network failure");
    }

    #[test]
    fn filesystem_failure_has_source() {
        use std::error::Error as _;
        let e = AcquireError::filesystem(
            "/downloads/a.exe",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(e.to_string().contains("/downloads/a.exe"));
        assert!(e.source().is_some());
    }

    #[test]
    fn not_acquired_display() {
        let e = InstallError::NotAcquired {
            label: "Golang".to_string(),
        };
        assert_eq!(e.to_string(), "resource 'Golang' has not been acquired");
        assert_eq!(e.kind(), "not acquired");
    }

    #[test]
    fn process_failure_wraps_exec_error() {
        let e: InstallError = ExecError::Failed {
            program: "apt-get".to_string(),
            code: 100,
            detail: "Unable to locate package nano".to_string(),
        }
        .into();
        assert!(matches!(e, InstallError::ProcessFailure(_)));
        assert!(e.to_string().contains("apt-get failed (exit 100)"));
    }

    #[test]
    fn archive_corrupt_display() {
        let e = InstallError::ArchiveCorrupt {
            path: PathBuf::from("/downloads/micro.zip"),
            reason: "invalid Zip archive".to_string(),
        };
        assert!(e.to_string().contains("/downloads/micro.zip"));
        assert!(e.to_string().contains("invalid Zip archive"));
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn resource_errors_are_send_sync() {
        assert_send_sync::<AcquireError>();
        assert_send_sync::<InstallError>();
    }
}
