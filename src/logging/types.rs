//! Core logging types: per-resource summary entries and the [`Log`] trait.

/// Outcome of one resource within a build, kept for the run summary.
#[derive(Debug, Clone)]
pub struct ResourceEntry {
    /// Resource label.
    pub label: String,
    /// Final status of the resource.
    pub status: BuildStatus,
    /// Optional detail message (error description or skip reason).
    pub message: Option<String>,
}

/// Status of a resource once the build has finished with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    /// Acquired and applied.
    Ok,
    /// Already applied earlier in this invocation.
    Skipped,
    /// Acquisition or install failed.
    Failed,
}

/// Abstraction over logging backends.
///
/// [`Logger`](super::logger::Logger) is the console/file implementation;
/// tests substitute recorders so build output can be asserted on.
pub trait Log: Send + Sync {
    /// Log a stage header (one per resource being applied).
    fn stage(&self, msg: &str);
    /// Log an informational message.
    fn info(&self, msg: &str);
    /// Log a debug message (may be suppressed on console).
    fn debug(&self, msg: &str);
    /// Log a warning message.
    fn warn(&self, msg: &str);
    /// Log an error message.
    fn error(&self, msg: &str);
    /// Record a resource result for the summary.
    fn record_resource(&self, label: &str, status: BuildStatus, message: Option<&str>);
}
