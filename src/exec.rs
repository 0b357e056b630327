//! Subprocess execution behind an injectable [`Executor`].
//!
//! Every installer and package-manager invocation goes through this module.
//! Calls block until the child exits; [`SystemExecutor`] can optionally
//! enforce a deadline, killing the child when it is exceeded.
use std::fmt;
use std::io::Read;
use std::process::{Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use wait_timeout::ChildExt as _;

/// Result of a command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Whether the process exited with status 0.
    pub success: bool,
    /// Exit code, absent when the process was killed by a signal.
    pub code: Option<i32>,
}

impl From<Output> for ExecResult {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        }
    }
}

/// Errors raised while running a subprocess.
#[derive(Error, Debug)]
pub enum ExecError {
    /// The program could not be started (missing binary, permissions, ...).
    #[error("failed to execute {program}: {source}")]
    Launch {
        /// Program that was invoked.
        program: String,
        /// Underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// The program ran but exited unsuccessfully.
    #[error("{program} failed (exit {code}): {detail}")]
    Failed {
        /// Program that was invoked.
        program: String,
        /// Exit code, or `-1` when the process was terminated by a signal.
        code: i32,
        /// Trimmed stderr, or stdout when stderr was empty.
        detail: String,
    },

    /// The program did not exit before the configured deadline and was killed.
    #[error("{program} timed out after {}s", .timeout.as_secs())]
    TimedOut {
        /// Program that was invoked.
        program: String,
        /// The deadline that was exceeded.
        timeout: Duration,
    },
}

impl ExecError {
    /// Name of the program this error is about.
    #[must_use]
    pub fn program(&self) -> &str {
        match self {
            Self::Launch { program, .. }
            | Self::Failed { program, .. }
            | Self::TimedOut { program, .. } => program,
        }
    }
}

/// Abstraction over process execution so install logic can be tested
/// without spawning real installers or package managers.
pub trait Executor: Send + Sync + fmt::Debug {
    /// Run `program` with `args`, blocking until it exits.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError`] if the program cannot be launched, exits
    /// non-zero, or exceeds the executor's deadline.
    fn run(&self, program: &str, args: &[&str]) -> Result<ExecResult, ExecError>;

    /// Check if a program is available on `PATH` (or is a path to an
    /// existing executable).
    fn which(&self, program: &str) -> bool;
}

/// [`Executor`] that spawns real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor {
    timeout: Option<Duration>,
}

impl SystemExecutor {
    /// Executor that waits for children indefinitely.
    #[must_use]
    pub const fn new() -> Self {
        Self { timeout: None }
    }

    /// Executor that kills children still running after `timeout`.
    #[must_use]
    pub const fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl Executor for SystemExecutor {
    fn run(&self, program: &str, args: &[&str]) -> Result<ExecResult, ExecError> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        let result = execute(cmd, program, self.timeout)?;
        checked(result, program)
    }

    fn which(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

/// Turn a non-zero exit into [`ExecError::Failed`].
fn checked(result: ExecResult, program: &str) -> Result<ExecResult, ExecError> {
    if result.success {
        return Ok(result);
    }
    // Installers often report on stdout only.
    let detail = if result.stderr.trim().is_empty() {
        result.stdout.trim().to_string()
    } else {
        result.stderr.trim().to_string()
    };
    Err(ExecError::Failed {
        program: program.to_string(),
        code: result.code.unwrap_or(-1),
        detail,
    })
}

/// Spawn `cmd` and wait for it, honouring an optional deadline.
fn execute(
    mut cmd: Command,
    program: &str,
    timeout: Option<Duration>,
) -> Result<ExecResult, ExecError> {
    let launch = |source| ExecError::Launch {
        program: program.to_string(),
        source,
    };

    let Some(limit) = timeout else {
        let output = cmd.output().map_err(launch)?;
        return Ok(ExecResult::from(output));
    };

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = cmd.spawn().map_err(launch)?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let Some(status) = child.wait_timeout(limit).map_err(launch)? else {
        child.kill().ok();
        child.wait().ok();
        return Err(ExecError::TimedOut {
            program: program.to_string(),
            timeout: limit,
        });
    };

    Ok(ExecResult {
        stdout: collect(stdout),
        stderr: collect(stderr),
        success: status.success(),
        code: status.code(),
    })
}

/// Read a child pipe to completion on a helper thread so the child never
/// blocks on a full pipe while we wait for its exit.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            pipe.read_to_end(&mut buf).ok();
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}
