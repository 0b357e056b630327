//! Download engine: stream a remote artifact to a local path.
//!
//! Transfers go to a sibling `<target>.part` file that is renamed into place
//! once complete, so an interrupted download never leaves a file at the
//! target path (which would otherwise be treated as already acquired).
//!
//! The existence check that makes acquisition idempotent lives in the
//! resource layer; two processes sharing a download directory can still race
//! between that check and the final rename.
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use sha2::{Digest, Sha256};

use crate::resources::error::AcquireError;
use crate::resources::helpers::fs::ensure_parent_dir;

const CHUNK_SIZE: usize = 64 * 1024;

/// Abstraction over network transfer so acquisition can be tested offline.
pub trait Downloader: Send + Sync + fmt::Debug {
    /// Fetch `url` into `dest`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::NetworkFailure`] if the transfer fails and
    /// [`AcquireError::FilesystemFailure`] if `dest` cannot be written.
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64, AcquireError>;
}

/// Whether `location` is a remote URI this engine can fetch.
#[must_use]
pub fn is_remote(location: &str) -> bool {
    location.split_once("://").is_some_and(|(scheme, _)| {
        scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")
    })
}

/// [`Downloader`] backed by a blocking [`ureq::Agent`].
pub struct HttpDownloader {
    agent: ureq::Agent,
    progress: bool,
}

impl fmt::Debug for HttpDownloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpDownloader")
            .field("agent", &"<ureq::Agent>")
            .field("progress", &self.progress)
            .finish()
    }
}

impl HttpDownloader {
    /// Create a downloader.
    ///
    /// `timeout` bounds each whole transfer; `None` waits indefinitely.
    /// `progress` enables a terminal progress bar (drawn on stderr, and
    /// suppressed automatically when stderr is not a terminal).
    #[must_use]
    pub fn new(timeout: Option<Duration>, progress: bool) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(timeout)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            progress,
        }
    }
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new(None, true)
    }
}

impl Downloader for HttpDownloader {
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64, AcquireError> {
        let mut response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| AcquireError::NetworkFailure {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let total = response
            .headers()
            .get(ureq::http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        ensure_parent_dir(dest).map_err(|e| AcquireError::filesystem(dest, e))?;
        let partial = partial_path(dest);
        let mut file = File::create(&partial).map_err(|e| AcquireError::filesystem(&partial, e))?;

        let name = dest
            .file_name()
            .map_or_else(|| url.to_string(), |n| n.to_string_lossy().into_owned());
        let bar = progress_bar(total, self.progress, name);

        let mut reader = response.body_mut().as_reader();
        let copied = copy_with_progress(&mut reader, &mut file, &bar, url, &partial)
            .and_then(|n| {
                file.flush()
                    .map_err(|e| AcquireError::filesystem(&partial, e))
                    .map(|()| n)
            });
        drop(file);

        match copied {
            Ok(written) => {
                bar.finish_and_clear();
                fs::rename(&partial, dest).map_err(|e| AcquireError::filesystem(dest, e))?;
                Ok(written)
            }
            Err(e) => {
                bar.abandon();
                fs::remove_file(&partial).ok();
                Err(e)
            }
        }
    }
}

/// Path of the in-flight download for `dest`.
fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

fn progress_bar(total: Option<u64>, enabled: bool, name: String) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let (bar, template) = total.map_or_else(
        || (ProgressBar::new_spinner(), "  {spinner} {msg} {bytes}"),
        |len| {
            (
                ProgressBar::new(len),
                "  {msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )
        },
    );
    if let Ok(style) = ProgressStyle::with_template(template) {
        bar.set_style(style.progress_chars("#>-"));
    }
    bar.set_message(name);
    bar
}

/// Copy `reader` into `writer`, advancing `bar` by every chunk.
///
/// Read errors are network failures, write errors are filesystem failures.
fn copy_with_progress(
    reader: &mut impl Read,
    writer: &mut impl Write,
    bar: &ProgressBar,
    url: &str,
    path: &Path,
) -> Result<u64, AcquireError> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut written = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(AcquireError::NetworkFailure {
                    url: url.to_string(),
                    reason: e.to_string(),
                });
            }
        };
        let chunk = buf.get(..n).unwrap_or_default();
        writer
            .write_all(chunk)
            .map_err(|e| AcquireError::filesystem(path, e))?;
        let n = n as u64;
        written += n;
        bar.inc(n);
    }
    Ok(written)
}

/// Hex-encoded SHA-256 digest of the file at `path`.
///
/// # Errors
///
/// Returns [`AcquireError::FilesystemFailure`] if the file cannot be read.
pub fn sha256_file(path: &Path) -> Result<String, AcquireError> {
    let mut file = File::open(path).map_err(|e| AcquireError::filesystem(path, e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| AcquireError::filesystem(path, e))?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Verify that the file at `path` has the `expected` SHA-256 digest.
///
/// On mismatch the file is deleted so a later run downloads it again
/// instead of trusting the existence check.
///
/// # Errors
///
/// Returns [`AcquireError::ChecksumMismatch`] on mismatch, or a filesystem
/// failure if the file cannot be read.
pub fn verify_sha256(path: &Path, expected: &str, url: &str) -> Result<(), AcquireError> {
    let actual = sha256_file(path)?;
    if actual.eq_ignore_ascii_case(expected.trim()) {
        return Ok(());
    }
    fs::remove_file(path).ok();
    Err(AcquireError::ChecksumMismatch {
        url: url.to_string(),
        expected: expected.trim().to_lowercase(),
        actual,
    })
}
