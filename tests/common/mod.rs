// Shared helpers for integration tests.
//
// Provides recording doubles for the executor, downloader and logger, plus a
// temporary download directory, so each integration test can drive a full
// build without touching the network or running real installers.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use provision_cli::agreement::ScriptedPrompt;
use provision_cli::context::BuildContext;
use provision_cli::download::Downloader;
use provision_cli::exec::{ExecError, ExecResult, Executor};
use provision_cli::logging::{BuildStatus, Log};
use provision_cli::resources::error::AcquireError;

/// Executor that records command lines and fails those containing a marker.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<String>>,
    fail_on: Option<String>,
}

impl RecordingExecutor {
    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_on: Some(marker.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl Executor for RecordingExecutor {
    fn run(&self, program: &str, args: &[&str]) -> Result<ExecResult, ExecError> {
        let line = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        self.calls.lock().expect("calls lock").push(line.clone());
        if self.fail_on.as_deref().is_some_and(|m| line.contains(m)) {
            return Err(ExecError::Failed {
                program: program.to_string(),
                code: 1,
                detail: "simulated failure".to_string(),
            });
        }
        Ok(ExecResult {
            stdout: String::new(),
            stderr: String::new(),
            success: true,
            code: Some(0),
        })
    }

    fn which(&self, _program: &str) -> bool {
        true
    }
}

/// Downloader serving fixed bodies by URL; unknown URLs fail as 404s.
#[derive(Debug, Default)]
pub struct ServedDownloader {
    bodies: HashMap<String, Vec<u8>>,
    fetched: Mutex<Vec<String>>,
}

impl ServedDownloader {
    pub fn serve(mut self, url: &str, body: Vec<u8>) -> Self {
        self.bodies.insert(url.to_string(), body);
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().expect("fetched lock").clone()
    }
}

impl Downloader for ServedDownloader {
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64, AcquireError> {
        self.fetched
            .lock()
            .expect("fetched lock")
            .push(url.to_string());
        let body = self
            .bodies
            .get(url)
            .ok_or_else(|| AcquireError::NetworkFailure {
                url: url.to_string(),
                reason: "http status: 404".to_string(),
            })?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AcquireError::filesystem(dest, e))?;
        }
        std::fs::write(dest, body).map_err(|e| AcquireError::filesystem(dest, e))?;
        Ok(body.len() as u64)
    }
}

/// Log keeping summary entries in memory.
#[derive(Debug, Default)]
pub struct MemoryLog {
    entries: Mutex<Vec<(String, BuildStatus, Option<String>)>>,
}

impl MemoryLog {
    pub fn entries(&self) -> Vec<(String, BuildStatus, Option<String>)> {
        self.entries.lock().expect("entries lock").clone()
    }

    pub fn statuses(&self) -> Vec<(String, BuildStatus)> {
        self.entries()
            .into_iter()
            .map(|(label, status, _)| (label, status))
            .collect()
    }
}

impl Log for MemoryLog {
    fn stage(&self, _msg: &str) {}
    fn info(&self, _msg: &str) {}
    fn debug(&self, _msg: &str) {}
    fn warn(&self, _msg: &str) {}
    fn error(&self, _msg: &str) {}
    fn record_resource(&self, label: &str, status: BuildStatus, message: Option<&str>) {
        self.entries.lock().expect("entries lock").push((
            label.to_string(),
            status,
            message.map(String::from),
        ));
    }
}

/// A temporary download directory plus doubles wired into a context.
pub struct IntegrationTestContext {
    pub dir: tempfile::TempDir,
    pub executor: Arc<RecordingExecutor>,
    pub downloader: Arc<ServedDownloader>,
    pub log: Arc<MemoryLog>,
    pub ctx: BuildContext,
}

impl IntegrationTestContext {
    /// Context whose prompt answers `answers` in order.
    pub fn new(
        executor: RecordingExecutor,
        downloader: ServedDownloader,
        answers: &[&str],
    ) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let executor = Arc::new(executor);
        let downloader = Arc::new(downloader);
        let log = Arc::new(MemoryLog::default());
        let ctx = BuildContext::new(
            dir.path().join("downloads"),
            log.clone(),
            Box::new(ScriptedPrompt::new(answers.iter().copied())),
        )
        .with_executor(executor.clone())
        .with_downloader(downloader.clone());
        Self {
            dir,
            executor,
            downloader,
            log,
            ctx,
        }
    }

    /// Context that accepts the agreement.
    pub fn accepting(executor: RecordingExecutor, downloader: ServedDownloader) -> Self {
        Self::new(executor, downloader, &["yes"])
    }

    pub fn download_dir(&self) -> PathBuf {
        self.dir.path().join("downloads")
    }

    /// Write `contents` to `name` inside the temp directory.
    pub fn write_file(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).expect("write file");
        path
    }
}

/// In-memory zip archive holding `entries`.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, body) in entries {
        writer.start_file(*name, options).expect("start zip entry");
        writer.write_all(body).expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

/// In-memory gzip-compressed tarball holding `entries`.
pub fn tar_gz_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
    let mut builder = tar::Builder::new(encoder);
    for (name, body) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, *body)
            .expect("append tar entry");
    }
    builder
        .into_inner()
        .expect("finish tar")
        .finish()
        .expect("finish gzip")
}
