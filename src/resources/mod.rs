//! Resource model: declarations, variants and the acquire/install lifecycle.
//!
//! A [`ResourceDescriptor`] is the plain declaration produced by a loader or
//! by calling code.  Passing it through [`Resource::new`] checks the
//! agreement gate and yields a [`Resource`], which knows how to
//! [`acquire`](Resource::acquire) its artifact and
//! [`apply`](Resource::apply) itself.  Variant-specific behaviour is selected
//! by matching on [`ResourceKind`].
pub mod archive;
pub mod commands;
pub mod error;
pub mod helpers;
pub mod installer;
pub mod repository;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use crate::agreement::AgreementDeclined;
use crate::context::BuildContext;
use crate::download::{is_remote, verify_sha256};
use crate::error::BuildError;

use error::{AcquireError, InstallError};
use helpers::fs::remove_existing;
use repository::PackageList;

/// Where a resource's artifact comes from, or where it now lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// An `http`/`https` URI still to be fetched.
    Remote(String),
    /// A path on the local filesystem.
    Local(PathBuf),
}

impl Location {
    /// Classify `location` by scheme: `http(s)://` is remote, anything else
    /// is a local path.
    #[must_use]
    pub fn parse(location: &str) -> Self {
        if is_remote(location) {
            Self::Remote(location.to_string())
        } else {
            Self::Local(PathBuf::from(location))
        }
    }

    /// The local path, if this location is local.
    #[must_use]
    pub fn local_path(&self) -> Option<&Path> {
        match self {
            Self::Local(path) => Some(path),
            Self::Remote(_) => None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(url) => write!(f, "{url}"),
            Self::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Binary installer flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallerFormat {
    /// Self-contained executable installer.
    Exe,
    /// Windows Installer package.
    Msi,
}

impl InstallerFormat {
    /// Artifact extension, including the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Exe => ".exe",
            Self::Msi => ".msi",
        }
    }
}

/// Supported archive formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// `.zip`
    Zip,
    /// Gzip-compressed tarball.
    TarGz,
}

impl ArchiveFormat {
    /// Artifact extension used for default download paths.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Zip => ".zip",
            Self::TarGz => ".tar.gz",
        }
    }

    /// Every lowercase suffix recognised for this format, longest first.
    #[must_use]
    pub const fn suffixes(self) -> &'static [&'static str] {
        match self {
            Self::Zip => &[".zip"],
            Self::TarGz => &[".tar.gz", ".tgz"],
        }
    }
}

/// The install mechanism of a resource, carrying only variant data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    /// An installer that is executed.
    Installer(InstallerFormat),
    /// A `.deb` handed to the system package manager.
    PackageFile,
    /// An archive extracted next to itself.
    Archive(ArchiveFormat),
    /// A file that is the end product (wallpaper, font, config).
    StaticAsset {
        /// Caller-chosen suffix, including the dot.
        extension: String,
    },
    /// Packages from the system's configured repositories.
    Repository {
        /// Packages to install.
        packages: PackageList,
    },
    /// Packages from a repository registered first.
    ThirdPartyRepository {
        /// Repository identifier passed to the registration command.
        repository: String,
        /// Packages to install.
        packages: PackageList,
    },
}

impl ResourceKind {
    /// Artifact extension; empty for repository variants.
    #[must_use]
    pub fn extension(&self) -> &str {
        match self {
            Self::Installer(format) => format.extension(),
            Self::PackageFile => ".deb",
            Self::Archive(format) => format.extension(),
            Self::StaticAsset { extension } => extension,
            Self::Repository { .. } | Self::ThirdPartyRepository { .. } => "",
        }
    }

    /// The type tag used in resource files.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Installer(InstallerFormat::Exe) => "exe",
            Self::Installer(InstallerFormat::Msi) => "msi",
            Self::PackageFile => "deb",
            Self::Archive(ArchiveFormat::Zip) => "zip",
            Self::Archive(ArchiveFormat::TarGz) => "tarball",
            Self::StaticAsset { .. } => "static",
            Self::Repository { .. } => "apt",
            Self::ThirdPartyRepository { .. } => "ppa",
        }
    }

    /// Whether this variant is backed by a package manager rather than a
    /// downloaded artifact.
    #[must_use]
    pub const fn is_repository(&self) -> bool {
        matches!(
            self,
            Self::Repository { .. } | Self::ThirdPartyRepository { .. }
        )
    }
}

/// Immutable declaration of one installable unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    /// Name used for default paths, logs and errors.
    pub label: String,
    /// Install mechanism.
    pub kind: ResourceKind,
    /// Artifact source; `None` for repository variants.
    pub location: Option<Location>,
    /// Install-time arguments appended to the install command.
    pub arguments: Vec<String>,
    /// Delete the artifact after a successful install.
    pub remove_after_install: bool,
    /// Skip the agreement gate for this resource.
    pub overwrite_agreement: bool,
    /// Expected SHA-256 of a freshly downloaded artifact.
    pub sha256: Option<String>,
    /// Resources built before this one.
    pub dependencies: Vec<Self>,
}

impl ResourceDescriptor {
    /// Declaration with no location, arguments, flags or dependencies.
    #[must_use]
    pub fn new(label: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            label: label.into(),
            kind,
            location: None,
            arguments: Vec::new(),
            remove_after_install: false,
            overwrite_agreement: false,
            sha256: None,
            dependencies: Vec::new(),
        }
    }

    fn located(label: impl Into<String>, kind: ResourceKind, location: &str) -> Self {
        let mut descriptor = Self::new(label, kind);
        descriptor.location = Some(Location::parse(location));
        descriptor
    }

    /// An `.exe` installer.
    #[must_use]
    pub fn exe(label: impl Into<String>, location: &str) -> Self {
        Self::located(label, ResourceKind::Installer(InstallerFormat::Exe), location)
    }

    /// An `.msi` installer.
    #[must_use]
    pub fn msi(label: impl Into<String>, location: &str) -> Self {
        Self::located(label, ResourceKind::Installer(InstallerFormat::Msi), location)
    }

    /// A `.deb` package file.
    #[must_use]
    pub fn deb(label: impl Into<String>, location: &str) -> Self {
        Self::located(label, ResourceKind::PackageFile, location)
    }

    /// A `.zip` archive.
    #[must_use]
    pub fn zip(label: impl Into<String>, location: &str) -> Self {
        Self::located(label, ResourceKind::Archive(ArchiveFormat::Zip), location)
    }

    /// A `.tar.gz` archive.
    #[must_use]
    pub fn tarball(label: impl Into<String>, location: &str) -> Self {
        Self::located(label, ResourceKind::Archive(ArchiveFormat::TarGz), location)
    }

    /// A static file saved as `<label><extension>`.
    #[must_use]
    pub fn static_asset(label: impl Into<String>, extension: &str, location: &str) -> Self {
        let extension = extension.to_string();
        Self::located(label, ResourceKind::StaticAsset { extension }, location)
    }

    /// Packages from the system repositories.
    #[must_use]
    pub fn apt(label: impl Into<String>, packages: PackageList) -> Self {
        Self::new(label, ResourceKind::Repository { packages })
    }

    /// Packages from a third-party repository.
    #[must_use]
    pub fn ppa(label: impl Into<String>, repository: &str, packages: PackageList) -> Self {
        Self::new(
            label,
            ResourceKind::ThirdPartyRepository {
                repository: repository.to_string(),
                packages,
            },
        )
    }

    /// Set install-time arguments.
    #[must_use]
    pub fn with_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments = arguments.into_iter().map(Into::into).collect();
        self
    }

    /// Delete the artifact after a successful install.
    #[must_use]
    pub const fn removing_after_install(mut self, remove: bool) -> Self {
        self.remove_after_install = remove;
        self
    }

    /// Bypass the agreement gate.
    #[must_use]
    pub const fn overwriting_agreement(mut self, overwrite: bool) -> Self {
        self.overwrite_agreement = overwrite;
        self
    }

    /// Verify fresh downloads against `digest`.
    #[must_use]
    pub fn with_sha256(mut self, digest: impl Into<String>) -> Self {
        self.sha256 = Some(digest.into());
        self
    }

    /// Append a dependency.
    #[must_use]
    pub fn depends_on(mut self, dependency: Self) -> Self {
        self.dependencies.push(dependency);
        self
    }
}

/// A constructed resource with lifecycle state.
#[derive(Debug, Clone)]
pub struct Resource {
    label: String,
    kind: ResourceKind,
    /// Declared source, restored when a removed artifact must be fetched again.
    source: Option<Location>,
    location: Option<Location>,
    arguments: Vec<String>,
    acquired: bool,
    remove_after_install: bool,
    sha256: Option<String>,
    dependencies: Vec<Self>,
}

impl Resource {
    /// Construct a resource (and its dependencies) from `descriptor`.
    ///
    /// Unless the descriptor overrides it, the context's agreement gate is
    /// checked first; nothing else happens until consent is given.
    ///
    /// # Errors
    ///
    /// Returns [`AgreementDeclined`] if consent is refused.
    pub fn new(ctx: &BuildContext, descriptor: ResourceDescriptor) -> Result<Self, AgreementDeclined> {
        if !descriptor.overwrite_agreement {
            ctx.gate.ensure()?;
        }
        let dependencies = descriptor
            .dependencies
            .into_iter()
            .map(|dep| Self::new(ctx, dep))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            label: descriptor.label,
            kind: descriptor.kind,
            source: descriptor.location.clone(),
            location: descriptor.location,
            arguments: descriptor.arguments,
            acquired: false,
            remove_after_install: descriptor.remove_after_install,
            sha256: descriptor.sha256,
            dependencies,
        })
    }

    /// Resource label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Install mechanism.
    #[must_use]
    pub const fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    /// Artifact extension derived from the kind.
    #[must_use]
    pub fn extension(&self) -> &str {
        self.kind.extension()
    }

    /// Current location: the declared source until acquisition, the local
    /// artifact afterwards.
    #[must_use]
    pub const fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    /// Location as declared, unaffected by acquisition.
    #[must_use]
    pub const fn source(&self) -> Option<&Location> {
        self.source.as_ref()
    }

    /// Install-time arguments.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// Whether the resource is ready to install.
    #[must_use]
    pub const fn is_acquired(&self) -> bool {
        self.acquired
    }

    /// Whether the artifact is deleted after install.
    #[must_use]
    pub const fn remove_after_install(&self) -> bool {
        self.remove_after_install
    }

    /// Dependencies in declaration order.
    #[must_use]
    pub fn dependencies(&self) -> &[Self] {
        &self.dependencies
    }

    pub(crate) fn dependencies_mut(&mut self) -> &mut [Self] {
        &mut self.dependencies
    }

    /// Local artifact path, once acquired.
    #[must_use]
    pub fn local_path(&self) -> Option<&Path> {
        if !self.acquired {
            return None;
        }
        self.location.as_ref().and_then(Location::local_path)
    }

    /// Bring the artifact onto this machine.
    ///
    /// The target defaults to `<download_dir>/<label><extension>`.  A file
    /// already at the target counts as acquired without any transfer.
    /// Otherwise a remote location is downloaded to the target, and a local
    /// location is used in place if it exists.  Repository variants register
    /// their repository and refresh the package index instead; `target` is
    /// ignored for them.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError`] describing the failed transfer, file access
    /// or package-manager command.
    pub fn acquire(&mut self, ctx: &BuildContext, target: Option<&Path>) -> Result<(), AcquireError> {
        match &self.kind {
            ResourceKind::Repository { .. } | ResourceKind::ThirdPartyRepository { .. }
                if self.acquired =>
            {
                return Ok(());
            }
            ResourceKind::Repository { .. } => {
                ctx.log.info(&format!("refreshing package index for {}", self.label));
                repository::prepare(ctx.executor.as_ref(), &ctx.commands, None)?;
                self.acquired = true;
                return Ok(());
            }
            ResourceKind::ThirdPartyRepository { repository, .. } => {
                ctx.log.info(&format!("registering {repository} for {}", self.label));
                repository::prepare(ctx.executor.as_ref(), &ctx.commands, Some(repository))?;
                self.acquired = true;
                return Ok(());
            }
            _ => {}
        }

        let target = target.map_or_else(
            || ctx.default_target(&self.label, self.kind.extension()),
            Path::to_path_buf,
        );
        let target =
            std::path::absolute(&target).map_err(|e| AcquireError::filesystem(&target, e))?;

        if target.is_file() {
            ctx.log.debug(&format!(
                "{} already present at {}, skipping download",
                self.label,
                target.display()
            ));
            self.mark_acquired(target);
            return Ok(());
        }

        match self.location.clone() {
            Some(Location::Remote(url)) => {
                ctx.log.info(&format!("downloading {} from {url}", self.label));
                let bytes = ctx.downloader.fetch(&url, &target)?;
                if let Some(expected) = &self.sha256 {
                    verify_sha256(&target, expected, &url)?;
                }
                ctx.log.debug(&format!("{bytes} bytes written to {}", target.display()));
                self.mark_acquired(target);
                Ok(())
            }
            Some(Location::Local(path)) if path.exists() => {
                // Installers and package managers need a path, not a bare name.
                let path =
                    std::path::absolute(&path).map_err(|e| AcquireError::filesystem(&path, e))?;
                ctx.log.debug(&format!("{} uses local file {}", self.label, path.display()));
                self.mark_acquired(path);
                Ok(())
            }
            Some(Location::Local(path)) => Err(AcquireError::filesystem(
                path,
                io::Error::new(io::ErrorKind::NotFound, "local artifact does not exist"),
            )),
            None => Err(AcquireError::filesystem(
                target,
                io::Error::new(io::ErrorKind::NotFound, "resource declares no location"),
            )),
        }
    }

    fn mark_acquired(&mut self, path: PathBuf) {
        self.location = Some(Location::Local(path));
        self.acquired = true;
    }

    /// Build this resource: dependencies first, then acquire if needed, then
    /// install.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] naming the resource whose step failed.
    pub fn apply(&mut self, ctx: &BuildContext) -> Result<(), BuildError> {
        crate::pipeline::apply(ctx, self)
    }

    /// Perform the variant's own install step.  Dependencies are not
    /// touched.
    pub(crate) fn install(&mut self, ctx: &BuildContext) -> Result<(), InstallError> {
        let executor = ctx.executor.as_ref();
        match &self.kind {
            ResourceKind::Repository { packages } => {
                if !self.acquired {
                    repository::prepare(executor, &ctx.commands, None)?;
                    self.acquired = true;
                }
                repository::install_packages(executor, &ctx.commands, packages, &self.arguments)?;
                return Ok(());
            }
            ResourceKind::ThirdPartyRepository {
                repository,
                packages,
            } => {
                if !self.acquired {
                    repository::prepare(executor, &ctx.commands, Some(repository))?;
                    self.acquired = true;
                }
                repository::install_packages(executor, &ctx.commands, packages, &self.arguments)?;
                return Ok(());
            }
            ResourceKind::StaticAsset { .. } => return Ok(()),
            _ => {}
        }

        let path = self
            .local_path()
            .map(Path::to_path_buf)
            .ok_or_else(|| InstallError::NotAcquired {
                label: self.label.clone(),
            })?;

        match &self.kind {
            ResourceKind::Installer(format) => {
                installer::run_installer(executor, &ctx.commands, *format, &path, &self.arguments)?;
            }
            ResourceKind::PackageFile => {
                installer::install_package_file(executor, &ctx.commands, &path, &self.arguments)?;
            }
            ResourceKind::Archive(format) => {
                let dir = archive::extract(&path, *format)?;
                ctx.log.debug(&format!("extracted into {}", dir.display()));
            }
            ResourceKind::StaticAsset { .. }
            | ResourceKind::Repository { .. }
            | ResourceKind::ThirdPartyRepository { .. } => {}
        }

        if self.remove_after_install {
            remove_existing(&path).map_err(|e| InstallError::filesystem(&path, e))?;
            ctx.log.debug(&format!("removed {}", path.display()));
            self.location.clone_from(&self.source);
            self.acquired = false;
        }
        Ok(())
    }
}

/// Shared test helpers for resource and pipeline unit tests.
#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
pub mod test_helpers {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use crate::agreement::ScriptedPrompt;
    use crate::context::BuildContext;
    use crate::download::Downloader;
    use crate::exec::{ExecError, ExecResult, Executor};
    use crate::logging::{BuildStatus, Log};
    use crate::resources::error::AcquireError;

    /// Executor that records every command line and succeeds, unless the
    /// line contains the configured failure marker.
    #[derive(Debug)]
    pub struct RecordingExecutor {
        calls: Mutex<Vec<String>>,
        fail_on: Option<String>,
        which: bool,
    }

    impl Default for RecordingExecutor {
        fn default() -> Self {
            Self::new()
        }
    }

    impl RecordingExecutor {
        /// Executor where every program exists and succeeds.
        #[must_use]
        pub fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on: None,
                which: true,
            }
        }

        /// Fail (exit 100) any command line containing `marker`.
        #[must_use]
        pub fn fail_on(mut self, marker: &str) -> Self {
            self.fail_on = Some(marker.to_string());
            self
        }

        /// Value returned by [`Executor::which`].
        #[must_use]
        pub const fn with_which(mut self, which: bool) -> Self {
            self.which = which;
            self
        }

        /// Command lines run so far, `program arg1 arg2 ...`.
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Executor for RecordingExecutor {
        fn run(&self, program: &str, args: &[&str]) -> Result<ExecResult, ExecError> {
            let line = std::iter::once(program)
                .chain(args.iter().copied())
                .collect::<Vec<_>>()
                .join(" ");
            self.calls.lock().unwrap().push(line.clone());
            if self.fail_on.as_ref().is_some_and(|m| line.contains(m.as_str())) {
                return Err(ExecError::Failed {
                    program: program.to_string(),
                    code: 100,
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
            self.which
        }
    }

    /// Downloader that writes a fixed body and counts transfers.
    #[derive(Debug)]
    pub struct FakeDownloader {
        body: Vec<u8>,
        fail: bool,
        fetches: AtomicUsize,
    }

    impl FakeDownloader {
        /// Downloader writing `body` to every destination.
        #[must_use]
        pub fn new(body: &[u8]) -> Self {
            Self {
                body: body.to_vec(),
                fail: false,
                fetches: AtomicUsize::new(0),
            }
        }

        /// Downloader whose every transfer fails.
        #[must_use]
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(b"")
            }
        }

        /// Number of transfers attempted.
        pub fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    impl Downloader for FakeDownloader {
        fn fetch(&self, url: &str, dest: &Path) -> Result<u64, AcquireError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AcquireError::NetworkFailure {
                    url: url.to_string(),
                    reason: "connection refused".to_string(),
                });
            }
            crate::resources::helpers::fs::ensure_parent_dir(dest)
                .map_err(|e| AcquireError::filesystem(dest, e))?;
            std::fs::write(dest, &self.body).map_err(|e| AcquireError::filesystem(dest, e))?;
            Ok(self.body.len() as u64)
        }
    }

    /// Log that keeps stages and summary entries in memory.
    #[derive(Debug, Default)]
    pub struct RecordingLog {
        stages: Mutex<Vec<String>>,
        entries: Mutex<Vec<(String, BuildStatus)>>,
    }

    impl RecordingLog {
        /// Stage headers logged so far.
        pub fn stages(&self) -> Vec<String> {
            self.stages.lock().unwrap().clone()
        }

        /// Summary entries recorded so far.
        pub fn entries(&self) -> Vec<(String, BuildStatus)> {
            self.entries.lock().unwrap().clone()
        }
    }

    impl Log for RecordingLog {
        fn stage(&self, msg: &str) {
            self.stages.lock().unwrap().push(msg.to_string());
        }
        fn info(&self, _msg: &str) {}
        fn debug(&self, _msg: &str) {}
        fn warn(&self, _msg: &str) {}
        fn error(&self, _msg: &str) {}
        fn record_resource(&self, label: &str, status: BuildStatus, _message: Option<&str>) {
            self.entries
                .lock()
                .unwrap()
                .push((label.to_string(), status));
        }
    }

    /// Test doubles wired into a context.
    #[derive(Debug)]
    pub struct Harness {
        /// The build context under test.
        pub ctx: BuildContext,
        /// Recording command executor.
        pub executor: Arc<RecordingExecutor>,
        /// Fake downloader.
        pub downloader: Arc<FakeDownloader>,
        /// Recording build log.
        pub log: Arc<RecordingLog>,
    }

    /// Context downloading into `dir` with recording doubles and a prompt
    /// that answers `answers` in order.
    pub fn harness_with(
        dir: &Path,
        executor: RecordingExecutor,
        downloader: FakeDownloader,
        answers: &[&str],
    ) -> Harness {
        let executor = Arc::new(executor);
        let downloader = Arc::new(downloader);
        let log = Arc::new(RecordingLog::default());
        let ctx = BuildContext::new(
            dir.to_path_buf(),
            log.clone(),
            Box::new(ScriptedPrompt::new(answers.iter().copied())),
        )
        .with_executor(executor.clone())
        .with_downloader(downloader.clone());
        Harness {
            ctx,
            executor,
            downloader,
            log,
        }
    }

    /// Context with default doubles whose prompt answers "y".
    pub fn harness(dir: &Path) -> Harness {
        harness_with(
            dir,
            RecordingExecutor::new(),
            FakeDownloader::new(b"artifact"),
            &["y"],
        )
    }
}
