//! Build orchestration: dependency resolution, acquisition and install.
//!
//! [`build`] walks resources in order.  Each resource builds its
//! dependencies depth-first, is acquired if needed, then installed.  A
//! label already built in the same invocation is skipped when its
//! declaration matches and fails with [`BuildError::ConflictingLabel`]
//! otherwise.  A label that reappears in its own dependency chain fails
//! with [`BuildError::CyclicDependency`].
//!
//! [`build_files`] is the library entry point: it loads resource files,
//! passes every resource through the agreement gate, then builds them.
use std::collections::HashMap;
use std::path::Path;

use crate::config::resources;
use crate::context::BuildContext;
use crate::error::{BuildError, ProvisionError};
use crate::logging::BuildStatus;
use crate::resources::{Location, Resource, ResourceDescriptor, ResourceKind};

/// Labels built and skipped by one [`build`] call, in completion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Resources acquired and installed.
    pub built: Vec<String>,
    /// Resources skipped because the label was already built.
    pub skipped: Vec<String>,
}

/// State of one build invocation.
struct Session<'a> {
    ctx: &'a BuildContext,
    /// Labels currently being built, outermost first.
    chain: Vec<String>,
    /// Built labels with the declaration they were built from.
    completed: HashMap<String, (ResourceKind, Option<Location>)>,
    report: BuildReport,
}

impl<'a> Session<'a> {
    fn new(ctx: &'a BuildContext) -> Self {
        Self {
            ctx,
            chain: Vec::new(),
            completed: HashMap::new(),
            report: BuildReport::default(),
        }
    }

    fn build_one(&mut self, resource: &mut Resource) -> Result<(), BuildError> {
        let label = resource.label().to_string();

        if self.chain.contains(&label) {
            let mut chain = self.chain.clone();
            chain.push(label);
            return Err(BuildError::CyclicDependency { chain });
        }

        if let Some((kind, source)) = self.completed.get(&label) {
            if kind != resource.kind() || source.as_ref() != resource.source() {
                let e = BuildError::ConflictingLabel { label };
                self.ctx.log.error(&e.to_string());
                self.ctx.log.record_resource(
                    resource.label(),
                    BuildStatus::Failed,
                    Some(e.kind()),
                );
                return Err(e);
            }
            self.ctx
                .log
                .debug(&format!("skipping {label}: already built in this run"));
            self.ctx
                .log
                .record_resource(&label, BuildStatus::Skipped, Some("already built"));
            self.report.skipped.push(label);
            return Ok(());
        }

        self.chain.push(label.clone());
        let result = self.build_steps(resource);
        self.chain.pop();

        match result {
            Ok(()) => {
                self.ctx.log.record_resource(&label, BuildStatus::Ok, None);
                self.completed.insert(
                    label.clone(),
                    (resource.kind().clone(), resource.source().cloned()),
                );
                self.report.built.push(label);
                Ok(())
            }
            Err(e) => {
                let message = if e.label() == Some(label.as_str()) {
                    self.ctx.log.error(&e.to_string());
                    e.kind().to_string()
                } else {
                    format!("dependency {} failed", e.label().unwrap_or("?"))
                };
                self.ctx
                    .log
                    .record_resource(&label, BuildStatus::Failed, Some(&message));
                Err(e)
            }
        }
    }

    fn build_steps(&mut self, resource: &mut Resource) -> Result<(), BuildError> {
        for dependency in resource.dependencies_mut() {
            self.build_one(dependency)?;
        }

        let ctx = self.ctx;
        let label = resource.label().to_string();
        ctx.log.stage(&label);

        if !resource.is_acquired() {
            resource
                .acquire(ctx, None)
                .map_err(|source| BuildError::Acquire {
                    label: label.clone(),
                    source,
                })?;
        }
        resource
            .install(ctx)
            .map_err(|source| BuildError::Install { label, source })
    }
}

/// Build every resource in order.
///
/// By default the first failure aborts the build.  With
/// [`BuildContext::continue_on_error`] set, failures are collected, the
/// remaining top-level resources are still built, and the collected
/// failures are returned as [`BuildError::Failed`].
///
/// # Errors
///
/// Returns the first [`BuildError`], or [`BuildError::Failed`] in
/// continue-on-error mode.
pub fn build(ctx: &BuildContext, resources: &mut [Resource]) -> Result<BuildReport, BuildError> {
    let mut session = Session::new(ctx);
    let mut failures = Vec::new();

    for resource in resources.iter_mut() {
        match session.build_one(resource) {
            Ok(()) => {}
            Err(e) if ctx.continue_on_error => failures.push(e),
            Err(e) => return Err(e),
        }
    }

    if failures.is_empty() {
        Ok(session.report)
    } else {
        Err(BuildError::Failed(failures))
    }
}

/// Load `files`, construct their resources and build them in order.
///
/// With `accept_agreement` every descriptor is marked pre-accepted, so the
/// gate never prompts.  The download directory is created only after every
/// resource has passed the gate.
///
/// # Errors
///
/// Returns [`ProvisionError::Config`] if a file fails to load,
/// [`ProvisionError::Agreement`] if consent is refused,
/// [`ProvisionError::DownloadDir`] if the download directory cannot be
/// created and [`ProvisionError::Build`] if a resource fails.
pub fn build_files<P: AsRef<Path>>(
    ctx: &BuildContext,
    files: &[P],
    accept_agreement: bool,
) -> Result<BuildReport, ProvisionError> {
    let mut descriptors = resources::load_all(files)?;
    if accept_agreement {
        descriptors.iter_mut().for_each(accept_all);
    }
    ctx.log.info(&format!(
        "loaded {} resources from {} file(s)",
        descriptors.len(),
        files.len()
    ));

    let mut built = descriptors
        .into_iter()
        .map(|descriptor| Resource::new(ctx, descriptor))
        .collect::<Result<Vec<_>, _>>()?;

    let dir = ctx.download_dir();
    std::fs::create_dir_all(dir).map_err(|source| ProvisionError::DownloadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    Ok(build(ctx, &mut built)?)
}

/// Mark `descriptor` and all of its dependencies as pre-accepted.
fn accept_all(descriptor: &mut ResourceDescriptor) {
    descriptor.overwrite_agreement = true;
    descriptor.dependencies.iter_mut().for_each(accept_all);
}

/// Build a single resource in a fresh session.
pub(crate) fn apply(ctx: &BuildContext, resource: &mut Resource) -> Result<(), BuildError> {
    Session::new(ctx).build_one(resource)
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::resources::error::{AcquireError, InstallError};
    use crate::resources::repository::PackageList;
    use crate::resources::test_helpers::{
        FakeDownloader, Harness, RecordingExecutor, harness, harness_with,
    };

    const URL: &str = "https://example.com/download/file";

    fn construct(h: &Harness, descriptors: Vec<ResourceDescriptor>) -> Vec<Resource> {
        descriptors
            .into_iter()
            .map(|d| Resource::new(&h.ctx, d).unwrap())
            .collect()
    }

    #[test]
    fn empty_build_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path());
        let report = build(&h.ctx, &mut []).unwrap();
        assert_eq!(report, BuildReport::default());
        assert!(h.executor.calls().is_empty());
        assert_eq!(h.downloader.fetches(), 0);
    }

    #[test]
    fn static_asset_lands_in_download_dir() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path());
        let mut resources = construct(
            &h,
            vec![ResourceDescriptor::static_asset("Wallpaper", ".png", URL)],
        );
        let report = build(&h.ctx, &mut resources).unwrap();
        assert_eq!(report.built, vec!["Wallpaper"]);
        assert!(dir.path().join("Wallpaper.png").is_file());
        assert!(h.executor.calls().is_empty());
        assert_eq!(
            resources[0].location(),
            Some(&Location::Local(dir.path().join("Wallpaper.png")))
        );
    }

    #[test]
    fn dependencies_install_before_owner() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path());
        let owner = ResourceDescriptor::exe("Owner", URL)
            .depends_on(ResourceDescriptor::msi("DepA", URL))
            .depends_on(ResourceDescriptor::apt("DepB", PackageList::one("curl")))
            .depends_on(ResourceDescriptor::deb("DepC", URL));
        let mut resources = construct(&h, vec![owner]);
        let report = build(&h.ctx, &mut resources).unwrap();

        assert_eq!(report.built, vec!["DepA", "DepB", "DepC", "Owner"]);
        let calls = h.executor.calls();
        let owner_call = calls
            .iter()
            .position(|c| c.contains("Owner.exe"))
            .unwrap();
        assert_eq!(owner_call, calls.len() - 1, "owner must install last: {calls:?}");
        assert!(resources[0].dependencies().iter().all(Resource::is_acquired));
        assert_eq!(h.log.stages(), vec!["DepA", "DepB", "DepC", "Owner"]);
    }

    #[test]
    fn shared_dependency_is_built_once() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path());
        let shared = ResourceDescriptor::apt("Runtime", PackageList::one("libc"));
        let mut resources = construct(
            &h,
            vec![
                ResourceDescriptor::zip("First", URL).depends_on(shared.clone()),
                ResourceDescriptor::zip("Second", URL).depends_on(shared),
            ],
        );
        let report = build(&h.ctx, &mut resources).unwrap();
        assert_eq!(report.built, vec!["Runtime", "First", "Second"]);
        assert_eq!(report.skipped, vec!["Runtime"]);
        let installs = h
            .executor
            .calls()
            .iter()
            .filter(|c| c.ends_with("install -y libc"))
            .count();
        assert_eq!(installs, 1);
    }

    #[test]
    fn conflicting_redeclaration_fails_instead_of_skipping() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path());
        let mut resources = construct(
            &h,
            vec![
                ResourceDescriptor::apt("Editors", PackageList::one("nano")),
                ResourceDescriptor::apt("Editors", PackageList::one("vim")),
            ],
        );
        let err = build(&h.ctx, &mut resources).unwrap_err();
        assert!(
            matches!(err, BuildError::ConflictingLabel { ref label } if label == "Editors"),
            "got {err:?}"
        );
        assert_eq!(
            h.log.entries(),
            vec![
                ("Editors".to_string(), BuildStatus::Ok),
                ("Editors".to_string(), BuildStatus::Failed),
            ]
        );
        assert!(
            !h.executor.calls().iter().any(|c| c.contains("vim")),
            "second declaration must not be half-applied"
        );
    }

    #[test]
    fn cycle_by_label_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path());
        let inner = ResourceDescriptor::exe("A", URL);
        let mid = ResourceDescriptor::exe("B", URL).depends_on(inner);
        let mut resources = construct(&h, vec![ResourceDescriptor::exe("A", URL).depends_on(mid)]);
        let err = build(&h.ctx, &mut resources).unwrap_err();
        match err {
            BuildError::CyclicDependency { chain } => assert_eq!(chain, vec!["A", "B", "A"]),
            other => panic!("expected cycle, got {other:?}"),
        }
        assert!(h.executor.calls().is_empty());
    }

    #[test]
    fn failing_package_stops_build() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness_with(
            dir.path(),
            RecordingExecutor::new().fail_on("install -y nano"),
            FakeDownloader::new(b"bin"),
            &["y"],
        );
        let packages = PackageList::new(vec!["nano".to_string(), "vim".to_string()]).unwrap();
        let mut resources = construct(
            &h,
            vec![
                ResourceDescriptor::apt("Editors", packages),
                ResourceDescriptor::exe("Later", URL),
            ],
        );
        let err = build(&h.ctx, &mut resources).unwrap_err();
        assert!(matches!(
            err,
            BuildError::Install {
                ref label,
                source: InstallError::ProcessFailure(_),
            } if label == "Editors"
        ));
        assert_eq!(
            h.executor.calls(),
            vec!["sudo apt-get update", "sudo apt-get install -y nano"]
        );
        assert_eq!(h.downloader.fetches(), 0, "later resources must not start");
    }

    #[test]
    fn continue_on_error_builds_remaining_resources() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = harness_with(
            dir.path(),
            RecordingExecutor::new(),
            FakeDownloader::failing(),
            &["y"],
        );
        h.ctx.continue_on_error = true;
        let mut resources = construct(
            &h,
            vec![
                ResourceDescriptor::exe("Offline", URL),
                ResourceDescriptor::apt("Tools", PackageList::one("git")),
            ],
        );
        let err = build(&h.ctx, &mut resources).unwrap_err();
        let BuildError::Failed(failures) = err else {
            panic!("expected aggregated failure");
        };
        assert_eq!(failures.len(), 1);
        assert!(matches!(
            failures[0],
            BuildError::Acquire {
                source: AcquireError::NetworkFailure { .. },
                ..
            }
        ));
        assert!(resources[1].is_acquired());
        assert!(
            h.log
                .entries()
                .contains(&("Tools".to_string(), BuildStatus::Ok))
        );
    }

    #[test]
    fn dependency_failure_marks_owner_failed() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness_with(
            dir.path(),
            RecordingExecutor::new().fail_on("Dep.msi"),
            FakeDownloader::new(b"bin"),
            &["y"],
        );
        let mut resources = construct(
            &h,
            vec![ResourceDescriptor::exe("Owner", URL).depends_on(ResourceDescriptor::msi("Dep", URL))],
        );
        let err = build(&h.ctx, &mut resources).unwrap_err();
        assert_eq!(err.label(), Some("Dep"));
        assert_eq!(
            h.log.entries(),
            vec![
                ("Dep".to_string(), BuildStatus::Failed),
                ("Owner".to_string(), BuildStatus::Failed),
            ]
        );
        assert!(!dir.path().join("Owner.exe").exists(), "owner must not be acquired");
    }

    #[test]
    fn apply_builds_single_resource_with_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path());
        let mut resource = Resource::new(
            &h.ctx,
            ResourceDescriptor::tarball("Go", URL).depends_on(ResourceDescriptor::static_asset(
                "Logo", ".svg", URL,
            )),
        )
        .unwrap();
        // FakeDownloader writes plain bytes, which is not a valid tarball.
        let err = resource.apply(&h.ctx).unwrap_err();
        assert!(matches!(
            err,
            BuildError::Install {
                source: InstallError::ArchiveCorrupt { .. },
                ..
            }
        ));
        assert!(dir.path().join("Logo.svg").is_file());
        assert!(resource.is_acquired());
    }

    // -----------------------------------------------------------------------
    // build_files
    // -----------------------------------------------------------------------

    fn write_resources(dir: &Path, name: &str, yaml: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, yaml).unwrap();
        path
    }

    #[test]
    fn build_files_loads_and_builds_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let downloads = dir.path().join("downloads");
        let h = harness(&downloads);
        let base = write_resources(
            dir.path(),
            "base.yaml",
            &format!("Resources:\n  Logo:\n    type: static\n    extension: .svg\n    location: {URL}\n"),
        );
        let tools = write_resources(
            dir.path(),
            "tools.yaml",
            "Resources:\n  Editors:\n    type: apt\n    packages: nano\n",
        );

        let report = build_files(&h.ctx, &[base, tools], false).unwrap();
        assert_eq!(report.built, vec!["Logo", "Editors"]);
        assert!(downloads.join("Logo.svg").is_file());
        assert_eq!(
            h.executor.calls(),
            vec!["sudo apt-get update", "sudo apt-get install -y nano"]
        );
    }

    #[test]
    fn build_files_declined_agreement_creates_no_download_dir() {
        let dir = tempfile::tempdir().unwrap();
        let downloads = dir.path().join("downloads");
        let h = harness_with(
            &downloads,
            RecordingExecutor::new(),
            FakeDownloader::new(b"artifact"),
            &["n"],
        );
        let file = write_resources(
            dir.path(),
            "r.yaml",
            &format!("Resources:\n  Tool:\n    type: exe\n    location: {URL}\n"),
        );

        let err = build_files(&h.ctx, &[file], false).unwrap_err();
        assert!(matches!(err, ProvisionError::Agreement(_)));
        assert!(!downloads.exists());
        assert_eq!(h.downloader.fetches(), 0);
    }

    #[test]
    fn build_files_accept_flag_skips_the_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let downloads = dir.path().join("downloads");
        // No scripted answers: any prompt would read end of input and decline.
        let h = harness_with(
            &downloads,
            RecordingExecutor::new(),
            FakeDownloader::new(b"artifact"),
            &[],
        );
        let file = write_resources(
            dir.path(),
            "r.yaml",
            &format!(
                "Resources:\n  Tool:\n    type: static\n    extension: .bin\n    location: {URL}\n    depends: [Helper]\n  Helper:\n    type: static\n    extension: .dat\n    location: {URL}\n"
            ),
        );

        let report = build_files(&h.ctx, &[file], true).unwrap();
        assert_eq!(report.built, vec!["Helper", "Tool"]);
        assert!(!h.ctx.gate.is_open());
    }

    #[test]
    fn build_files_reports_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(&dir.path().join("downloads"));
        let missing = dir.path().join("absent.yaml");
        let err = build_files(&h.ctx, &[missing], false).unwrap_err();
        assert!(matches!(err, ProvisionError::Config(_)));
    }

    #[test]
    fn build_files_reports_build_errors() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness_with(
            &dir.path().join("downloads"),
            RecordingExecutor::new().fail_on("nano"),
            FakeDownloader::new(b"artifact"),
            &["y"],
        );
        let file = write_resources(
            dir.path(),
            "r.yaml",
            "Resources:\n  Editors:\n    type: apt\n    packages: nano\n",
        );
        let err = build_files(&h.ctx, &[file], false).unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::Build(BuildError::Install { .. })
        ));
    }
}
