#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::wildcard_imports,
    clippy::indexing_slicing,
    clippy::panic
)]
//! Integration tests for building resource files end to end.
//!
//! Each test loads a YAML resource file, constructs the resources through
//! the agreement gate and runs [`pipeline::build`] against recording
//! doubles, then inspects the download directory and the commands issued.

mod common;

use common::*;
use provision_cli::agreement::AgreementDeclined;
use provision_cli::config::resources;
use provision_cli::error::{BuildError, ConfigError, ProvisionError};
use provision_cli::logging::BuildStatus;
use provision_cli::pipeline;
use provision_cli::resources::error::AcquireError;
use provision_cli::resources::{Resource, ResourceDescriptor};
use sha2::Digest as _;

const MICRO_URL: &str = "https://github.com/zyedidia/micro/releases/download/v1.4.1/micro-1.4.1-win64.zip";
const GO_URL: &str = "https://dl.google.com/go/go1.22.linux-amd64.tar.gz";
const BANNER_URL: &str = "https://example.com/banner.png";

fn construct(t: &IntegrationTestContext, descriptors: Vec<ResourceDescriptor>) -> Vec<Resource> {
    descriptors
        .into_iter()
        .map(|d| Resource::new(&t.ctx, d).expect("agreement accepted"))
        .collect()
}

// ---------------------------------------------------------------------------
// Full build
// ---------------------------------------------------------------------------

#[test]
fn builds_mixed_resource_file() {
    let downloader = ServedDownloader::default()
        .serve(MICRO_URL, zip_bytes(&[("micro/micro.exe", b"MZ")]))
        .serve(GO_URL, tar_gz_bytes(&[("go/bin/go", b"#!go")]))
        .serve(BANNER_URL, b"\x89PNG".to_vec());
    let t = IntegrationTestContext::accepting(RecordingExecutor::default(), downloader);
    let deb = t.write_file("code.deb", b"!<arch>");

    let yaml = format!(
        r"
Resources:
  Tools:
    type: apt
    packages: [git, curl]
    depends: [Micro, Code]
  Micro:
    type: zip
    location: {MICRO_URL}
    remove: true
  Code:
    type: deb
    location: {deb}
  Golang:
    type: tarball
    location: {GO_URL}
  Wallpaper:
    type: static
    extension: png
    location: {BANNER_URL}
",
        deb = deb.display()
    );
    let descriptors = resources::parse(&yaml, "mixed.yaml").unwrap();
    let mut built = construct(&t, descriptors);

    let report = pipeline::build(&t.ctx, &mut built).unwrap();
    assert_eq!(
        report.built,
        vec!["Micro", "Code", "Tools", "Golang", "Wallpaper"]
    );

    let dl = t.download_dir();
    assert!(dl.join("Micro").join("micro").join("micro.exe").is_file());
    assert!(!dl.join("Micro.zip").exists(), "zip removed after install");
    assert!(dl.join("Golang").join("go").join("bin").join("go").is_file());
    assert!(dl.join("Golang.tar.gz").is_file(), "tarball kept");
    assert!(dl.join("Wallpaper.png").is_file());

    assert_eq!(
        t.executor.calls(),
        vec![
            format!("sudo apt-get install -y {}", deb.display()),
            "sudo apt-get update".to_string(),
            "sudo apt-get install -y git".to_string(),
            "sudo apt-get install -y curl".to_string(),
        ]
    );
    assert_eq!(t.downloader.fetched(), vec![MICRO_URL, GO_URL, BANNER_URL]);

    let summary: Vec<String> = t
        .log
        .statuses()
        .iter()
        .map(|(label, status)| format!("{label}: {status:?}"))
        .collect();
    insta::assert_snapshot!(summary.join("\n"), @r"
    Micro: Ok
    Code: Ok
    Tools: Ok
    Golang: Ok
    Wallpaper: Ok
    ");
}

#[test]
fn loads_resource_files_from_disk() {
    let downloader = ServedDownloader::default().serve(BANNER_URL, b"img".to_vec());
    let t = IntegrationTestContext::accepting(RecordingExecutor::default(), downloader);
    let first = t.write_file(
        "base.yaml",
        b"Resources:\n  Editors:\n    type: ppa\n    ppa: neovim-ppa/stable\n    packages: neovim\n",
    );
    let second = t.write_file(
        "desktop.yaml",
        format!("Resources:\n  Banner:\n    type: static\n    extension: .png\n    location: {BANNER_URL}\n")
            .as_bytes(),
    );

    let descriptors = resources::load_all(&[first, second]).unwrap();
    let mut built = construct(&t, descriptors);
    pipeline::build(&t.ctx, &mut built).unwrap();

    assert_eq!(
        t.executor.calls(),
        vec![
            "sudo add-apt-repository -y ppa:neovim-ppa/stable",
            "sudo apt-get update",
            "sudo apt-get install -y neovim",
        ]
    );
    assert!(t.download_dir().join("Banner.png").is_file());
}

#[test]
fn label_repeated_across_files_is_rejected_before_building() {
    let t = IntegrationTestContext::accepting(RecordingExecutor::default(), ServedDownloader::default());
    let first = t.write_file(
        "base.yaml",
        b"Resources:\n  Editors:\n    type: apt\n    packages: nano\n",
    );
    let second = t.write_file(
        "desktop.yaml",
        b"Resources:\n  Editors:\n    type: apt\n    packages: vim\n",
    );

    let err = pipeline::build_files(&t.ctx, &[&first, &second], false).unwrap_err();
    let ProvisionError::Config(ConfigError::DuplicateLabel {
        label,
        first: first_file,
        second: second_file,
    }) = err
    else {
        panic!("expected a duplicate label error");
    };
    assert_eq!(label, "Editors");
    assert_eq!(first_file, first.display().to_string());
    assert_eq!(second_file, second.display().to_string());
    assert!(t.executor.calls().is_empty());
    assert!(t.log.entries().is_empty());
}

// ---------------------------------------------------------------------------
// Agreement
// ---------------------------------------------------------------------------

#[test]
fn declined_agreement_stops_before_any_work() {
    let t = IntegrationTestContext::new(
        RecordingExecutor::default(),
        ServedDownloader::default(),
        &["maybe", "no"],
    );
    let descriptor = ResourceDescriptor::zip("Micro", MICRO_URL);
    let err = Resource::new(&t.ctx, descriptor).unwrap_err();
    assert_eq!(err, AgreementDeclined);
    assert!(t.downloader.fetched().is_empty());
    assert!(t.executor.calls().is_empty());
}

#[test]
fn declined_agreement_leaves_no_download_dir() {
    let t = IntegrationTestContext::new(
        RecordingExecutor::default(),
        ServedDownloader::default(),
        &["no"],
    );
    let file = t.write_file(
        "r.yaml",
        format!("Resources:\n  Micro:\n    type: zip\n    location: {MICRO_URL}\n").as_bytes(),
    );
    let err = pipeline::build_files(&t.ctx, &[file], false).unwrap_err();
    assert!(matches!(err, ProvisionError::Agreement(AgreementDeclined)));
    assert!(!t.download_dir().exists());
    assert!(t.downloader.fetched().is_empty());
}

#[test]
fn overwrite_agreement_needs_no_answer() {
    let downloader = ServedDownloader::default().serve(BANNER_URL, b"img".to_vec());
    let t = IntegrationTestContext::new(RecordingExecutor::default(), downloader, &[]);
    let descriptor =
        ResourceDescriptor::static_asset("Banner", ".png", BANNER_URL).overwriting_agreement(true);
    let mut built = construct(&t, vec![descriptor]);
    pipeline::build(&t.ctx, &mut built).unwrap();
    assert!(!t.ctx.gate.is_open());
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[test]
fn continue_on_error_reports_every_failure() {
    let downloader = ServedDownloader::default().serve(BANNER_URL, b"img".to_vec());
    let mut t = IntegrationTestContext::accepting(RecordingExecutor::failing_on("nano"), downloader);
    t.ctx.continue_on_error = true;

    let yaml = format!(
        r"
Resources:
  Missing:
    type: exe
    location: https://example.com/missing.exe
  Editors:
    type: apt
    packages: nano
  Banner:
    type: static
    extension: .png
    location: {BANNER_URL}
"
    );
    let mut built = construct(&t, resources::parse(&yaml, "r.yaml").unwrap());
    let err = pipeline::build(&t.ctx, &mut built).unwrap_err();
    assert_eq!(err.to_string(), "2 resources failed: Missing, Editors");

    let entries = t.log.entries();
    assert_eq!(
        entries,
        vec![
            (
                "Missing".to_string(),
                BuildStatus::Failed,
                Some("network failure".to_string())
            ),
            (
                "Editors".to_string(),
                BuildStatus::Failed,
                Some("process failure".to_string())
            ),
            ("Banner".to_string(), BuildStatus::Ok, None),
        ]
    );
}

#[test]
fn checksum_mismatch_discards_download() {
    let body = b"installer".to_vec();
    let url = "https://example.com/tool.exe";
    let downloader = ServedDownloader::default().serve(url, body.clone());
    let t = IntegrationTestContext::accepting(RecordingExecutor::default(), downloader);

    let wrong = "0".repeat(64);
    let mut built = construct(
        &t,
        vec![ResourceDescriptor::exe("Tool", url).with_sha256(wrong)],
    );
    let err = pipeline::build(&t.ctx, &mut built).unwrap_err();
    assert!(matches!(
        err,
        BuildError::Acquire {
            source: AcquireError::ChecksumMismatch { .. },
            ..
        }
    ));
    assert!(!t.download_dir().join("Tool.exe").exists());
    assert!(t.executor.calls().is_empty());
}

#[test]
fn matching_checksum_installs() {
    let body = b"installer".to_vec();
    let url = "https://example.com/tool.msi";
    let digest = format!("{:x}", sha2::Sha256::digest(&body));
    let downloader = ServedDownloader::default().serve(url, body);
    let t = IntegrationTestContext::accepting(RecordingExecutor::default(), downloader);

    let mut built = construct(
        &t,
        vec![
            ResourceDescriptor::msi("Tool", url)
                .with_sha256(digest)
                .with_arguments(["/quiet"]),
        ],
    );
    pipeline::build(&t.ctx, &mut built).unwrap();
    let msi = t.download_dir().join("Tool.msi");
    assert_eq!(
        t.executor.calls(),
        vec![format!("msiexec /i {} /quiet", msi.display())]
    );
}
