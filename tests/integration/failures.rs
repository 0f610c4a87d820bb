use bundle_updater::core::{UpdateErrorKind, UpdaterError};
use bundle_updater::test_utils::{
    FaultyFs, FsOp, RecordingSpawner, StaticTransport, release_archive,
};
use bundle_updater::updater::{Phase, RemoteManifest};

use crate::common::{ARTIFACT_URL, TestInstall};

fn remote() -> RemoteManifest {
    RemoteManifest::new("1.1.0").with_download_url(ARTIFACT_URL)
}

async fn run_failing(install: &TestInstall, transport: StaticTransport, fs: FaultyFs, remote: RemoteManifest) -> UpdaterError {
    let orchestrator =
        install.orchestrator(transport, fs, RecordingSpawner::exiting_with(Some(0)), false);
    let err = orchestrator.run(remote).await.unwrap_err();

    let outcomes = install.outcomes();
    assert_eq!(outcomes.len(), 1, "exactly one completion per run");
    assert_eq!(outcomes[0].error, err.kind());
    assert_eq!(outcomes[0].phase, Phase::Failed);
    err
}

#[tokio::test]
async fn test_wrong_checksum_writes_nothing() {
    let install = TestInstall::new("1.0.0", b"bundle 1.0.0");
    let before = install.files();

    let err = run_failing(
        &install,
        StaticTransport::new().with_bytes(ARTIFACT_URL, release_archive(b"bundle 1.1.0")),
        FaultyFs::new(),
        remote().with_checksum(format!("sha1:{}", "0".repeat(40))),
    )
    .await;

    assert!(matches!(err, UpdaterError::ChecksumMismatch { .. }));
    assert_eq!(err.kind(), Some(UpdateErrorKind::FailedToDownloadUpdate));
    assert_eq!(install.files(), before);
    assert_eq!(std::fs::read(install.installed_bundle()).unwrap(), b"bundle 1.0.0");
}

#[tokio::test]
async fn test_artifact_not_found() {
    let install = TestInstall::new("1.0.0", b"bundle");
    let err = run_failing(&install, StaticTransport::new(), FaultyFs::new(), remote()).await;
    assert_eq!(err.kind(), Some(UpdateErrorKind::UpdateFileNotFound));
}

#[tokio::test]
async fn test_connection_dropped_mid_body() {
    let install = TestInstall::new("1.0.0", b"bundle");
    let before = install.files();

    let err = run_failing(
        &install,
        StaticTransport::new().with_broken_body(ARTIFACT_URL, b"PK\x03\x04partial"),
        FaultyFs::new(),
        remote(),
    )
    .await;

    assert_eq!(err.kind(), Some(UpdateErrorKind::FailedToDownloadUpdate));
    assert_eq!(install.files(), before);
}

#[tokio::test]
async fn test_server_error_status() {
    let install = TestInstall::new("1.0.0", b"bundle");
    let err = run_failing(
        &install,
        StaticTransport::new().with_status(ARTIFACT_URL, 500),
        FaultyFs::new(),
        remote(),
    )
    .await;
    assert_eq!(err.kind(), Some(UpdateErrorKind::FailedToDownloadUpdate));
}

#[tokio::test]
async fn test_missing_local_version() {
    let install = TestInstall::new("1.0.0", b"bundle");
    std::fs::write(&install.layout.descriptor, r#"{"name": "demo-app"}"#).unwrap();

    let err = run_failing(&install, StaticTransport::new(), FaultyFs::new(), remote()).await;
    assert_eq!(err.kind(), Some(UpdateErrorKind::VersionNotSpecified));
}

#[tokio::test]
async fn test_remote_without_version() {
    let install = TestInstall::new("1.0.0", b"bundle");
    let remote = RemoteManifest::from_json(r#"{"downloadUrl": "http://releases.test/update.zip"}"#).unwrap();

    let err = run_failing(&install, StaticTransport::new(), FaultyFs::new(), remote).await;
    assert_eq!(err.kind(), Some(UpdateErrorKind::ApiResponseNotValid));
}

#[tokio::test]
async fn test_rename_failure_reports_missing_bundle() {
    let install = TestInstall::new("1.0.0", b"bundle 1.0.0");

    let err = run_failing(
        &install,
        StaticTransport::new().with_bytes(ARTIFACT_URL, release_archive(b"bundle 1.1.0")),
        FaultyFs::new().fail_on(FsOp::Rename),
        remote(),
    )
    .await;

    assert!(matches!(err, UpdaterError::BundleMissing { .. }));
    assert!(err.kind().unwrap().is_fatal());
    assert!(!install.installed_bundle().exists());
}

#[tokio::test]
async fn test_unlink_failure_keeps_old_bundle() {
    let install = TestInstall::new("1.0.0", b"bundle 1.0.0");

    let err = run_failing(
        &install,
        StaticTransport::new().with_bytes(ARTIFACT_URL, release_archive(b"bundle 1.1.0")),
        FaultyFs::new().fail_on(FsOp::RemoveFile),
        remote(),
    )
    .await;

    assert_eq!(err.kind(), Some(UpdateErrorKind::FailedToApplyUpdate));
    assert_eq!(std::fs::read(install.installed_bundle()).unwrap(), b"bundle 1.0.0");
}
