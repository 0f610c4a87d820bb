use assert_cmd::Command;
use bundle_updater::test_utils::write_descriptor;
use bundle_updater::updater::{ChecksumAlgorithm, ChecksumVerifier};
use predicates::prelude::*;
use tempfile::TempDir;

/// `bundle-updater` isolated from the user's config and terminal.
fn updater(temp: &TempDir) -> Command {
    let config = temp.path().join("config.toml");
    if !config.exists() {
        std::fs::write(&config, "").unwrap();
    }

    let mut cmd = Command::cargo_bin("bundle-updater").unwrap();
    cmd.current_dir(temp.path())
        .env("BUNDLE_UPDATER_CONFIG", &config)
        .env("BUNDLE_UPDATER_NO_PROGRESS", "1")
        .env_remove("BUNDLE_UPDATER_TOKEN")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_verify_matching_checksum() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("update.zip");
    std::fs::write(&file, b"payload").unwrap();
    let checksum = ChecksumVerifier::digest(ChecksumAlgorithm::Sha1, b"payload");

    updater(&temp)
        .args(["verify", file.to_str().unwrap(), &checksum])
        .assert()
        .success()
        .stdout(predicate::str::contains("OK"));
}

#[test]
fn test_verify_mismatch_exit_code() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("update.zip");
    std::fs::write(&file, b"payload").unwrap();
    let wrong = ChecksumVerifier::digest(ChecksumAlgorithm::Sha256, b"other");

    // failed_to_download_update is ordinal 5
    updater(&temp)
        .args(["verify", file.to_str().unwrap(), &wrong])
        .assert()
        .code(15)
        .stderr(predicate::str::contains("failed_to_download_update"));
}

#[test]
fn test_verify_prints_digest() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("update.zip");
    std::fs::write(&file, b"payload").unwrap();

    updater(&temp)
        .args(["verify", file.to_str().unwrap(), "--algorithm", "sha1"])
        .assert()
        .success()
        .stdout(predicate::str::contains(ChecksumVerifier::digest(
            ChecksumAlgorithm::Sha1,
            b"payload",
        )));
}

#[test]
fn test_check_reports_available_update() {
    let temp = TempDir::new().unwrap();
    let install_dir = temp.path().join("resources");
    std::fs::create_dir_all(&install_dir).unwrap();
    write_descriptor(&install_dir, "1.0.0");
    let manifest = temp.path().join("latest.json");
    std::fs::write(
        &manifest,
        r#"{"version": "1.1.0", "downloadUrl": "https://releases.test/update.zip"}"#,
    )
    .unwrap();

    updater(&temp)
        .args(["--install-dir", install_dir.to_str().unwrap()])
        .args(["check", "--manifest", manifest.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("1.0.0 -> 1.1.0"));

    assert!(install_dir.join("updater-log.txt").exists());
}

#[test]
fn test_check_up_to_date_json() {
    let temp = TempDir::new().unwrap();
    let install_dir = temp.path().join("resources");
    std::fs::create_dir_all(&install_dir).unwrap();
    write_descriptor(&install_dir, "1.1.0");
    let manifest = temp.path().join("latest.json");
    std::fs::write(&manifest, r#"{"last": "1.1.0"}"#).unwrap();

    updater(&temp)
        .args(["--install-dir", install_dir.to_str().unwrap()])
        .args(["check", "--json", "--manifest", manifest.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"update_available\": false"));
}

#[test]
fn test_check_invalid_manifest() {
    let temp = TempDir::new().unwrap();
    let install_dir = temp.path().join("resources");
    std::fs::create_dir_all(&install_dir).unwrap();
    write_descriptor(&install_dir, "1.0.0");
    let manifest = temp.path().join("latest.json");
    std::fs::write(&manifest, "not json").unwrap();

    // api_response_not_valid is ordinal 3
    updater(&temp)
        .args(["--install-dir", install_dir.to_str().unwrap()])
        .args(["check", "--manifest", manifest.to_str().unwrap()])
        .assert()
        .code(13);
}

#[test]
fn test_check_without_source() {
    let temp = TempDir::new().unwrap();
    updater(&temp).arg("check").assert().failure().stderr(predicate::str::contains("--manifest"));
}

#[test]
fn test_status_shows_version() {
    let temp = TempDir::new().unwrap();
    let install_dir = temp.path().join("resources");
    std::fs::create_dir_all(&install_dir).unwrap();
    write_descriptor(&install_dir, "3.2.1");

    updater(&temp)
        .args(["--install-dir", install_dir.to_str().unwrap(), "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3.2.1"))
        .stdout(predicate::str::contains("missing"));
}
