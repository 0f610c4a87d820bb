use assert_cmd::Command;
use tempfile::TempDir;

fn swap() -> Command {
    let mut cmd = Command::cargo_bin("bundle-swap").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_swap_moves_bundle_into_place() {
    let temp = TempDir::new().unwrap();
    let new_bundle = temp.path().join("update.asar");
    let installed = temp.path().join("app.asar");
    std::fs::write(&new_bundle, b"new").unwrap();
    std::fs::write(&installed, b"old").unwrap();

    swap().arg(&new_bundle).arg(&installed).assert().success();

    assert_eq!(std::fs::read(&installed).unwrap(), b"new");
    assert!(!new_bundle.exists());
    assert!(temp.path().join("updater-log.txt").exists());
}

#[test]
fn test_swap_missing_new_bundle_fails() {
    let temp = TempDir::new().unwrap();
    let installed = temp.path().join("app.asar");
    std::fs::write(&installed, b"old").unwrap();

    swap()
        .arg(temp.path().join("update.asar"))
        .arg(&installed)
        .args(["--max-attempts", "1"])
        .assert()
        .code(1);

    assert_eq!(std::fs::read(&installed).unwrap(), b"old");
}

#[test]
fn test_swap_usage_error() {
    swap().assert().code(2);
}
