use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_lists_subcommands() {
    let bin = assert_cmd::cargo::cargo_bin!("remote-provision");
    Command::new(bin)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("provision"))
        .stdout(predicate::str::contains("detect"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn detect_requires_target_arguments() {
    let bin = assert_cmd::cargo::cargo_bin!("remote-provision");
    Command::new(bin)
        .arg("detect")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--host"));
}

#[test]
fn invalid_urls_file_fails_before_connecting() {
    let dir = tempfile::tempdir().expect("tempdir");
    let urls_path = dir.path().join("urls.json");
    std::fs::write(&urls_path, "not json").expect("write urls file");

    let bin = assert_cmd::cargo::cargo_bin!("remote-provision");
    Command::new(bin)
        .env("REMOTE_PROVISION_PASSWORD", "hunter2")
        .args([
            "--host",
            "host.invalid",
            "--user",
            "root",
            "--agent",
            "daytona",
            "--urls",
            urls_path.to_string_lossy().as_ref(),
            "provision",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Json"));
}

#[test]
fn missing_auth_is_reported() {
    let bin = assert_cmd::cargo::cargo_bin!("remote-provision");
    Command::new(bin)
        .env_remove("REMOTE_PROVISION_PASSWORD")
        .args(["--host", "host.invalid", "--user", "root", "--agent", "daytona", "detect"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("MissingAuth"));
}
