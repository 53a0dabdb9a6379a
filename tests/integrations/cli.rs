use assert_cmd::Command;
use predicates::prelude::*;

fn alertcast() -> Command {
    let mut cmd = Command::cargo_bin("alertcast").unwrap();
    // Keep the host's configuration out of the run.
    cmd.env_remove("ALERTCAST_FIREBASE__ACCESS_TOKEN")
        .env_remove("ALERTCAST_FIREBASE__CREDENTIALS_PATH")
        .env_remove("ALERTCAST_DISPATCH__BATCH_SIZE")
        .current_dir(std::env::temp_dir());
    cmd
}

#[test]
fn test_help_lists_flags() {
    alertcast()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--batch-size"))
        .stdout(predicate::str::contains("--credentials"));
}

#[test]
fn test_version_is_printed() {
    alertcast()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_invalid_batch_size_exits_with_error() {
    alertcast()
        .args(["--batch-size", "0", "--config", "/nonexistent/alertcast.toml"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("dispatch.batch_size"));
}

#[test]
fn test_missing_credentials_exits_with_error() {
    alertcast()
        .args(["--config", "/nonexistent/alertcast.toml", "--listen", "127.0.0.1:0"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("no Firebase credentials"));
}

#[test]
fn test_unknown_flag_is_rejected() {
    alertcast()
        .arg("--no-such-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--no-such-flag"));
}
