//! Integration tests for the depot CLI

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use serial_test::serial;

    fn depot() -> Command {
        cargo_bin_cmd!("depot")
    }

    #[test]
    fn help_displays() {
        depot()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("bundle fetcher and launcher"));
    }

    #[test]
    fn version_displays() {
        depot()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("depot"));
    }

    // Status, stop, and cache talk to the shared state directory; keep
    // them off each other's toes.
    #[test]
    #[serial]
    fn status_runs() {
        depot().arg("status").assert().success();
    }

    #[test]
    #[serial]
    fn cache_list_runs() {
        depot().args(["cache", "list"]).assert().success().stdout(
            predicate::str::contains("Cache is empty").or(predicate::str::contains("KEY")),
        );
    }

    #[test]
    fn install_requires_dest() {
        depot()
            .args(["install", "https://example.com/bundle.7z"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--dest"));
    }

    #[test]
    fn install_rejects_uneven_sizes() {
        depot()
            .args([
                "install",
                "https://example.com/a.7z",
                "https://example.com/b.7z",
                "--dest",
                "/tmp/depot-test-dest",
                "--size",
                "10",
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("declare every size or none"));
    }

    #[test]
    #[serial]
    fn stop_unused_port_reports_nothing_running() {
        // High port with nothing listening and no lock recorded.
        depot()
            .args(["stop", "64999"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Nothing running"));
    }

    #[test]
    fn launch_missing_program_fails() {
        depot()
            .args(["launch", "/no/such/depot-test-binary"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error"));
    }
}
