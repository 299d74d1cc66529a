use crate::sandbox;
use predicates::prelude::*;

#[test]
fn test_missing_positionals_exit_one() {
    sandbox()
        .args(["echo hi", "64", "1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("<CPU_FREQ_MHZ>"));
}

#[test]
fn test_non_numeric_limit_exit_one() {
    sandbox()
        .args(["echo hi", "lots", "-1", "-1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not an integer"));
}

#[test]
fn test_blank_command_exit_one() {
    sandbox()
        .args(["   ", "-1", "-1", "-1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Empty command"));
}

#[test]
fn test_help_exits_zero() {
    sandbox()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Use -1 for any limit"));
}

#[test]
fn test_non_root_launch_fails_with_exit_one() {
    if crate::is_root() {
        return;
    }

    sandbox()
        .args(["echo SHOULD_NOT_RUN", "-1", "-1", "-1"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("SHOULD_NOT_RUN").not())
        .stderr(predicate::str::contains("Namespace error"));
}
