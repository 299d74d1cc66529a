use crate::{fake_cpufreq_root, is_root, read_khz, sandbox};
use predicates::prelude::*;
use serial_test::serial;

#[test]
#[serial]
#[ignore] // requires root: run with sudo and --ignored
fn test_missing_controls_abort_before_command() {
    if !is_root() {
        return;
    }

    sandbox()
        .args(["--cpufreq-root", "/nonexistent/cpufreq", "echo SHOULD_NOT_RUN", "-1", "-1", "1000"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("SHOULD_NOT_RUN").not())
        .stderr(predicate::str::contains("Failed to set CPU frequency"));
}

#[test]
#[serial]
#[ignore] // requires root: run with sudo and --ignored
fn test_unlimited_frequency_leaves_controls_alone() {
    if !is_root() {
        return;
    }

    let root = fake_cpufreq_root(400_000, 3_000_000);
    sandbox()
        .args(["--cpufreq-root", root.path().to_str().unwrap(), "true", "-1", "-1", "-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("CPU frequency set to").not());

    assert_eq!(read_khz(&root, "scaling_min_freq"), 400_000);
    assert_eq!(read_khz(&root, "scaling_max_freq"), 3_000_000);
}

#[test]
#[serial]
#[ignore] // requires root: run with sudo and --ignored
fn test_frequency_applied_during_run_and_restored() {
    if !is_root() {
        return;
    }

    let root = fake_cpufreq_root(400_000, 3_000_000);
    let script = format!(
        "cat {}/cpu0/cpufreq/scaling_max_freq",
        root.path().display()
    );

    sandbox()
        .args(["--cpufreq-root", root.path().to_str().unwrap()])
        .args([script.as_str(), "-1", "-1", "1200"])
        .assert()
        .success()
        .stdout(predicate::str::contains("CPU frequency set to 1200 MHz"))
        .stdout(predicate::str::contains("1200000"));

    assert_eq!(read_khz(&root, "scaling_min_freq"), 400_000);
    assert_eq!(read_khz(&root, "scaling_max_freq"), 3_000_000);
}

#[test]
#[serial]
#[ignore] // requires root: run with sudo and --ignored
fn test_keep_frequency_skips_restore() {
    if !is_root() {
        return;
    }

    let root = fake_cpufreq_root(400_000, 3_000_000);
    sandbox()
        .args(["--keep-frequency", "--cpufreq-root", root.path().to_str().unwrap()])
        .args(["true", "-1", "-1", "800"])
        .assert()
        .success();

    assert_eq!(read_khz(&root, "scaling_min_freq"), 800_000);
    assert_eq!(read_khz(&root, "scaling_max_freq"), 800_000);
}
