use crate::{is_root, sandbox};
use choco_sandbox::resource_limits::ResourceLimitController;
use choco_sandbox::output::Console;
use predicates::prelude::*;
use serial_test::serial;

#[test]
fn test_current_limits_readable() {
    let controller = ResourceLimitController::new(true, Console::default());
    let limits = controller.current_limits().expect("Should be able to read limits");
    if let (Some(soft), Some(hard)) = (limits.cpu_time_soft, limits.cpu_time_hard) {
        assert!(soft <= hard);
    }
}

#[test]
#[serial]
#[ignore] // requires root: run with sudo and --ignored
fn test_unlimited_prints_no_confirmation() {
    if !is_root() {
        return;
    }

    sandbox()
        .args(["exit 0", "-1", "-1", "-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Memory limit set to").not())
        .stdout(predicate::str::contains("CPU time limit set to").not())
        .stdout(predicate::str::contains("Child process exited with status: 0"));
}

#[test]
#[serial]
#[ignore] // requires root: run with sudo and --ignored
fn test_limits_are_visible_to_the_command() {
    if !is_root() {
        return;
    }

    sandbox()
        .args(["echo AS=$(ulimit -v) CPU=$(ulimit -t)", "64", "3", "-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Memory limit set to 64MB"))
        .stdout(predicate::str::contains("CPU time limit set to 3 seconds"))
        // ulimit -v reports KiB
        .stdout(predicate::str::contains("AS=65536 CPU=3"));
}

#[test]
#[serial]
#[ignore] // requires root: run with sudo and --ignored
fn test_cpu_spin_is_killed_by_kernel() {
    if !is_root() {
        return;
    }

    let started = std::time::Instant::now();
    sandbox()
        .args(["while :; do :; done", "-1", "1", "-1"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Child process was killed by signal"));
    assert!(started.elapsed() < std::time::Duration::from_secs(15));
}

#[test]
#[serial]
#[ignore] // requires root: run with sudo and --ignored
fn test_memory_hog_does_not_succeed() {
    if !is_root() {
        return;
    }

    let output = sandbox()
        .args(["head -c 1G /dev/zero | tail -n 1 > /dev/null", "64", "-1", "-1"])
        .output()
        .expect("Failed to run sandbox");
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "supervision itself should complete");
    assert!(stdout.contains("Memory limit set to 64MB"));
    assert!(!stdout.contains("Child process exited with status: 0"), "{}", stdout);
}
