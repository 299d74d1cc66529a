use crate::{is_root, sandbox};
use choco_sandbox::cpufreq::CpuFrequencyGovernor;
use choco_sandbox::executor::ChildContext;
use choco_sandbox::launcher::IsolationLauncher;
use choco_sandbox::namespace::NamespaceIsolation;
use choco_sandbox::output::Console;
use choco_sandbox::types::{FrequencyScope, Limit, SandboxRequest};
use nix::sys::signal::kill;
use predicates::prelude::*;
use serial_test::serial;

#[test]
#[serial]
#[ignore] // requires root: run with sudo and --ignored
fn test_child_is_pid_one() {
    if !is_root() {
        return;
    }

    sandbox()
        .args(["echo PID=$$", "-1", "-1", "-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PID=1\n"))
        .stdout(predicate::str::contains("Child process exited with status: 0"));
}

#[test]
#[serial]
#[ignore] // requires root: run with sudo and --ignored
fn test_command_exit_code_is_reported_not_propagated() {
    if !is_root() {
        return;
    }

    sandbox()
        .args(["exit 3", "-1", "-1", "-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Child process exited with status: 3"))
        .stdout(predicate::str::contains("killed by signal").not());
}

#[test]
#[serial]
#[ignore] // requires root: run with sudo and --ignored
fn test_stage_announcements_in_order() {
    if !is_root() {
        return;
    }

    let output = sandbox()
        .args(["true", "-1", "-1", "-1"])
        .output()
        .expect("Failed to run sandbox");
    let stdout = String::from_utf8_lossy(&output.stdout);

    let stages = [
        "Allocating stack for child process...",
        "Cloning process...",
        "Setting resource limits...",
        "Mounting filesystem for process isolation...",
        "Executing command: true",
        "Child process exited with status: 0",
    ];
    let mut last = 0;
    for stage in stages {
        let at = stdout[last..]
            .find(stage)
            .unwrap_or_else(|| panic!("missing or out of order: {}\n{}", stage, stdout));
        last += at + stage.len();
    }
}

#[test]
#[serial]
#[ignore] // requires root: run with sudo and --ignored
fn test_mounts_do_not_leak_to_host() {
    if !is_root() {
        return;
    }

    let target = tempfile::tempdir().expect("Failed to create mount point");
    let path = target.path().display().to_string();
    let script = format!(
        "mount -t tmpfs sandbox-test {p} && grep -q ' {p} ' /proc/self/mountinfo && echo MOUNTED",
        p = path
    );

    sandbox()
        .args([script.as_str(), "-1", "-1", "-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("MOUNTED"));

    let host_mounts = std::fs::read_to_string("/proc/self/mountinfo").unwrap();
    assert!(
        !host_mounts.contains(&format!(" {} ", path)),
        "tmpfs mounted inside the sandbox is visible on the host"
    );
}

#[test]
#[serial]
#[ignore] // requires root: run with sudo and --ignored
fn test_json_report() {
    if !is_root() {
        return;
    }

    let output = sandbox()
        .args(["--json", "exit 4", "-1", "-1", "-1"])
        .output()
        .expect("Failed to run sandbox");
    assert!(output.status.success());

    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be the JSON report");
    assert_eq!(report["outcome"]["exited"], 4);
    assert_eq!(report["timed_out"], false);
    assert!(report["pid"].as_i64().unwrap() > 1);
}

#[test]
#[serial]
#[ignore] // requires root: run with sudo and --ignored
fn test_json_report_survives_command_output() {
    if !is_root() {
        return;
    }

    let output = sandbox()
        .args(["--json", "echo hello from the child", "-1", "-1", "-1"])
        .output()
        .expect("Failed to run sandbox");
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout)
        .expect("command output must not end up on stdout in JSON mode");
    assert_eq!(report["outcome"]["exited"], 0);
    assert!(String::from_utf8_lossy(&output.stderr).contains("hello from the child"));
}

#[test]
#[serial]
#[ignore] // requires root: run with sudo and --ignored
fn test_dropped_handle_kills_and_reaps_child() {
    if !is_root() {
        return;
    }

    let request =
        SandboxRequest::new("sleep 30", Limit::Unlimited, Limit::Unlimited, Limit::Unlimited)
            .unwrap();
    let ctx = ChildContext {
        strict_limits: true,
        governor: CpuFrequencyGovernor::new("/nonexistent", FrequencyScope::Host),
        namespaces: NamespaceIsolation::default(),
        console: Console::default(),
    };

    let child = IsolationLauncher::new(NamespaceIsolation::default(), Console::default())
        .launch(&request, ctx)
        .expect("Failed to launch child");
    let pid = child.pid();
    assert!(kill(pid, None).is_ok());

    drop(child);
    // Killed and reaped, so the pid no longer names a process (not even a zombie)
    assert!(kill(pid, None).is_err());
}

#[test]
#[serial]
#[ignore] // requires root: run with sudo and --ignored
fn test_wall_timeout_kills_child() {
    if !is_root() {
        return;
    }

    sandbox()
        .args(["--wall-timeout", "1", "sleep 60", "-1", "-1", "-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Child process was killed by signal: 9").not())
        .stderr(predicate::str::contains("Child process was killed by signal: 9"))
        .stderr(predicate::str::contains("Wall-clock deadline exceeded"));
}
