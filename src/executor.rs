/// Entry point of the isolated child
///
/// Runs on the launcher's stack inside the fresh PID and mount namespaces, installs the
/// limits, privatizes `/` and then replaces itself with the host shell running the command.
use crate::cpufreq::CpuFrequencyGovernor;
use crate::namespace::NamespaceIsolation;
use crate::output::Console;
use crate::resource_limits::ResourceLimitController;
use crate::types::{FrequencyScope, Result, SandboxError, SandboxRequest};
use nix::sched::{sched_setaffinity, CpuSet};
use nix::unistd::{dup2, Pid};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::os::unix::process::CommandExt;
use std::process::Command;

/// Shell used to interpret the command line
pub const SHELL: &str = "/bin/sh";

/// Status the child exits with when setup or exec fails
pub const CHILD_FAILURE_STATUS: isize = 1;

/// What the child tells the parent when it gives up before exec
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupFailure {
    pub stage: String,
    pub message: String,
}

impl From<SetupFailure> for SandboxError {
    fn from(failure: SetupFailure) -> Self {
        SandboxError::ChildSetup {
            stage: failure.stage,
            message: failure.message,
        }
    }
}

/// Settings the child needs beyond its positional arguments
#[derive(Debug, Clone)]
pub struct ChildContext {
    pub strict_limits: bool,
    pub governor: CpuFrequencyGovernor,
    pub namespaces: NamespaceIsolation,
    pub console: Console,
}

/// Child side of the setup-report channel.
///
/// The socket is close-on-exec, so a successful exec closes it without a message.
pub struct SetupReporter<'a> {
    stream: &'a UnixStream,
}

impl<'a> SetupReporter<'a> {
    pub fn new(stream: &'a UnixStream) -> Self {
        Self { stream }
    }

    fn report(&self, stage: &str, error: &SandboxError) {
        let failure = SetupFailure {
            stage: stage.to_string(),
            message: error.to_string(),
        };
        let mut stream = self.stream;
        if serde_json::to_writer(&mut stream, &failure).is_err() {
            // Parent will still see a non-zero exit.
            log::error!("Could not report setup failure to the supervisor");
        }
        let _ = stream.flush();
    }
}

/// Read whatever the child reported; `None` when it reached exec
pub fn read_setup_failure(mut stream: UnixStream) -> Result<Option<SetupFailure>> {
    let mut raw = String::new();
    stream.read_to_string(&mut raw)?;

    if raw.trim().is_empty() {
        return Ok(None);
    }

    Ok(Some(serde_json::from_str(&raw).unwrap_or(SetupFailure {
        stage: "unknown".to_string(),
        message: raw,
    })))
}

/// Run inside the cloned child; the return value becomes the child's exit status
pub fn run_isolated(args: &[String], ctx: &ChildContext, reporter: &SetupReporter<'_>) -> isize {
    let request = match SandboxRequest::from_positional(args) {
        Ok(request) => request,
        Err(e) => {
            reporter.report("argument parsing", &e);
            return CHILD_FAILURE_STATUS;
        }
    };

    if let Err((stage, e)) = prepare(&request, ctx) {
        log::error!("Setup failed during {}: {}", stage, e);
        reporter.report(stage, &e);
        return CHILD_FAILURE_STATUS;
    }

    ctx.console
        .command(&format!("Executing command: {}", request.command));

    // Only returns on failure.
    let error = Command::new(SHELL).arg("-c").arg(&request.command).exec();

    log::error!("exec of {} failed: {}", SHELL, error);
    ctx.console.failure("Failed to execute command");
    CHILD_FAILURE_STATUS
}

fn prepare(
    request: &SandboxRequest,
    ctx: &ChildContext,
) -> std::result::Result<(), (&'static str, SandboxError)> {
    ctx.console.stage("Setting resource limits...");
    let controller = ResourceLimitController::new(ctx.strict_limits, ctx.console);
    let applied = controller
        .apply(request.max_memory_mb, request.max_cpu_seconds)
        .map_err(|e| ("resource limits", e))?;
    log::debug!("Limits in force: {:?}", applied);
    match controller.current_limits() {
        Ok(current) => log::debug!("Kernel reports {:?}", current),
        Err(e) => log::debug!("{}", e),
    }

    if let FrequencyScope::PinnedCore(core) = ctx.governor.scope() {
        pin_to_core(core).map_err(|e| ("cpu affinity", e))?;
    }
    ctx.governor
        .apply(request.cpu_freq_mhz, &ctx.console)
        .map_err(|e| {
            ctx.console.failure("Failed to set CPU frequency");
            ("cpu frequency", e)
        })?;

    ctx.console
        .stage("Mounting filesystem for process isolation...");
    ctx.namespaces
        .setup_mount_namespace()
        .map_err(|e| ("mount isolation", e))?;

    // stdout carries the JSON report, so the command's own output joins the progress lines.
    if ctx.console.writes_to_stderr() {
        redirect_stdout_to_stderr().map_err(|e| ("output redirect", e))?;
    }

    Ok(())
}

fn redirect_stdout_to_stderr() -> Result<()> {
    dup2(libc::STDERR_FILENO, libc::STDOUT_FILENO)
        .map(|_| ())
        .map_err(|e| SandboxError::Process(format!("Failed to point stdout at stderr: {}", e)))
}

/// Restrict the calling process to a single core
pub fn pin_to_core(core: usize) -> Result<()> {
    let mut cpu_set = CpuSet::new();
    cpu_set
        .set(core)
        .map_err(|e| SandboxError::Config(format!("invalid core {}: {}", core, e)))?;
    sched_setaffinity(Pid::from_raw(0), &cpu_set)
        .map_err(|e| SandboxError::Process(format!("Failed to pin to cpu{}: {}", core, e)))?;
    log::debug!("Pinned to cpu{}", core);
    Ok(())
}
