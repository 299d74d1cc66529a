/// Waiting on the isolated child and classifying how it ended
use crate::executor::read_setup_failure;
use crate::launcher::IsolatedChild;
use crate::output::Console;
use crate::types::{ExitOutcome, Result, SandboxError, SupervisionReport};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Map a raw wait status to an outcome; `None` for statuses that are not terminal
pub fn classify(status: WaitStatus) -> Option<ExitOutcome> {
    match status {
        WaitStatus::Exited(_, code) => Some(ExitOutcome::Exited(code)),
        WaitStatus::Signaled(_, signal, _) => Some(ExitOutcome::Signaled(signal as i32)),
        _ => None,
    }
}

/// Whether a run ended because of our deadline kill.
///
/// A child that exited on its own, or died of another signal, before the kill landed did
/// not time out.
pub fn deadline_expired(killed: bool, outcome: ExitOutcome) -> bool {
    killed && outcome == ExitOutcome::Signaled(libc::SIGKILL)
}

/// Block until `pid` terminates.
///
/// With a deadline the child is polled; once the deadline passes it is sent `SIGKILL`.
/// The returned flag is `true` only when that kill is what ended the child.
pub fn wait_for(pid: Pid, deadline: Option<Duration>) -> Result<(ExitOutcome, bool)> {
    let mut killed = false;
    let started = Instant::now();

    loop {
        let flags = if deadline.is_some() && !killed {
            Some(WaitPidFlag::WNOHANG)
        } else {
            None
        };

        match waitpid(pid, flags) {
            Ok(WaitStatus::StillAlive) => {
                let limit = deadline.unwrap_or(Duration::MAX);
                if started.elapsed() >= limit {
                    log::warn!("Wall-clock deadline of {:?} expired, killing {}", limit, pid);
                    match kill(pid, Signal::SIGKILL) {
                        Ok(()) | Err(Errno::ESRCH) => {}
                        Err(e) => {
                            return Err(SandboxError::Process(format!(
                                "Failed to kill {} after deadline: {}",
                                pid, e
                            )))
                        }
                    }
                    killed = true;
                } else {
                    thread::sleep(POLL_INTERVAL);
                }
            }
            Ok(status) => {
                if let Some(outcome) = classify(status) {
                    return Ok((outcome, deadline_expired(killed, outcome)));
                }
                log::debug!("Ignoring non-terminal wait status {:?}", status);
            }
            Err(Errno::EINTR) => continue,
            Err(e) => {
                return Err(SandboxError::Process(format!("waitpid({}) failed: {}", pid, e)));
            }
        }
    }
}

/// Parent side of a run
pub struct Supervisor {
    console: Console,
    deadline: Option<Duration>,
}

impl Supervisor {
    pub fn new(console: Console, deadline: Option<Duration>) -> Self {
        Self { console, deadline }
    }

    /// Wait for the child, release its stack, and report the outcome.
    ///
    /// A setup failure reported by the child turns into `SandboxError::ChildSetup`.
    pub fn supervise(&self, mut child: IsolatedChild) -> Result<SupervisionReport> {
        let started_at = chrono::Utc::now();
        let started = Instant::now();
        let pid = child.pid();

        let (outcome, timed_out) = wait_for(pid, self.deadline)?;
        child.mark_reaped();

        let setup_failure = match child.take_setup_channel() {
            Some(channel) => read_setup_failure(channel)?,
            None => None,
        };

        // The stack goes only now that the child is gone.
        drop(child);

        if let Some(failure) = setup_failure {
            return Err(failure.into());
        }

        match outcome {
            ExitOutcome::Exited(code) => self
                .console
                .applied(&format!("Child process exited with status: {}", code)),
            ExitOutcome::Signaled(signal) => self
                .console
                .failure(&format!("Child process was killed by signal: {}", signal)),
        }
        if timed_out {
            self.console
                .failure("Wall-clock deadline exceeded; the child was killed");
        }

        Ok(SupervisionReport {
            pid: pid.as_raw(),
            outcome,
            timed_out,
            started_at,
            finished_at: chrono::Utc::now(),
            wall_time_ms: started.elapsed().as_millis() as u64,
        })
    }
}
