/// Core types and structures for the sandbox harness
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Size of the stack handed to the cloned child (1 MiB)
pub const STACK_SIZE: usize = 1024 * 1024;

/// Default location of the per-core cpufreq control directories
pub const DEFAULT_CPUFREQ_ROOT: &str = "/sys/devices/system/cpu";

const BYTES_PER_MB: u64 = 1024 * 1024;
const KHZ_PER_MHZ: u64 = 1000;

/// Address-space ceiling in bytes for a limit given in megabytes
pub fn megabytes_to_bytes(mb: u64) -> Result<u64> {
    mb.checked_mul(BYTES_PER_MB).ok_or_else(|| {
        SandboxError::Config(format!("memory limit of {}MB does not fit in bytes", mb))
    })
}

/// cpufreq control value in kHz for a frequency given in MHz
pub fn megahertz_to_kilohertz(mhz: u64) -> Result<u64> {
    mhz.checked_mul(KHZ_PER_MHZ).ok_or_else(|| {
        SandboxError::Config(format!("CPU frequency of {} MHz is out of range", mhz))
    })
}

/// A numeric ceiling that may be switched off with the "unlimited" sentinel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Limit {
    Unlimited,
    Value(u64),
}

impl Limit {
    pub fn value(self) -> Option<u64> {
        match self {
            Limit::Unlimited => None,
            Limit::Value(v) => Some(v),
        }
    }

    pub fn is_unlimited(self) -> bool {
        matches!(self, Limit::Unlimited)
    }

    /// Positional form understood by `FromStr`; the sentinel renders as `-1`
    pub fn to_arg(self) -> String {
        match self {
            Limit::Unlimited => "-1".to_string(),
            Limit::Value(v) => v.to_string(),
        }
    }
}

impl FromStr for Limit {
    type Err = SandboxError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("unlimited") || trimmed.eq_ignore_ascii_case("none") {
            return Ok(Limit::Unlimited);
        }

        let parsed: i64 = trimmed
            .parse()
            .map_err(|_| SandboxError::Config(format!("'{}' is not an integer or -1", s)))?;

        if parsed < 0 {
            Ok(Limit::Unlimited)
        } else {
            Ok(Limit::Value(parsed as u64))
        }
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::Unlimited => write!(f, "unlimited"),
            Limit::Value(v) => write!(f, "{}", v),
        }
    }
}

/// The command to run and the ceilings to run it under
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxRequest {
    /// Shell command line, handed to `/bin/sh -c`
    pub command: String,
    /// Address-space ceiling in megabytes
    pub max_memory_mb: Limit,
    /// Cumulative CPU-time ceiling in seconds
    pub max_cpu_seconds: Limit,
    /// Frequency to pin the CPU core to, in MHz
    pub cpu_freq_mhz: Limit,
}

impl SandboxRequest {
    pub fn new(
        command: impl Into<String>,
        max_memory_mb: Limit,
        max_cpu_seconds: Limit,
        cpu_freq_mhz: Limit,
    ) -> Result<Self> {
        let command = command.into();
        if command.trim().is_empty() {
            return Err(SandboxError::Config("Empty command provided".to_string()));
        }
        if let Some(mb) = max_memory_mb.value() {
            megabytes_to_bytes(mb)?;
        }
        if let Some(mhz) = cpu_freq_mhz.value() {
            megahertz_to_kilohertz(mhz)?;
        }

        Ok(Self {
            command,
            max_memory_mb,
            max_cpu_seconds,
            cpu_freq_mhz,
        })
    }

    /// Render as the four positional strings the child entry point receives
    pub fn to_positional(&self) -> Vec<String> {
        vec![
            self.command.clone(),
            self.max_memory_mb.to_arg(),
            self.max_cpu_seconds.to_arg(),
            self.cpu_freq_mhz.to_arg(),
        ]
    }

    /// Parse `<command> <memory_MB> <cpu_time_sec> <cpu_freq_MHz>`
    pub fn from_positional<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        if args.len() != 4 {
            return Err(SandboxError::Config(format!(
                "expected 4 positional arguments, got {}",
                args.len()
            )));
        }

        Self::new(
            args[0].as_ref(),
            args[1].as_ref().parse()?,
            args[2].as_ref().parse()?,
            args[3].as_ref().parse()?,
        )
    }
}

/// Which core the frequency governor acts on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyScope {
    /// Core 0, with the child free to run anywhere
    Host,
    /// The child is pinned to this core and only its controls are written
    PinnedCore(usize),
}

impl FrequencyScope {
    pub fn core(self) -> usize {
        match self {
            FrequencyScope::Host => 0,
            FrequencyScope::PinnedCore(core) => core,
        }
    }
}

impl Default for FrequencyScope {
    fn default() -> Self {
        FrequencyScope::Host
    }
}

/// Harness settings that are not part of the request itself
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Fail the run when an rlimit cannot be installed (otherwise warn)
    pub strict_limits: bool,
    /// Core targeted by frequency throttling
    pub frequency_scope: FrequencyScope,
    /// Directory holding `cpuN/cpufreq/`
    pub cpufreq_root: PathBuf,
    /// Kill the child once this much wall-clock time has passed
    pub wall_timeout: Option<Duration>,
    /// Put previous min/max frequencies back after the run
    pub restore_frequency: bool,
    /// Colourise progress lines
    pub color: bool,
    /// Emit the final report as JSON on stdout, progress on stderr
    pub json: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            strict_limits: true,
            frequency_scope: FrequencyScope::Host,
            cpufreq_root: PathBuf::from(DEFAULT_CPUFREQ_ROOT),
            wall_timeout: None,
            restore_frequency: true,
            color: false,
            json: false,
        }
    }
}

/// How the isolated child terminated
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitOutcome {
    /// Ran to completion with this status
    Exited(i32),
    /// Terminated by this signal number
    Signaled(i32),
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Exited(code) => write!(f, "exited with status {}", code),
            ExitOutcome::Signaled(sig) => write!(f, "killed by signal {}", sig),
        }
    }
}

/// Everything the supervisor learned about one run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SupervisionReport {
    /// Host PID of the isolated child
    pub pid: i32,
    pub outcome: ExitOutcome,
    /// The wall-clock deadline expired and the child was killed
    pub timed_out: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub wall_time_ms: u64,
}

/// Custom error types for the sandbox
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Resource limit error: {0}")]
    ResourceLimit(String),

    #[error("CPU frequency error: {0}")]
    Frequency(String),

    #[error("Stack allocation failed: {0}")]
    StackAllocation(String),

    #[error("Namespace error: {0}")]
    Namespace(String),

    #[error("Mount error: {0}")]
    Mount(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Child setup failed during {stage}: {message}")]
    ChildSetup { stage: String, message: String },
}

/// Result type alias for sandbox operations
pub type Result<T> = std::result::Result<T, SandboxError>;
