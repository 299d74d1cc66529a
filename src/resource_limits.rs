/// Resource limit management using rlimit system calls
use crate::output::Console;
use crate::types::{megabytes_to_bytes, Limit, Result, SandboxError};
use nix::sys::resource::{getrlimit, setrlimit, Resource};

/// Limits that were actually installed by [`ResourceLimitController::apply`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedLimits {
    /// Address-space ceiling in bytes
    pub memory_bytes: Option<u64>,
    /// CPU-time ceiling in seconds
    pub cpu_seconds: Option<u64>,
}

impl AppliedLimits {
    pub fn is_empty(&self) -> bool {
        self.memory_bytes.is_none() && self.cpu_seconds.is_none()
    }
}

/// Resource limit controller for the isolated child
pub struct ResourceLimitController {
    strict_mode: bool,
    console: Console,
}

impl ResourceLimitController {
    /// Create a new resource limit controller
    pub fn new(strict_mode: bool, console: Console) -> Self {
        Self {
            strict_mode,
            console,
        }
    }

    /// Install the memory and CPU-time ceilings on the calling process.
    ///
    /// Each ceiling is skipped when `Limit::Unlimited`. Soft and hard limits are set to the
    /// same value so the limited process cannot raise them again.
    pub fn apply(&self, max_memory_mb: Limit, max_cpu_seconds: Limit) -> Result<AppliedLimits> {
        self.apply_with(max_memory_mb, max_cpu_seconds, |resource, value| {
            setrlimit(resource, value, value)
        })
    }

    fn apply_with<F>(
        &self,
        max_memory_mb: Limit,
        max_cpu_seconds: Limit,
        mut set: F,
    ) -> Result<AppliedLimits>
    where
        F: FnMut(Resource, u64) -> nix::Result<()>,
    {
        let mut applied = AppliedLimits::default();

        if let Some(mb) = max_memory_mb.value() {
            let bytes = megabytes_to_bytes(mb)?;
            if self.install(&mut set, Resource::RLIMIT_AS, bytes, "virtual memory")? {
                applied.memory_bytes = Some(bytes);
                log::info!("RLIMIT_AS set to {} bytes", bytes);
                self.console.applied(&format!("Memory limit set to {}MB", mb));
            }
        }

        if let Some(seconds) = max_cpu_seconds.value() {
            if self.install(&mut set, Resource::RLIMIT_CPU, seconds, "CPU time")? {
                applied.cpu_seconds = Some(seconds);
                log::info!("RLIMIT_CPU set to {} seconds", seconds);
                self.console
                    .applied(&format!("CPU time limit set to {} seconds", seconds));
            }
        }

        Ok(applied)
    }

    /// Returns whether the limit is in force; errors only in strict mode
    fn install<F>(&self, set: &mut F, resource: Resource, value: u64, what: &str) -> Result<bool>
    where
        F: FnMut(Resource, u64) -> nix::Result<()>,
    {
        match set(resource, value) {
            Ok(()) => Ok(true),
            Err(e) => {
                let error_msg = format!("Failed to set {} limit: {}", what, e);
                if self.strict_mode {
                    Err(SandboxError::ResourceLimit(error_msg))
                } else {
                    log::warn!("{} (continuing WITHOUT this limit)", error_msg);
                    self.console
                        .failure(&format!("Warning: {}; the limit is NOT active", error_msg));
                    Ok(false)
                }
            }
        }
    }

    /// Get current address-space and CPU-time limits for monitoring
    pub fn current_limits(&self) -> Result<ResourceLimits> {
        let vmem = getrlimit(Resource::RLIMIT_AS).map_err(|e| {
            SandboxError::ResourceLimit(format!("Failed to get virtual memory limit: {}", e))
        })?;

        let cpu_time = getrlimit(Resource::RLIMIT_CPU).map_err(|e| {
            SandboxError::ResourceLimit(format!("Failed to get CPU time limit: {}", e))
        })?;

        Ok(ResourceLimits {
            vmem_soft: finite(vmem.0),
            vmem_hard: finite(vmem.1),
            cpu_time_soft: finite(cpu_time.0),
            cpu_time_hard: finite(cpu_time.1),
        })
    }
}

/// Current resource limits; `None` means infinity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLimits {
    pub vmem_soft: Option<u64>,
    pub vmem_hard: Option<u64>,
    pub cpu_time_soft: Option<u64>,
    pub cpu_time_hard: Option<u64>,
}

fn finite(value: u64) -> Option<u64> {
    if value == libc::RLIM_INFINITY as u64 {
        None
    } else {
        Some(value)
    }
}
