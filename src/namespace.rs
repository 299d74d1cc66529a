/// Namespace isolation for the sandboxed child
/// Provides the PID and mount namespace pieces of the isolation
use crate::types::{Result, SandboxError};
use nix::mount::{mount, MsFlags};
use nix::sched::CloneFlags;
use nix::unistd::getpid;
use std::fs;

/// Namespace isolation controller
#[derive(Debug, Clone, Copy)]
pub struct NamespaceIsolation {
    /// Enable PID namespace isolation
    enable_pid_namespace: bool,
    /// Enable mount namespace isolation
    enable_mount_namespace: bool,
}

impl Default for NamespaceIsolation {
    /// Fresh PID and mount namespaces
    fn default() -> Self {
        Self {
            enable_pid_namespace: true,
            enable_mount_namespace: true,
        }
    }
}

impl NamespaceIsolation {
    /// Check if namespace isolation is supported on this system
    pub fn is_supported() -> bool {
        fs::read_dir("/proc/self/ns").is_ok()
    }

    /// Flags for `clone(2)` that create the enabled namespaces
    pub fn clone_flags(&self) -> CloneFlags {
        let mut clone_flags = CloneFlags::empty();

        if self.enable_pid_namespace {
            clone_flags |= CloneFlags::CLONE_NEWPID;
        }
        if self.enable_mount_namespace {
            clone_flags |= CloneFlags::CLONE_NEWNS;
        }

        clone_flags
    }

    /// Called inside the child, after clone and before exec
    pub fn setup_mount_namespace(&self) -> Result<()> {
        if self.enable_mount_namespace {
            make_root_private()?;
        }
        Ok(())
    }

    /// Get namespace information for debugging
    pub fn get_namespace_info(&self) -> Result<NamespaceInfo> {
        Ok(NamespaceInfo {
            pid: getpid().as_raw() as u32,
            pid_namespace: read_namespace_id("pid")?,
            mount_namespace: read_namespace_id("mnt")?,
        })
    }
}

/// Remount `/` recursively private so mount events neither leak to nor arrive from the host
pub fn make_root_private() -> Result<()> {
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_PRIVATE | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|e| SandboxError::Mount(format!("Failed to make root filesystem private: {}", e)))
}

/// Read namespace ID from /proc/self/ns/
fn read_namespace_id(ns_type: &str) -> Result<String> {
    let ns_path = format!("/proc/self/ns/{}", ns_type);
    match fs::read_link(&ns_path) {
        Ok(link) => Ok(link.to_string_lossy().to_string()),
        Err(e) => Err(SandboxError::Namespace(format!(
            "Failed to read namespace {}: {}",
            ns_type, e
        ))),
    }
}

/// Namespace information for debugging and monitoring
#[derive(Debug, Clone)]
pub struct NamespaceInfo {
    /// Process ID
    pub pid: u32,
    /// PID namespace identifier
    pub pid_namespace: String,
    /// Mount namespace identifier
    pub mount_namespace: String,
}

impl std::fmt::Display for NamespaceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "PID: {}, Namespaces: [PID: {}, Mount: {}]",
            self.pid, self.pid_namespace, self.mount_namespace
        )
    }
}
