/// Creation of the isolated child with `clone(2)`
use crate::executor::{self, ChildContext, SetupReporter};
use crate::namespace::NamespaceIsolation;
use crate::output::Console;
use crate::types::{Result, SandboxError, SandboxRequest, STACK_SIZE};
use nix::sched::{clone, CloneCb};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::waitpid;
use nix::unistd::Pid;
use std::os::unix::net::UnixStream;

/// Memory the cloned child runs its entry point on
pub struct ExecutionStack {
    memory: Box<[u8]>,
}

impl ExecutionStack {
    /// Allocate `size` zeroed bytes, failing instead of aborting when memory is short
    pub fn allocate(size: usize) -> Result<Self> {
        let mut memory = Vec::new();
        memory
            .try_reserve_exact(size)
            .map_err(|e| SandboxError::StackAllocation(format!("{} bytes: {}", size, e)))?;
        memory.resize(size, 0u8);

        Ok(Self {
            memory: memory.into_boxed_slice(),
        })
    }

    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.memory
    }
}

/// A running child together with the stack it was cloned onto.
///
/// The two are released together: dropping a handle whose child has not been reaped
/// kills and reaps the child first, and only then frees the stack.
pub struct IsolatedChild {
    pid: Pid,
    setup_channel: Option<UnixStream>,
    reaped: bool,
    // Dropped after `Drop::drop` has run.
    stack: ExecutionStack,
}

impl IsolatedChild {
    /// Host-side PID of the child
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Record that the supervisor has collected the exit status
    pub fn mark_reaped(&mut self) {
        self.reaped = true;
    }

    pub fn take_setup_channel(&mut self) -> Option<UnixStream> {
        self.setup_channel.take()
    }
}

impl Drop for IsolatedChild {
    fn drop(&mut self) {
        if !self.reaped {
            log::warn!("Isolated child {} dropped before it was reaped; killing it", self.pid);
            let _ = kill(self.pid, Signal::SIGKILL);
            loop {
                match waitpid(self.pid, None) {
                    Err(nix::errno::Errno::EINTR) => continue,
                    _ => break,
                }
            }
        }

        log::debug!("Releasing {} byte stack of child {}", self.stack.len(), self.pid);
    }
}

/// Allocates the stack and clones the child into new namespaces
pub struct IsolationLauncher {
    namespaces: NamespaceIsolation,
    console: Console,
}

impl IsolationLauncher {
    pub fn new(namespaces: NamespaceIsolation, console: Console) -> Self {
        Self {
            namespaces,
            console,
        }
    }

    /// Start `request` in a new PID and mount namespace.
    ///
    /// The request crosses into the child as its four positional strings.
    pub fn launch(&self, request: &SandboxRequest, ctx: ChildContext) -> Result<IsolatedChild> {
        self.console.stage("Allocating stack for child process...");
        let mut stack = ExecutionStack::allocate(STACK_SIZE).map_err(|e| {
            self.console.failure("Memory allocation failed");
            e
        })?;

        let (parent_end, child_end) = UnixStream::pair()?;
        let args = request.to_positional();
        let flags = self.namespaces.clone_flags();

        self.console.stage("Cloning process...");
        log::debug!("clone flags: {:?}, stack: {} bytes", flags, stack.len());

        let callback: CloneCb<'_> = Box::new(|| {
            let reporter = SetupReporter::new(&child_end);
            executor::run_isolated(&args, &ctx, &reporter)
        });

        // SAFETY: the child gets its own copy of the address space (no CLONE_VM) and
        // `stack` is moved into the returned handle, which outlives the child.
        let pid = unsafe { clone(callback, stack.as_mut_slice(), flags, Some(libc::SIGCHLD)) }
            .map_err(|e| {
                self.console.failure("Clone failed");
                SandboxError::Namespace(format!("clone with {:?} failed: {}", flags, e))
            })?;

        // Only the child may hold the write side, so EOF means it exited or exec'd.
        drop(child_end);
        log::info!("Isolated child started with host pid {}", pid);

        Ok(IsolatedChild {
            pid,
            setup_channel: Some(parent_end),
            reaped: false,
            stack,
        })
    }
}
