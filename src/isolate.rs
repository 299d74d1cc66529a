/// Main sandbox interface: one request, one isolated run
use crate::cpufreq::{CpuFrequencyGovernor, FrequencyBounds};
use crate::executor::ChildContext;
use crate::launcher::IsolationLauncher;
use crate::namespace::NamespaceIsolation;
use crate::output::Console;
use crate::supervisor::Supervisor;
use crate::types::{Result, SandboxConfig, SandboxRequest, SupervisionReport};

/// Runs a [`SandboxRequest`] under a [`SandboxConfig`]
pub struct Isolate {
    request: SandboxRequest,
    config: SandboxConfig,
    namespaces: NamespaceIsolation,
    console: Console,
}

impl Isolate {
    pub fn new(request: SandboxRequest, config: SandboxConfig) -> Self {
        let console = Console::new(config.color, config.json);
        Self {
            request,
            config,
            namespaces: NamespaceIsolation::default(),
            console,
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn console(&self) -> Console {
        self.console
    }

    fn governor(&self) -> CpuFrequencyGovernor {
        CpuFrequencyGovernor::new(self.config.cpufreq_root.clone(), self.config.frequency_scope)
    }

    /// Launch the child, wait for it, and put any throttled frequency back
    pub fn run(&self) -> Result<SupervisionReport> {
        let governor = self.governor();
        let previous = self.capture_frequency(&governor);

        let ctx = ChildContext {
            strict_limits: self.config.strict_limits,
            governor: governor.clone(),
            namespaces: self.namespaces,
            console: self.console,
        };

        let launcher = IsolationLauncher::new(self.namespaces, self.console);
        let supervisor = Supervisor::new(self.console, self.config.wall_timeout);
        let result = launcher
            .launch(&self.request, ctx)
            .and_then(|child| supervisor.supervise(child));

        if let Some(bounds) = previous {
            if let Err(e) = governor.restore(bounds) {
                log::warn!("Could not restore CPU frequency bounds: {}", e);
            }
        }

        result
    }

    fn capture_frequency(&self, governor: &CpuFrequencyGovernor) -> Option<FrequencyBounds> {
        if self.request.cpu_freq_mhz.is_unlimited() || !self.config.restore_frequency {
            return None;
        }

        match governor.snapshot() {
            Ok(bounds) => {
                log::debug!("Captured frequency bounds {:?}", bounds);
                Some(bounds)
            }
            Err(e) => {
                // The child will hit the same problem and abort the run.
                log::debug!("No frequency snapshot: {}", e);
                None
            }
        }
    }
}
