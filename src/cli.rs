/// Command Line Interface for the sandbox
use crate::types::{
    FrequencyScope, Limit, Result, SandboxConfig, SandboxRequest, DEFAULT_CPUFREQ_ROOT,
};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "sandbox", version)]
#[command(
    about = "Run a shell command in fresh PID and mount namespaces under memory, CPU-time \
             and CPU-clock bounds",
    long_about = None,
    after_help = "Use -1 for any limit to leave it unset.\n\
                  Example: sandbox 'python3 main.py' 256 5 -1"
)]
pub struct Cli {
    /// Shell command line to run (interpreted by /bin/sh -c)
    pub command: String,

    /// Address-space limit in MB (-1 for unlimited)
    #[arg(allow_negative_numbers = true, value_parser = parse_limit)]
    pub max_memory_mb: Limit,

    /// CPU time limit in seconds (-1 for unlimited)
    #[arg(allow_negative_numbers = true, value_parser = parse_limit)]
    pub max_cpu_seconds: Limit,

    /// CPU frequency in MHz (-1 to leave the clock alone)
    #[arg(allow_negative_numbers = true, value_parser = parse_limit)]
    pub cpu_freq_mhz: Limit,

    /// Pin the child to this core and throttle only that core (default: cpu0, host-wide)
    #[arg(long, value_name = "CORE")]
    pub pin_core: Option<usize>,

    /// Directory containing cpuN/cpufreq/ controls
    #[arg(long, env = "SANDBOX_CPUFREQ_ROOT", default_value = DEFAULT_CPUFREQ_ROOT)]
    pub cpufreq_root: PathBuf,

    /// Leave the throttled frequency in place after the run
    #[arg(long)]
    pub keep_frequency: bool,

    /// Kill the child after this many wall-clock seconds
    #[arg(long, value_name = "SECS", env = "SANDBOX_WALL_TIMEOUT")]
    pub wall_timeout: Option<u64>,

    /// Warn instead of failing when a resource limit cannot be installed
    #[arg(long)]
    pub lenient_limits: bool,

    /// Print the final report as JSON on stdout (progress goes to stderr)
    #[arg(long)]
    pub json: bool,

    /// Disable coloured output
    #[arg(long, env = "NO_COLOR", value_parser = clap::builder::FalseyValueParser::new())]
    pub no_color: bool,
}

fn parse_limit(s: &str) -> std::result::Result<Limit, String> {
    s.parse::<Limit>().map_err(|e| e.to_string())
}

impl Cli {
    pub fn to_request(&self) -> Result<SandboxRequest> {
        SandboxRequest::new(
            self.command.clone(),
            self.max_memory_mb,
            self.max_cpu_seconds,
            self.cpu_freq_mhz,
        )
    }

    pub fn to_config(&self) -> SandboxConfig {
        let frequency_scope = match self.pin_core {
            Some(core) => FrequencyScope::PinnedCore(core),
            None => FrequencyScope::Host,
        };

        let stream_is_tty = if self.json {
            std::io::stderr().is_terminal()
        } else {
            std::io::stdout().is_terminal()
        };

        SandboxConfig {
            strict_limits: !self.lenient_limits,
            frequency_scope,
            cpufreq_root: self.cpufreq_root.clone(),
            wall_timeout: self.wall_timeout.map(Duration::from_secs),
            restore_frequency: !self.keep_frequency,
            color: !self.no_color && stream_is_tty,
            json: self.json,
        }
    }
}
