/// sandbox: run one shell command in fresh PID and mount namespaces
///
/// # Usage
/// ```bash
/// sandbox <command> <max_memory_mb> <max_cpu_seconds> <cpu_freq_mhz>
/// sandbox 'python3 main.py' 256 5 -1
/// ```
///
/// Exit status is 0 whenever the child was supervised to completion (its own status is
/// printed), and 1 when the sandbox could not be set up.
use anyhow::Result;
use choco_sandbox::cli::Cli;
use choco_sandbox::isolate::Isolate;
use choco_sandbox::namespace::NamespaceIsolation;
use clap::Parser;
use nix::unistd::Uid;
use std::process;

fn main() -> Result<()> {
    env_logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };

    let config = cli.to_config();
    let request = match cli.to_request() {
        Ok(request) => request,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    perform_preflight_checks();

    let isolate = Isolate::new(request, config);
    match isolate.run() {
        Ok(report) => {
            log::info!("Run finished: {} in {} ms", report.outcome, report.wall_time_ms);
            if isolate.config().json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            Ok(())
        }
        Err(e) => {
            log::error!("Sandbox run aborted: {}", e);
            isolate.console().failure(&format!("Error: {}", e));
            process::exit(1);
        }
    }
}

/// Warn early about missing privileges or kernel support; the launch itself decides
fn perform_preflight_checks() {
    if !Uid::effective().is_root() {
        log::warn!("not running as root; creating PID and mount namespaces will likely fail");
    }

    if !NamespaceIsolation::is_supported() {
        log::warn!("/proc/self/ns is not readable; namespace isolation may be unavailable");
        return;
    }

    match NamespaceIsolation::default().get_namespace_info() {
        Ok(info) => log::debug!("Host {}", info),
        Err(e) => log::debug!("{}", e),
    }
}
