//! choco-sandbox: a bounded-resource command runner
//! Runs one shell command in fresh PID and mount namespaces under rlimits and an optional
//! CPU clock cap

pub mod cli;
pub mod cpufreq;
pub mod executor;
pub mod isolate;
pub mod launcher;
pub mod namespace;
pub mod output;
pub mod resource_limits;
pub mod supervisor;
pub mod types;
