/// CPU frequency throttling through the cpufreq sysfs interface
///
/// Writing `scaling_min_freq`/`scaling_max_freq` changes hardware state for the whole
/// host, not just the sandboxed child. With [`FrequencyScope::PinnedCore`] the child is
/// confined to the throttled core, but the core itself stays throttled for everyone.
use crate::output::Console;
use crate::types::{megahertz_to_kilohertz, FrequencyScope, Limit, Result, SandboxError};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Min/max bounds of one core, in kHz
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrequencyBounds {
    pub min_khz: u64,
    pub max_khz: u64,
}

#[derive(Debug, Clone)]
pub struct CpuFrequencyGovernor {
    root: PathBuf,
    scope: FrequencyScope,
}

impl CpuFrequencyGovernor {
    pub fn new(root: impl Into<PathBuf>, scope: FrequencyScope) -> Self {
        Self {
            root: root.into(),
            scope,
        }
    }

    pub fn scope(&self) -> FrequencyScope {
        self.scope
    }

    fn control_dir(&self) -> PathBuf {
        self.root
            .join(format!("cpu{}", self.scope.core()))
            .join("cpufreq")
    }

    pub fn min_path(&self) -> PathBuf {
        self.control_dir().join("scaling_min_freq")
    }

    pub fn max_path(&self) -> PathBuf {
        self.control_dir().join("scaling_max_freq")
    }

    /// Pin the scoped core to `cpu_freq_mhz`.
    ///
    /// Returns the value written in kHz, or `None` when unlimited (no file is touched).
    /// Both control files are opened before either is written; a missing or read-only
    /// control surface is an error. There is no rollback if the second write fails.
    pub fn apply(&self, cpu_freq_mhz: Limit, console: &Console) -> Result<Option<u64>> {
        let mhz = match cpu_freq_mhz.value() {
            Some(mhz) => mhz,
            None => return Ok(None),
        };

        let khz = megahertz_to_kilohertz(mhz)?;

        log::warn!(
            "Throttling cpu{} to {} kHz; this affects the whole host until restored",
            self.scope.core(),
            khz
        );

        // Raising above the current max must write max first, otherwise the kernel
        // rejects min > max.
        let raise = match read_khz(&self.max_path()) {
            Ok(current_max) => khz > current_max,
            Err(_) => false,
        };

        let mut min_file = open_control(&self.min_path())?;
        let mut max_file = open_control(&self.max_path())?;

        if raise {
            write_khz(&mut max_file, &self.max_path(), khz)?;
            write_khz(&mut min_file, &self.min_path(), khz)?;
        } else {
            write_khz(&mut min_file, &self.min_path(), khz)?;
            write_khz(&mut max_file, &self.max_path(), khz)?;
        }

        console.frequency(&format!("CPU frequency set to {} MHz", mhz));
        Ok(Some(khz))
    }

    /// Read the current bounds of the scoped core
    pub fn snapshot(&self) -> Result<FrequencyBounds> {
        Ok(FrequencyBounds {
            min_khz: read_khz(&self.min_path())?,
            max_khz: read_khz(&self.max_path())?,
        })
    }

    /// Write previously captured bounds back
    pub fn restore(&self, bounds: FrequencyBounds) -> Result<()> {
        let current_max = read_khz(&self.max_path()).unwrap_or(u64::MAX);
        let mut min_file = open_control(&self.min_path())?;
        let mut max_file = open_control(&self.max_path())?;

        if bounds.min_khz > current_max {
            write_khz(&mut max_file, &self.max_path(), bounds.max_khz)?;
            write_khz(&mut min_file, &self.min_path(), bounds.min_khz)?;
        } else {
            write_khz(&mut min_file, &self.min_path(), bounds.min_khz)?;
            write_khz(&mut max_file, &self.max_path(), bounds.max_khz)?;
        }

        log::info!(
            "Restored cpu{} frequency bounds to {}..{} kHz",
            self.scope.core(),
            bounds.min_khz,
            bounds.max_khz
        );
        Ok(())
    }
}

fn open_control(path: &Path) -> Result<File> {
    log::debug!("Opening frequency control {}", path.display());
    OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|e| SandboxError::Frequency(format!("cannot open {}: {}", path.display(), e)))
}

fn write_khz(file: &mut File, path: &Path, khz: u64) -> Result<()> {
    writeln!(file, "{}", khz)
        .and_then(|_| file.flush())
        .map_err(|e| SandboxError::Frequency(format!("cannot write {}: {}", path.display(), e)))
}

fn read_khz(path: &Path) -> Result<u64> {
    let raw = fs::read_to_string(path)
        .map_err(|e| SandboxError::Frequency(format!("cannot read {}: {}", path.display(), e)))?;
    let trimmed = raw.trim();
    trimmed.parse().map_err(|_| {
        SandboxError::Frequency(format!(
            "unexpected contents in {}: {:?}",
            path.display(),
            trimmed
        ))
    })
}
