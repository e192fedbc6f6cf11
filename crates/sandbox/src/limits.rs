//! Resource limits for a single sandbox instance.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use cellbox_core::config::SandboxSettings;

use crate::bindings::is_reserved_container_path;
use crate::error::{Result, SandboxError};

/// CFS scheduling period handed to the engine, in microseconds.
pub const CPU_PERIOD_MICROS: i64 = 100_000;

/// Smallest quota the kernel accepts for a CFS period.
pub const MIN_CPU_QUOTA_MICROS: i64 = 1_000;

/// Docker refuses containers with less memory than this.
pub const MIN_MEMORY_BYTES: u64 = 6 * 1024 * 1024;

const DEFAULT_PIDS_LIMIT: i64 = 256;

/// Immutable description of what one sandbox may consume.
///
/// A `Sandbox` holds its limits behind an `Arc` and never mutates them;
/// different limits mean a different sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Pre-built image reference.
    pub image: String,
    pub memory_limit_bytes: u64,
    /// Fraction of one CPU core, in (0, 1].
    pub cpu_share: f64,
    /// `false` attaches the container to the no-route `none` network.
    pub network_enabled: bool,
    /// Default execution directory inside the container.
    pub work_dir: PathBuf,
    pub pids_limit: i64,
    /// Pull the image once if the engine does not have it locally.
    pub pull_missing_images: bool,
}

impl ResourceLimits {
    /// Defaults: 512 MiB, one full core, no network, `/workspace`.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            memory_limit_bytes: 512 * 1024 * 1024,
            cpu_share: 1.0,
            network_enabled: false,
            work_dir: PathBuf::from("/workspace"),
            pids_limit: DEFAULT_PIDS_LIMIT,
            pull_missing_images: true,
        }
    }

    pub fn with_memory_limit(mut self, bytes: u64) -> Self {
        self.memory_limit_bytes = bytes;
        self
    }

    pub fn with_cpu_share(mut self, share: f64) -> Self {
        self.cpu_share = share;
        self
    }

    pub fn with_network(mut self, enabled: bool) -> Self {
        self.network_enabled = enabled;
        self
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn with_pids_limit(mut self, limit: i64) -> Self {
        self.pids_limit = limit;
        self
    }

    pub fn with_pull_missing_images(mut self, pull: bool) -> Self {
        self.pull_missing_images = pull;
        self
    }

    /// Check every field against what the engine will accept.
    pub fn validate(&self) -> Result<()> {
        if self.image.trim().is_empty() {
            return Err(SandboxError::invalid_limits("image reference is empty"));
        }
        if self.memory_limit_bytes < MIN_MEMORY_BYTES {
            return Err(SandboxError::invalid_limits(format!(
                "memory limit {} bytes is below the {} byte minimum",
                self.memory_limit_bytes, MIN_MEMORY_BYTES
            )));
        }
        if i64::try_from(self.memory_limit_bytes).is_err() {
            return Err(SandboxError::invalid_limits(format!(
                "memory limit {} bytes is too large",
                self.memory_limit_bytes
            )));
        }
        if !(self.cpu_share > 0.0 && self.cpu_share <= 1.0) {
            return Err(SandboxError::invalid_limits(format!(
                "cpu share {} is outside (0, 1]",
                self.cpu_share
            )));
        }
        if self.pids_limit <= 0 {
            return Err(SandboxError::invalid_limits(format!(
                "pids limit {} must be positive",
                self.pids_limit
            )));
        }
        validate_work_dir(&self.work_dir)
    }

    /// Memory ceiling in the engine's signed representation.
    pub fn memory_bytes_i64(&self) -> i64 {
        i64::try_from(self.memory_limit_bytes).unwrap_or(i64::MAX)
    }

    /// `(quota, period)` pair for the engine's CFS settings.
    pub fn cpu_quota(&self) -> (i64, i64) {
        let quota = (self.cpu_share * CPU_PERIOD_MICROS as f64).round() as i64;
        (quota.max(MIN_CPU_QUOTA_MICROS), CPU_PERIOD_MICROS)
    }

    /// Engine network mode for this sandbox.
    pub fn network_mode(&self) -> &'static str {
        if self.network_enabled {
            "bridge"
        } else {
            "none"
        }
    }
}

fn validate_work_dir(work_dir: &Path) -> Result<()> {
    if !work_dir.is_absolute() {
        return Err(SandboxError::invalid_limits(format!(
            "work dir {} is not absolute",
            work_dir.display()
        )));
    }
    if is_reserved_container_path(work_dir) {
        return Err(SandboxError::invalid_limits(format!(
            "work dir {} is a reserved system path",
            work_dir.display()
        )));
    }
    Ok(())
}

impl TryFrom<&SandboxSettings> for ResourceLimits {
    type Error = SandboxError;

    fn try_from(settings: &SandboxSettings) -> Result<Self> {
        let limits = ResourceLimits::new(settings.image.clone())
            .with_memory_limit(settings.memory_limit_bytes)
            .with_cpu_share(settings.cpu_share)
            .with_network(settings.network_enabled)
            .with_work_dir(&settings.work_dir)
            .with_pids_limit(settings.pids_limit)
            .with_pull_missing_images(settings.pull_missing_images);
        limits.validate()?;
        Ok(limits)
    }
}
