//! Host ↔ container bind mounts.
//!
//! [`VolumeBindingResolver`] validates what the caller asked for and turns it
//! into the final mount list. [`MountTable`] answers "which mount owns this
//! container path, and may it be written" for file operations.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use cellbox_core::config::BindingSettings;

use crate::error::{Result, SandboxError};

/// Container paths no binding (or work dir) may cover.
pub const RESERVED_CONTAINER_PATHS: &[&str] = &["/", "/proc", "/sys"];

/// A host path exposed inside the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeBinding {
    pub host_path: PathBuf,
    pub container_path: PathBuf,
    pub read_only: bool,
}

impl VolumeBinding {
    pub fn new(host_path: impl Into<PathBuf>, container_path: impl Into<PathBuf>) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
            read_only: false,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

impl From<&BindingSettings> for VolumeBinding {
    fn from(settings: &BindingSettings) -> Self {
        Self {
            host_path: PathBuf::from(&settings.host_path),
            container_path: PathBuf::from(&settings.container_path),
            read_only: settings.read_only,
        }
    }
}

/// `/`, `/proc`, `/sys` and anything beneath `/proc` or `/sys`.
pub fn is_reserved_container_path(path: &Path) -> bool {
    RESERVED_CONTAINER_PATHS.iter().any(|reserved| {
        let reserved = Path::new(reserved);
        if reserved == Path::new("/") {
            path == reserved
        } else {
            path.starts_with(reserved)
        }
    })
}

/// Computes the final bind-mount list from a caller's request.
pub struct VolumeBindingResolver;

impl VolumeBindingResolver {
    /// Validate `requested` and return the mounts to apply, in caller order.
    ///
    /// Host paths must exist and are canonicalized. Container paths must be
    /// absolute, free of `..`, outside the reserved set and unique. Touches
    /// the host filesystem read-only (metadata and symlink resolution), so
    /// async callers should run it on a blocking thread.
    pub fn resolve(requested: &[VolumeBinding], work_dir: &Path) -> Result<Vec<VolumeBinding>> {
        if !work_dir.is_absolute() {
            return Err(SandboxError::invalid_binding(format!(
                "work dir {} is not absolute",
                work_dir.display()
            )));
        }

        let mut seen = HashSet::new();
        let mut resolved = Vec::with_capacity(requested.len());

        for binding in requested {
            let container_path = normalize_container_path(&binding.container_path)?;
            if is_reserved_container_path(&container_path) {
                return Err(SandboxError::invalid_binding(format!(
                    "container path {} collides with a reserved system path",
                    container_path.display()
                )));
            }
            if !seen.insert(container_path.clone()) {
                return Err(SandboxError::invalid_binding(format!(
                    "duplicate container path {}",
                    container_path.display()
                )));
            }

            if !binding.host_path.is_absolute() {
                return Err(SandboxError::invalid_binding(format!(
                    "host path {} is not absolute",
                    binding.host_path.display()
                )));
            }
            let host_path = std::fs::canonicalize(&binding.host_path).map_err(|e| {
                SandboxError::invalid_binding(format!(
                    "host path {} does not exist: {}",
                    binding.host_path.display(),
                    e
                ))
            })?;

            resolved.push(VolumeBinding {
                host_path,
                container_path,
                read_only: binding.read_only,
            });
        }

        Ok(resolved)
    }
}

fn normalize_container_path(path: &Path) -> Result<PathBuf> {
    if !path.is_absolute() {
        return Err(SandboxError::invalid_binding(format!(
            "container path {} is not absolute",
            path.display()
        )));
    }
    let mut normalized = PathBuf::from("/");
    for component in path.components() {
        match component {
            Component::Normal(c) => normalized.push(c),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) => {
                return Err(SandboxError::invalid_binding(format!(
                    "container path {} must not contain '..'",
                    path.display()
                )));
            }
        }
    }
    Ok(normalized)
}

/// Where a container path lands, for file-operation checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountAccess {
    Writable,
    ReadOnly,
}

/// The set of mounts a sandbox's file operations may touch: the work dir plus
/// every binding. The deepest mount containing a path decides its access.
#[derive(Debug, Clone)]
pub struct MountTable {
    mounts: Vec<(PathBuf, MountAccess)>,
}

impl MountTable {
    pub fn new(work_dir: &Path, bindings: &[VolumeBinding]) -> Self {
        let mut mounts: Vec<(PathBuf, MountAccess)> = bindings
            .iter()
            .map(|b| {
                let access = if b.read_only {
                    MountAccess::ReadOnly
                } else {
                    MountAccess::Writable
                };
                (b.container_path.clone(), access)
            })
            .collect();

        if !mounts.iter().any(|(path, _)| path == work_dir) {
            mounts.push((work_dir.to_path_buf(), MountAccess::Writable));
        }

        // Deepest first so lookup can stop at the first match.
        mounts.sort_by_key(|(path, _)| std::cmp::Reverse(path.components().count()));
        Self { mounts }
    }

    /// Access of the deepest mount containing `path`, if any.
    pub fn access(&self, path: &Path) -> Option<MountAccess> {
        self.mounts
            .iter()
            .find(|(root, _)| path.starts_with(root))
            .map(|(_, access)| *access)
    }

    /// Whether `path` lies inside a writable mount.
    pub fn is_writable(&self, path: &Path) -> bool {
        self.access(path) == Some(MountAccess::Writable)
    }
}

/// Whether some binding mounts exactly `path`.
pub fn is_bound(bindings: &[VolumeBinding], path: &Path) -> bool {
    bindings.iter().any(|b| b.container_path == path)
}
