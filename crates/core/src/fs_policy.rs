//! Filesystem security policy enforcement.
//!
//! Container paths are resolved lexically on the host side, before any
//! engine call, so `../` sequences can never be used to leave the set of
//! mounts a sandbox is allowed to touch.

use crate::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Resolves `input_path` inside a container.
///
/// Relative paths are joined onto `work_dir`; absolute paths are taken as-is.
/// `.` and `..` components are folded away. A `..` that would climb above
/// `/` is rejected, as are NUL bytes.
pub fn resolve_container_path(work_dir: &Path, input_path: &str) -> Result<PathBuf> {
    if input_path.contains('\0') {
        return Err(Error::SecurityViolation(format!(
            "NUL byte in sandbox path: {:?}",
            input_path
        )));
    }
    if !work_dir.is_absolute() {
        return Err(Error::invalid_request(format!(
            "Working directory must be absolute: {}",
            work_dir.display()
        )));
    }

    let input = Path::new(input_path);
    let joined = if input.is_absolute() {
        input.to_path_buf()
    } else {
        work_dir.join(input)
    };

    let mut normalized = PathBuf::from("/");
    for component in joined.components() {
        match component {
            Component::Normal(c) => normalized.push(c),
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(Error::SecurityViolation(format!(
                        "Path traversal detected in path: {}",
                        input_path
                    )));
                }
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }

    Ok(normalized)
}
