//! Worker launch specification and the host/container path translation
//! required before a path can be handed to a containerized worker
//! (spec.md §4.3).

use crate::error::{ExecutorError, ExecutorResult};
use clm_common::JobType;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct WorkerLaunchSpec {
    pub worker_type: JobType,
    /// Direct mode: path to the worker binary/script. Containerized mode:
    /// image reference.
    pub target: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Address of the loopback protocol sidecar the worker should talk to.
    pub sidecar_addr: String,
}

/// Rejects UNC paths outright (`\\server\share\...` or the `\\?\` extended
/// form) since they cannot be bind-mounted into a Linux container, and
/// rewrites Windows drive-letter paths (`C:\foo\bar`) into the
/// forward-slash, lowercase-drive form `docker run -v` expects on Windows
/// hosts (`/c/foo/bar`). A no-op on POSIX paths.
pub fn to_container_path(host_path: &Path) -> ExecutorResult<String> {
    let raw = host_path.to_string_lossy();

    if raw.starts_with(r"\\") {
        return Err(ExecutorError::UncPathRejected(raw.to_string()));
    }

    if let Some(rest) = raw.strip_prefix(|c: char| c.is_ascii_alphabetic()) {
        if let Some(tail) = rest.strip_prefix(":\\").or_else(|| rest.strip_prefix(":/")) {
            let drive = raw.chars().next().unwrap().to_ascii_lowercase();
            let posix_tail = tail.replace('\\', "/");
            return Ok(format!("/{drive}/{posix_tail}"));
        }
    }

    Ok(raw.replace('\\', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_r::test;

    #[test]
    fn unc_path_is_rejected() {
        let p = Path::new(r"\\fileserver\share\course\01.ipynb");
        assert!(to_container_path(p).is_err());
    }

    #[test]
    fn extended_unc_path_is_rejected() {
        let p = Path::new(r"\\?\C:\course\01.ipynb");
        assert!(to_container_path(p).is_err());
    }

    #[test]
    fn drive_letter_path_is_rewritten_posix_style() {
        let p = Path::new(r"C:\course\01.ipynb");
        assert_eq!(to_container_path(p).unwrap(), "/c/course/01.ipynb");
    }

    #[test]
    fn posix_path_passes_through_unchanged() {
        let p = Path::new("/home/user/course/01.ipynb");
        assert_eq!(to_container_path(p).unwrap(), "/home/user/course/01.ipynb");
    }
}
