//! On-disk record of persistent worker processes (spec.md §6), so a second
//! `clm` invocation (or a crash-restarted one) can find and reap workers a
//! prior run started with `RunMode::Persistent`. Written atomically via a
//! temp-file-then-rename, matching the teacher's own config-write pattern.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistentWorkerRecord {
    pub worker_id: i64,
    pub job_type: String,
    pub executor_id: String,
    pub pid: Option<u32>,
    pub container_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkersState {
    pub workers: Vec<PersistentWorkerRecord>,
}

pub fn load(path: &Path) -> io::Result<WorkersState> {
    match std::fs::read(path) {
        Ok(bytes) => {
            Ok(serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| WorkersState::default()))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(WorkersState::default()),
        Err(e) => Err(e),
    }
}

/// Writes `state` to `path` via a sibling temp file plus rename, so a reader
/// never observes a half-written file. The temp file is created with
/// owner-only permissions before the rename on unix, since the state can
/// reference container ids and executor paths worth keeping off a shared
/// multi-user host.
pub fn save(path: &Path, state: &WorkersState) -> io::Result<()> {
    let tmp_path = tmp_path_for(path);
    let body = serde_json::to_vec_pretty(state)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    std::fs::write(&tmp_path, body)?;
    restrict_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_r::test;

    #[test]
    fn load_on_missing_file_returns_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = load(&dir.path().join("workers.json")).unwrap();
        assert!(state.workers.is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workers.json");
        let state = WorkersState {
            workers: vec![PersistentWorkerRecord {
                worker_id: 1,
                job_type: "notebook".to_string(),
                executor_id: "exec-1".to_string(),
                pid: Some(4242),
                container_id: None,
            }],
        };
        save(&path, &state).unwrap();
        assert!(!tmp_path_for(&path).exists());

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.workers.len(), 1);
        assert_eq!(loaded.workers[0].worker_id, 1);
        assert_eq!(loaded.workers[0].pid, Some(4242));
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_has_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workers.json");
        save(&path, &WorkersState::default()).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
