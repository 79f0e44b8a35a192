use crate::error::ErrorCode;
use crate::sharenote::paths::SharenotePaths;
use anyhow::{Context, Result};
use chrono::Local;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DAEMON_LOCK_FILE: &str = "sharenote-watch.daemon.lock";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonLockPayload {
    pub pid: u32,
    pub build_uuid: String,
    pub start_time: String,
}

impl DaemonLockPayload {
    pub fn current() -> Self {
        Self {
            pid: std::process::id(),
            build_uuid: env!("BUILD_UUID").to_string(),
            start_time: Local::now().to_rfc3339(),
        }
    }
}

/// Held for the lifetime of a `watch --daemon` process; the OS lock drops with the file.
#[derive(Debug)]
pub struct DaemonLock {
    _file: File,
    path: PathBuf,
}

impl DaemonLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DaemonLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

pub fn daemon_lock_path(paths: &SharenotePaths) -> PathBuf {
    paths.logs_dir.join(DAEMON_LOCK_FILE)
}

pub fn acquire(paths: &SharenotePaths) -> Result<DaemonLock> {
    fs::create_dir_all(&paths.logs_dir)
        .with_context(|| format!("failed to create {}", paths.logs_dir.display()))?;
    let path = daemon_lock_path(paths);
    let mut file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    if file.try_lock_exclusive().is_err() {
        anyhow::bail!(
            "{}: another sharenote daemon already holds {}",
            ErrorCode::E006DaemonLocked.as_str(),
            path.display()
        );
    }

    let payload = serde_json::to_string(&DaemonLockPayload::current())?;
    file.set_len(0)?;
    file.write_all(format!("{payload}\n").as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    file.flush()?;

    Ok(DaemonLock { _file: file, path })
}

pub fn read_payload(path: &Path) -> Result<DaemonLockPayload> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(raw.trim())
        .with_context(|| format!("invalid daemon lock payload in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_paths(root: &Path) -> SharenotePaths {
        SharenotePaths {
            home: root.to_path_buf(),
            state_dir: root.join("state"),
            logs_dir: root.join("logs"),
        }
    }

    #[test]
    fn second_acquire_fails_while_first_is_held() {
        let tmp = tempdir().expect("tempdir");
        let paths = test_paths(tmp.path());

        let held = acquire(&paths).expect("first acquire");
        let payload = read_payload(held.path()).expect("payload");
        assert_eq!(payload.pid, std::process::id());
        assert_eq!(payload.build_uuid, env!("BUILD_UUID"));

        let err = acquire(&paths).expect_err("second acquire");
        assert!(err.to_string().contains("E006_DAEMON_LOCKED"));

        let lock_path = held.path().to_path_buf();
        drop(held);
        assert!(!lock_path.exists());
        acquire(&paths).expect("re-acquire after release");
    }

    #[test]
    fn corrupt_payload_is_an_error() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join(DAEMON_LOCK_FILE);
        fs::write(&path, "12345\n").expect("write");
        assert!(read_payload(&path).is_err());
    }
}
