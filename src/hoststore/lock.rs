//! Per-host cooperative lock: every mutation of a host's on-disk store
//! (agent records, certified data, env files) is serialized first across
//! this process via a `tokio::sync::Mutex` keyed by host directory, then
//! across processes via an advisory `flock` on a sentinel `.lock` file
//! (mirrors the per-path lock pattern in `git::worktree`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs4::tokio::AsyncFileExt;
use tokio::fs::{File, OpenOptions};
use tokio::sync::Mutex;

use crate::errors::MngError;

lazy_static::lazy_static! {
    static ref IN_PROCESS_LOCKS: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>> =
        Mutex::new(HashMap::new());
}

async fn in_process_lock(host_dir: &Path) -> Arc<Mutex<()>> {
    let mut locks = IN_PROCESS_LOCKS.lock().await;
    locks
        .entry(host_dir.to_path_buf())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

/// A held lock on a host directory. Dropping it releases both the
/// in-process mutex guard and the cross-process advisory flock.
pub struct HostLock {
    _in_process: tokio::sync::OwnedMutexGuard<()>,
    _file: File,
}

/// Acquire the lock for `host_dir`, creating `host_dir/.lock` if needed.
/// Blocks (cooperatively, not by spinning) until both the in-process and
/// cross-process locks are available.
pub async fn lock_host(host_dir: &Path) -> Result<HostLock, MngError> {
    tokio::fs::create_dir_all(host_dir)
        .await
        .map_err(|e| MngError::Other(anyhow::anyhow!("create_dir_all {host_dir:?}: {e}")))?;

    let mutex = in_process_lock(host_dir).await;
    let guard = mutex.lock_owned().await;

    let lock_path = host_dir.join(".lock");
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .open(&lock_path)
        .await
        .map_err(|e| MngError::Other(anyhow::anyhow!("open {lock_path:?}: {e}")))?;

    file.lock_exclusive()
        .await
        .map_err(|_| MngError::LockNotHeld)?;

    Ok(HostLock {
        _in_process: guard,
        _file: file,
    })
}

/// Try to acquire the lock without waiting; returns `Ok(None)` if another
/// holder (in this process or another) currently owns it.
pub async fn try_lock_host(host_dir: &Path) -> Result<Option<HostLock>, MngError> {
    tokio::fs::create_dir_all(host_dir)
        .await
        .map_err(|e| MngError::Other(anyhow::anyhow!("create_dir_all {host_dir:?}: {e}")))?;

    let mutex = in_process_lock(host_dir).await;
    let Ok(guard) = mutex.try_lock_owned() else {
        return Ok(None);
    };

    let lock_path = host_dir.join(".lock");
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .open(&lock_path)
        .await
        .map_err(|e| MngError::Other(anyhow::anyhow!("open {lock_path:?}: {e}")))?;

    match file.try_lock_exclusive().await {
        Ok(()) => Ok(Some(HostLock {
            _in_process: guard,
            _file: file,
        })),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn acquires_and_releases_lock() {
        let dir = TempDir::new().unwrap();
        {
            let _lock = lock_host(dir.path()).await.unwrap();
            assert!(dir.path().join(".lock").exists());
        }
        let _lock2 = lock_host(dir.path()).await.unwrap();
    }

    #[tokio::test]
    async fn try_lock_fails_while_held() {
        let dir = TempDir::new().unwrap();
        let _lock = lock_host(dir.path()).await.unwrap();
        let second = try_lock_host(dir.path()).await.unwrap();
        assert!(second.is_none());
    }
}
