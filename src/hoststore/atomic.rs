//! Atomic file writes: every `data.json`/`env`/certified-data write goes
//! through write-to-tmpfile + fsync + rename, so a crash or concurrent
//! reader never observes a half-written file (data model invariant 6).

use std::path::Path;

use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::errors::MngError;

fn tmp_path(target: &Path) -> std::path::PathBuf {
    let file_name = target
        .file_name()
        .map(|n| format!(".{}.tmp", n.to_string_lossy()))
        .unwrap_or_else(|| ".tmp".to_string());
    target.with_file_name(file_name)
}

/// Write `bytes` to `target` atomically: write to a sibling tmpfile, fsync
/// it, then rename over the target (rename is atomic on the same filesystem).
pub async fn write_atomic(target: &Path, bytes: &[u8]) -> Result<(), MngError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| MngError::Other(anyhow::anyhow!("create_dir_all {parent:?}: {e}")))?;
    }

    let tmp = tmp_path(target);
    let mut file = fs::File::create(&tmp)
        .await
        .map_err(|e| MngError::Other(anyhow::anyhow!("create tmpfile {tmp:?}: {e}")))?;
    file.write_all(bytes)
        .await
        .map_err(|e| MngError::Other(anyhow::anyhow!("write tmpfile {tmp:?}: {e}")))?;
    file.sync_all()
        .await
        .map_err(|e| MngError::Other(anyhow::anyhow!("fsync tmpfile {tmp:?}: {e}")))?;
    drop(file);

    fs::rename(&tmp, target)
        .await
        .map_err(|e| MngError::Other(anyhow::anyhow!("rename {tmp:?} -> {target:?}: {e}")))?;

    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub async fn write_json_atomic<T: Serialize>(target: &Path, value: &T) -> Result<(), MngError> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| MngError::Other(anyhow::anyhow!("serialize {target:?}: {e}")))?;
    write_atomic(target, &bytes).await
}

/// Write `contents` with `0600` permissions (agent `env` files may carry
/// secrets), atomically.
#[cfg(unix)]
pub async fn write_atomic_private(target: &Path, bytes: &[u8]) -> Result<(), MngError> {
    use std::os::unix::fs::PermissionsExt;

    write_atomic(target, bytes).await?;
    let perms = std::fs::Permissions::from_mode(0o600);
    fs::set_permissions(target, perms)
        .await
        .map_err(|e| MngError::Other(anyhow::anyhow!("chmod {target:?}: {e}")))?;
    Ok(())
}

#[cfg(not(unix))]
pub async fn write_atomic_private(target: &Path, bytes: &[u8]) -> Result<(), MngError> {
    write_atomic(target, bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn writes_and_reads_back() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested").join("data.json");
        write_atomic(&target, b"hello").await.unwrap();
        let read = fs::read(&target).await.unwrap();
        assert_eq!(read, b"hello");
    }

    #[tokio::test]
    async fn leaves_no_tmp_file_behind() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("data.json");
        write_atomic(&target, b"{}").await.unwrap();
        assert!(!tmp_path(&target).exists());
    }

    #[tokio::test]
    async fn overwrites_existing_file() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("data.json");
        write_atomic(&target, b"first").await.unwrap();
        write_atomic(&target, b"second").await.unwrap();
        assert_eq!(fs::read(&target).await.unwrap(), b"second");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn private_write_sets_owner_only_perms() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("env");
        write_atomic_private(&target, b"KEY=value\n").await.unwrap();
        let mode = fs::metadata(&target).await.unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
