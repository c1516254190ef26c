//! Activity tracking via `agents/<id>/activity/<source>` mtime files.
//! Touching a source's file records a liveness signal; idle computation
//! (`agent::idle`) reads the newest mtime across a mode's source set.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::errors::MngError;
use crate::primitives::ActivitySource;

fn activity_dir(agent_dir: &Path) -> PathBuf {
    agent_dir.join("activity")
}

fn source_path(agent_dir: &Path, source: ActivitySource) -> PathBuf {
    activity_dir(agent_dir).join(source.file_name())
}

/// Record activity from `source` by touching its mtime file (creating it
/// on first use).
pub async fn touch(agent_dir: &Path, source: ActivitySource) -> Result<(), MngError> {
    let path = source_path(agent_dir, source);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| MngError::Other(anyhow::anyhow!("create_dir_all {parent:?}: {e}")))?;
    }
    // Touch: open for append (creating if absent) then set mtime to now by
    // writing nothing and letting the filesystem stamp the write.
    let file = tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(&path)
        .await
        .map_err(|e| MngError::Other(anyhow::anyhow!("touch {path:?}: {e}")))?;
    file.set_len(0)
        .await
        .map_err(|e| MngError::Other(anyhow::anyhow!("truncate {path:?}: {e}")))?;
    file.sync_all()
        .await
        .map_err(|e| MngError::Other(anyhow::anyhow!("sync {path:?}: {e}")))?;
    Ok(())
}

/// Read the mtime of one source's file, if it has ever been touched.
pub async fn last_activity(agent_dir: &Path, source: ActivitySource) -> Option<SystemTime> {
    let path = source_path(agent_dir, source);
    tokio::fs::metadata(&path).await.ok()?.modified().ok()
}

/// The most recent activity across every source in `sources`, or `None`
/// if none of them have ever been touched.
pub async fn latest_among(agent_dir: &Path, sources: &[ActivitySource]) -> Option<SystemTime> {
    let mut latest: Option<SystemTime> = None;
    for &source in sources {
        if let Some(t) = last_activity(agent_dir, source).await {
            latest = Some(latest.map_or(t, |l| l.max(t)));
        }
    }
    latest
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn touch_creates_and_records_mtime() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), ActivitySource::User).await.unwrap();
        assert!(last_activity(dir.path(), ActivitySource::User).await.is_some());
        assert!(last_activity(dir.path(), ActivitySource::Agent).await.is_none());
    }

    #[tokio::test]
    async fn latest_among_picks_max_mtime() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), ActivitySource::Create).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        touch(dir.path(), ActivitySource::User).await.unwrap();

        let create_time = last_activity(dir.path(), ActivitySource::Create).await.unwrap();
        let latest =
            latest_among(dir.path(), &[ActivitySource::Create, ActivitySource::User])
                .await
                .unwrap();
        assert!(latest >= create_time);
    }

    #[tokio::test]
    async fn latest_among_empty_sources_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(latest_among(dir.path(), &[]).await.is_none());
    }
}
