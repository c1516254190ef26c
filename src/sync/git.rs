//! `push_git`/`pull_git`/`sync_git`: mirror an agent's branch
//! between a local git checkout and its host's work-dir repository.
//! `sync_git` is the shared primitive; `push_git`/`pull_git` just swap
//! which side is the source and which is the target.

use std::path::{Path, PathBuf};

use tracing::{instrument, warn};

use crate::errors::MngError;
use crate::git::cli::GitCli;

use super::{require_binary, UncommittedChanges};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitSyncDirection {
    /// Bring `target_branch` up to date with `source_branch` by fast
    /// forward.
    FastForward,
    /// Merge `source_branch` into `target_branch`, creating a merge
    /// commit if history has diverged.
    Merge,
}

impl clap::ValueEnum for GitSyncDirection {
    fn value_variants<'a>() -> &'a [Self] {
        &[GitSyncDirection::FastForward, GitSyncDirection::Merge]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            GitSyncDirection::FastForward => clap::builder::PossibleValue::new("fast-forward"),
            GitSyncDirection::Merge => clap::builder::PossibleValue::new("merge"),
        })
    }
}

#[derive(Debug, Clone)]
pub struct GitSyncRequest {
    pub source_path: PathBuf,
    pub source_branch: String,
    pub target_path: PathBuf,
    pub target_branch: String,
    pub direction: GitSyncDirection,
    pub uncommitted_changes: UncommittedChanges,
    /// `push_git`'s `is_mirror`: after syncing, force-push `target_path`'s
    /// branch to `source_path`'s remote, making it the authoritative copy.
    pub is_mirror: bool,
}

/// Check `path`'s dirty state against `policy`, stashing if requested.
/// Returns whether a stash was pushed, so the caller can pop it once the
/// sync it was guarding has actually succeeded.
async fn guard_target_clean(path: &Path, policy: UncommittedChanges) -> Result<bool, MngError> {
    if policy == UncommittedChanges::Force {
        return Ok(false);
    }
    let dirty = GitCli::is_dirty(path)
        .await
        .map_err(|e| MngError::Other(anyhow::anyhow!("check dirty state of {path:?}: {e}")))?;
    if !dirty {
        return Ok(false);
    }
    match policy {
        UncommittedChanges::Force => unreachable!("handled above"),
        UncommittedChanges::Fail => Err(MngError::PreconditionFailed(format!(
            "{path:?} has uncommitted changes"
        ))),
        UncommittedChanges::Stash => {
            GitCli::stash_push(path)
                .await
                .map_err(|e| MngError::Other(anyhow::anyhow!("stash {path:?}: {e}")))?;
            Ok(true)
        }
    }
}

const SYNC_REMOTE_REF: &str = "refs/mng-sync/head";

/// Fetch `request.source_branch` directly from `request.source_path`
/// into a throwaway ref under `target_path`, then reconcile
/// `target_branch` against it per `direction`. Fetching by path rather
/// than through a preconfigured `origin` remote keeps this usable
/// regardless of how the target checkout was created.
#[instrument(skip(request), fields(target = %request.target_path.display(), branch = %request.target_branch))]
pub async fn sync_git(request: &GitSyncRequest) -> Result<(), MngError> {
    require_binary("git")?;
    let stashed = guard_target_clean(&request.target_path, request.uncommitted_changes).await?;

    let source_spec = request.source_path.display().to_string();
    let refspec = format!("{}:{SYNC_REMOTE_REF}", request.source_branch);
    GitCli::fetch_refspec(&request.target_path, &source_spec, &refspec)
        .await
        .map_err(|e| MngError::Other(anyhow::anyhow!("fetch into {:?}: {e}", request.target_path)))?;

    match request.direction {
        GitSyncDirection::FastForward => GitCli::fast_forward(&request.target_path, SYNC_REMOTE_REF)
            .await
            .map_err(|e| MngError::Other(anyhow::anyhow!("fast-forward {:?}: {e}", request.target_path))),
        GitSyncDirection::Merge => GitCli::merge(&request.target_path, SYNC_REMOTE_REF)
            .await
            .map_err(|e| MngError::Other(anyhow::anyhow!("merge into {:?}: {e}", request.target_path))),
    }?;

    if request.is_mirror {
        GitCli::force_push(&request.target_path, "origin", &request.target_branch)
            .await
            .map_err(|e| MngError::Other(anyhow::anyhow!("mirror push from {:?}: {e}", request.target_path)))?;
    }

    if stashed {
        if let Err(e) = GitCli::stash_pop(&request.target_path).await {
            warn!(path = %request.target_path.display(), error = %e, "failed to restore stash after successful sync, left stashed");
        }
    }

    Ok(())
}

/// `pull_git`: bring the local checkout at `local_path` up to date with
/// the agent's branch on `host_path`.
pub async fn pull_git(
    host_path: &Path,
    host_branch: &str,
    local_path: &Path,
    local_branch: &str,
    direction: GitSyncDirection,
    uncommitted_changes: UncommittedChanges,
) -> Result<(), MngError> {
    sync_git(&GitSyncRequest {
        source_path: host_path.to_path_buf(),
        source_branch: host_branch.to_string(),
        target_path: local_path.to_path_buf(),
        target_branch: local_branch.to_string(),
        direction,
        uncommitted_changes,
        is_mirror: false,
    })
    .await
}

/// `push_git`: bring the agent's branch on `host_path` up to date with
/// the local checkout at `local_path`.
pub async fn push_git(
    local_path: &Path,
    local_branch: &str,
    host_path: &Path,
    host_branch: &str,
    direction: GitSyncDirection,
    uncommitted_changes: UncommittedChanges,
    is_mirror: bool,
) -> Result<(), MngError> {
    sync_git(&GitSyncRequest {
        source_path: local_path.to_path_buf(),
        source_branch: local_branch.to_string(),
        target_path: host_path.to_path_buf(),
        target_branch: host_branch.to_string(),
        direction,
        uncommitted_changes,
        is_mirror,
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::process::Command;

    async fn run(args: &[&str], cwd: &Path) {
        let status = Command::new("git")
            .args(args)
            .current_dir(cwd)
            .status()
            .await
            .unwrap();
        assert!(status.success());
    }

    async fn init_repo_with_commit(dir: &Path) {
        run(&["init", "-b", "main"], dir).await;
        run(&["config", "user.email", "test@example.com"], dir).await;
        run(&["config", "user.name", "test"], dir).await;
        tokio::fs::write(dir.join("file.txt"), b"hello").await.unwrap();
        run(&["add", "-A"], dir).await;
        run(&["commit", "-m", "init"], dir).await;
    }

    #[tokio::test]
    async fn fast_forward_pulls_new_commits() {
        let source_dir = TempDir::new().unwrap();
        init_repo_with_commit(source_dir.path()).await;

        let target_dir = TempDir::new().unwrap();
        run(
            &["clone", source_dir.path().to_str().unwrap(), target_dir.path().to_str().unwrap()],
            Path::new("."),
        )
        .await;

        tokio::fs::write(source_dir.path().join("file2.txt"), b"world")
            .await
            .unwrap();
        run(&["add", "-A"], source_dir.path()).await;
        run(&["commit", "-m", "second"], source_dir.path()).await;

        pull_git(
            source_dir.path(),
            "main",
            target_dir.path(),
            "main",
            GitSyncDirection::FastForward,
            UncommittedChanges::Fail,
        )
        .await
        .unwrap();

        assert!(target_dir.path().join("file2.txt").exists());
    }

    #[tokio::test]
    async fn dirty_target_with_fail_policy_is_rejected() {
        let source_dir = TempDir::new().unwrap();
        init_repo_with_commit(source_dir.path()).await;
        let target_dir = TempDir::new().unwrap();
        run(
            &["clone", source_dir.path().to_str().unwrap(), target_dir.path().to_str().unwrap()],
            Path::new("."),
        )
        .await;
        tokio::fs::write(target_dir.path().join("file.txt"), b"dirty")
            .await
            .unwrap();

        let result = pull_git(
            source_dir.path(),
            "main",
            target_dir.path(),
            "main",
            GitSyncDirection::FastForward,
            UncommittedChanges::Fail,
        )
        .await;
        assert!(matches!(result, Err(MngError::PreconditionFailed(_))));
    }
}
