//! Work-directory preparation for `create`'s step 3: the four
//! supported modes, each built on an existing primitive
//! — `worktree` in `git::worktree::WorktreeManager`, `clone` in
//! `GitCli::clone_repo`, `copy_source` in a one-shot rsync invocation (the
//! same primitive `sync::files::push_files` reuses), and
//! `in_place` which does nothing at all.

use std::path::PathBuf;
use std::time::Duration;

use crate::concurrency::{run_process_to_completion, ConcurrencyGroup};
use crate::errors::MngError;
use crate::git::cli::GitCli;
use crate::git::worktree::WorktreeManager;
use crate::host::Host;

#[derive(Debug, Clone)]
pub enum WorkDirSource {
    /// Use an existing directory directly; never created or removed by
    /// the lifecycle engine.
    InPlace(PathBuf),
    /// Rsync-copy an existing directory into a fresh one under the host's
    /// work root.
    CopySource(PathBuf),
    /// Create a git worktree off `base_branch` in `repo_path`, on a new
    /// branch derived from the session-naming pattern.
    Worktree {
        repo_path: PathBuf,
        base_branch: String,
    },
    /// `git clone` a source (local path or remote URL) into a fresh
    /// directory under the host's work root.
    Clone {
        source: String,
        branch: Option<String>,
    },
}

/// The outcome of preparing a work directory: its path, and whether the
/// lifecycle engine generated it (and so must register/unregister it in
/// `generated_work_dirs`, and may delete it on rollback) versus it being
/// the caller's own pre-existing directory (`in_place`).
pub struct Prepared {
    pub path: PathBuf,
    pub owned: bool,
}

fn generated_root(host: &Host, agent_name: &str) -> PathBuf {
    host.host_dir().join("work").join(agent_name)
}

pub async fn prepare(
    source: &WorkDirSource,
    host: &Host,
    prefix: &str,
    agent_name: &str,
    worktrees: &WorktreeManager,
) -> Result<Prepared, MngError> {
    match source {
        WorkDirSource::InPlace(path) => {
            if !path.exists() {
                return Err(MngError::UserInput(format!(
                    "work_dir source {path:?} does not exist"
                )));
            }
            Ok(Prepared {
                path: path.clone(),
                owned: false,
            })
        }
        WorkDirSource::CopySource(source_path) => {
            let dest = generated_root(host, agent_name);
            tokio::fs::create_dir_all(&dest)
                .await
                .map_err(|e| MngError::Other(anyhow::anyhow!("create_dir_all {dest:?}: {e}")))?;
            let group = ConcurrencyGroup::make("copy-source", Duration::from_secs(300));
            let source_arg = format!("{}/", source_path.display());
            let dest_arg = format!("{}/", dest.display());
            run_process_to_completion(
                &group,
                &["rsync", "-a", &source_arg, &dest_arg],
                Duration::from_secs(300),
                None,
                None,
                true,
            )
            .await?;
            Ok(Prepared {
                path: dest,
                owned: true,
            })
        }
        WorkDirSource::Worktree {
            repo_path,
            base_branch,
        } => {
            let branch_name = format!("{prefix}{agent_name}");
            let info = worktrees
                .create_for_agent(repo_path, host.get_name(), agent_name, &branch_name, base_branch)
                .await
                .map_err(|e| MngError::Other(anyhow::anyhow!("create worktree: {e}")))?;
            Ok(Prepared {
                path: info.path,
                owned: true,
            })
        }
        WorkDirSource::Clone { source, branch } => {
            let dest = generated_root(host, agent_name);
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| MngError::Other(anyhow::anyhow!("create_dir_all {parent:?}: {e}")))?;
            }
            GitCli::clone_repo(source, &dest, branch.as_deref())
                .await
                .map_err(|e| MngError::Other(anyhow::anyhow!("clone {source} into {dest:?}: {e}")))?;
            Ok(Prepared {
                path: dest,
                owned: true,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{LocalProvider, ProviderBackend};
    use tempfile::TempDir;

    #[tokio::test]
    async fn in_place_requires_existing_directory() {
        let dir = TempDir::new().unwrap();
        let provider = LocalProvider::new(dir.path().join("hosts"));
        let host = provider.create_host("localhost", Default::default()).await.unwrap();
        let worktrees = WorktreeManager::new(dir.path().join("worktrees"));

        let missing = dir.path().join("does-not-exist");
        let result = prepare(
            &WorkDirSource::InPlace(missing),
            &host,
            "mng-",
            "a1",
            &worktrees,
        )
        .await;
        assert!(matches!(result, Err(MngError::UserInput(_))));
    }

    #[tokio::test]
    async fn in_place_existing_directory_is_not_owned() {
        let dir = TempDir::new().unwrap();
        let provider = LocalProvider::new(dir.path().join("hosts"));
        let host = provider.create_host("localhost", Default::default()).await.unwrap();
        let worktrees = WorktreeManager::new(dir.path().join("worktrees"));

        let existing = dir.path().join("work");
        tokio::fs::create_dir_all(&existing).await.unwrap();
        let prepared = prepare(
            &WorkDirSource::InPlace(existing.clone()),
            &host,
            "mng-",
            "a1",
            &worktrees,
        )
        .await
        .unwrap();
        assert_eq!(prepared.path, existing);
        assert!(!prepared.owned);
    }
}
