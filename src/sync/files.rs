//! `push_files`/`pull_files`: rsync between a local path and an
//! agent's `work_dir` on its host, with `--stats` parsed back into a
//! transferred-file/byte count the caller can report.

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use tracing::{instrument, warn};

use crate::concurrency::{run_process_to_completion, ConcurrencyGroup};
use crate::errors::MngError;
use crate::git::cli::GitCli;
use crate::host::Host;

use super::{require_binary, UncommittedChanges};

#[derive(Debug, Clone)]
pub struct PushPullRequest {
    pub local_path: PathBuf,
    pub remote_path: PathBuf,
    pub is_delete: bool,
    pub is_dry_run: bool,
    pub uncommitted_changes: UncommittedChanges,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSyncOutcome {
    pub files_transferred: u64,
    pub bytes_transferred: u64,
    pub stashed: bool,
}

/// Check the local side's dirty state against `uncommitted_changes`,
/// stashing if requested. Remote-side dirtiness is inherently racy to
/// stash over rsync and is left to `sync_git`'s branch-based path
/// instead; the file path only governs the side rsync actually reads
/// from directly.
async fn guard_uncommitted(path: &Path, policy: UncommittedChanges) -> Result<bool, MngError> {
    if policy == UncommittedChanges::Force || !path.join(".git").exists() {
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

fn parse_stats(stdout: &str) -> (u64, u64) {
    let files_re = Regex::new(r"Number of regular files transferred:\s*([\d,]+)").unwrap();
    let bytes_re = Regex::new(r"Total transferred file size:\s*([\d,]+)").unwrap();
    let parse_count = |re: &Regex| -> u64 {
        re.captures(stdout)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().replace(',', ""))
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    };
    (parse_count(&files_re), parse_count(&bytes_re))
}

fn rsync_endpoint(host: &Host, path: &Path) -> Result<(String, Option<String>), MngError> {
    let online = host.as_online()?;
    match online.rsync_remote() {
        Some(remote) => Ok((remote.spec(path), Some(remote.ssh_command()))),
        None => Ok((path.display().to_string(), None)),
    }
}

/// `push_files`: copy `request.local_path` onto `host`'s
/// `request.remote_path`.
#[instrument(skip(host), fields(local = %request.local_path.display(), remote = %request.remote_path.display()))]
pub async fn push_files(host: &Host, request: &PushPullRequest) -> Result<FileSyncOutcome, MngError> {
    require_binary("rsync")?;
    let stashed = guard_uncommitted(&request.local_path, request.uncommitted_changes).await?;
    let (dest, ssh_cmd) = rsync_endpoint(host, &request.remote_path)?;
    let outcome = run_rsync(&request.local_path, &dest, ssh_cmd.as_deref(), request).await?;
    if stashed {
        if let Err(e) = GitCli::stash_pop(&request.local_path).await {
            warn!(path = %request.local_path.display(), error = %e, "failed to restore stash after successful push, left stashed");
        }
    }
    Ok(FileSyncOutcome { stashed, ..outcome })
}

/// `pull_files`: copy `host`'s `request.remote_path` down to
/// `request.local_path`.
#[instrument(skip(host), fields(local = %request.local_path.display(), remote = %request.remote_path.display()))]
pub async fn pull_files(host: &Host, request: &PushPullRequest) -> Result<FileSyncOutcome, MngError> {
    require_binary("rsync")?;
    let (source, ssh_cmd) = rsync_endpoint(host, &request.remote_path)?;
    run_rsync(Path::new(&source), &request.local_path.display().to_string(), ssh_cmd.as_deref(), request)
        .await
}

async fn run_rsync(
    source: &Path,
    dest: &str,
    ssh_cmd: Option<&str>,
    request: &PushPullRequest,
) -> Result<FileSyncOutcome, MngError> {
    let source_arg = format!("{}/", source.display());
    let dest_arg = format!("{dest}/");

    let mut args: Vec<&str> = vec!["rsync", "-a", "--stats"];
    if request.is_delete {
        args.push("--delete");
    }
    if request.is_dry_run {
        args.push("--dry-run");
    }
    if let Some(cmd) = ssh_cmd {
        args.push("-e");
        args.push(cmd);
    }
    args.push(&source_arg);
    args.push(&dest_arg);

    let group = ConcurrencyGroup::make("push-pull-files", request.timeout);
    let output = run_process_to_completion(&group, &args, request.timeout, None, None, true).await?;
    let (files_transferred, bytes_transferred) = parse_stats(&output.stdout);
    Ok(FileSyncOutcome {
        files_transferred,
        bytes_transferred,
        stashed: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rsync_stats_output() {
        let sample = "\
Number of files: 12
Number of regular files transferred: 3
Total file size: 1,024 bytes
Total transferred file size: 512 bytes
";
        let (files, bytes) = parse_stats(sample);
        assert_eq!(files, 3);
        assert_eq!(bytes, 512);
    }

    #[test]
    fn missing_stats_lines_default_to_zero() {
        let (files, bytes) = parse_stats("no stats here");
        assert_eq!(files, 0);
        assert_eq!(bytes, 0);
    }
}
