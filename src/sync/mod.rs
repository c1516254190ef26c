//! Sync engine: rsync-based file push/pull, git branch push/pull/sync,
//! and a unison-based bidirectional `pair_files`. Every operation first
//! confirms its external binary is installed via `which`, surfacing
//! `MngError::BinaryNotInstalled` with a platform-specific hint rather
//! than a raw spawn failure — the same precondition check
//! `git/worktree.rs` runs before touching `git` itself.

pub mod files;
pub mod git;
pub mod pair;

pub use files::{push_files, pull_files, FileSyncOutcome, PushPullRequest};
pub use git::{pull_git, push_git, sync_git, GitSyncDirection, GitSyncRequest};
pub use pair::{pair_files, ConflictPolicy, PairRequest, SyncDirection};

use crate::errors::MngError;

/// How to handle a dirty working tree encountered during a sync
/// operation. Shared by both the file and git sync paths since
/// both can hit a local or remote side with uncommitted changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UncommittedChanges {
    /// Raise `MngError::PreconditionFailed` and do nothing.
    #[default]
    Fail,
    /// Stash the affected side before proceeding, then pop the stash
    /// back once the sync itself has succeeded. Left stashed (and
    /// reported via a warning) if the sync fails, so the failure is
    /// never masked by a stash-pop conflict.
    Stash,
    /// Proceed regardless of dirty state.
    Force,
}

impl clap::ValueEnum for UncommittedChanges {
    fn value_variants<'a>() -> &'a [Self] {
        &[
            UncommittedChanges::Fail,
            UncommittedChanges::Stash,
            UncommittedChanges::Force,
        ]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            UncommittedChanges::Fail => clap::builder::PossibleValue::new("fail"),
            UncommittedChanges::Stash => clap::builder::PossibleValue::new("stash"),
            UncommittedChanges::Force => clap::builder::PossibleValue::new("force"),
        })
    }
}

fn install_hint(binary: &str) -> String {
    match binary {
        "rsync" => "install it via your platform's package manager, e.g. `apt install rsync` or `brew install rsync`".into(),
        "unison" => "install it via `brew install unison` or `apt install unison`".into(),
        "git" => "install it via `apt install git` or `brew install git`".into(),
        other => format!("install `{other}` via your platform's package manager"),
    }
}

/// Confirm `binary` resolves on `PATH`, raising `BinaryNotInstalled`
/// otherwise. Called once at the top of every sync operation before any
/// subprocess is spawned.
pub fn require_binary(binary: &str) -> Result<(), MngError> {
    which::which(binary)
        .map(|_| ())
        .map_err(|_| MngError::BinaryNotInstalled {
            binary: binary.to_string(),
            hint: install_hint(binary),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_reports_hint() {
        let err = require_binary("definitely-not-a-real-binary-xyz").unwrap_err();
        match err {
            MngError::BinaryNotInstalled { binary, hint } => {
                assert_eq!(binary, "definitely-not-a-real-binary-xyz");
                assert!(!hint.is_empty());
            }
            other => panic!("expected BinaryNotInstalled, got {other:?}"),
        }
    }

    #[test]
    fn git_is_installed_in_this_environment() {
        assert!(require_binary("git").is_ok());
    }
}
