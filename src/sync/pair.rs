//! `pair_files`: bidirectional reconciliation via `unison`, which
//! computes a three-way diff against its own archive rather than either
//! side's current state, so "baseline" runs matter: the first `pair`
//! between two paths seeds that archive.

use std::path::PathBuf;
use std::time::Duration;

use tracing::instrument;

use crate::concurrency::{run_process_to_completion, ConcurrencyGroup};
use crate::errors::MngError;

use super::require_binary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Keep whichever side was modified more recently.
    Newer,
    /// Always prefer the source side.
    Source,
    /// Always prefer the target side.
    Target,
    /// Leave the conflict unresolved for the operator to handle manually.
    Ask,
}

impl clap::ValueEnum for ConflictPolicy {
    fn value_variants<'a>() -> &'a [Self] {
        &[
            ConflictPolicy::Newer,
            ConflictPolicy::Source,
            ConflictPolicy::Target,
            ConflictPolicy::Ask,
        ]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            ConflictPolicy::Newer => clap::builder::PossibleValue::new("newer"),
            ConflictPolicy::Source => clap::builder::PossibleValue::new("source"),
            ConflictPolicy::Target => clap::builder::PossibleValue::new("target"),
            ConflictPolicy::Ask => clap::builder::PossibleValue::new("ask"),
        })
    }
}

impl ConflictPolicy {
    fn unison_prefer_flag(self) -> Option<&'static str> {
        match self {
            ConflictPolicy::Newer => Some("newer"),
            ConflictPolicy::Source => Some("path1"),
            ConflictPolicy::Target => Some("path2"),
            ConflictPolicy::Ask => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    Both,
    Source,
    Target,
}

impl clap::ValueEnum for SyncDirection {
    fn value_variants<'a>() -> &'a [Self] {
        &[SyncDirection::Both, SyncDirection::Source, SyncDirection::Target]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            SyncDirection::Both => clap::builder::PossibleValue::new("both"),
            SyncDirection::Source => clap::builder::PossibleValue::new("source"),
            SyncDirection::Target => clap::builder::PossibleValue::new("target"),
        })
    }
}

impl SyncDirection {
    fn unison_force_flag(self) -> Option<&'static str> {
        match self {
            SyncDirection::Both => None,
            SyncDirection::Source => Some("path2"),
            SyncDirection::Target => Some("path1"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PairRequest {
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub conflict: ConflictPolicy,
    pub sync_direction: SyncDirection,
    pub is_dry_run: bool,
    pub timeout: Duration,
}

/// Run one `unison` reconciliation pass between `request.source_path`
/// and `request.target_path`. Both paths must already share a baseline
/// archive from a prior call (unison keeps this under `~/.unison`); the
/// engine does not manage that state itself.
#[instrument(skip(request), fields(source = %request.source_path.display(), target = %request.target_path.display()))]
pub async fn pair_files(request: &PairRequest) -> Result<(), MngError> {
    require_binary("unison")?;

    let mut args: Vec<&str> = vec![
        "unison",
        request.source_path.to_str().ok_or_else(|| {
            MngError::UserInput("source_path is not valid UTF-8".to_string())
        })?,
        request.target_path.to_str().ok_or_else(|| {
            MngError::UserInput("target_path is not valid UTF-8".to_string())
        })?,
        "-batch",
        "-auto",
    ];

    if let Some(prefer) = request.conflict.unison_prefer_flag() {
        args.push("-prefer");
        args.push(prefer);
    }
    if let Some(force) = request.sync_direction.unison_force_flag() {
        args.push("-force");
        args.push(force);
    }
    if request.is_dry_run {
        args.push("-testserver");
    }

    let group = ConcurrencyGroup::make("pair-files", request.timeout);
    run_process_to_completion(&group, &args, request.timeout, None, None, true).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ask_conflict_policy_omits_prefer_flag() {
        assert_eq!(ConflictPolicy::Ask.unison_prefer_flag(), None);
        assert_eq!(ConflictPolicy::Newer.unison_prefer_flag(), Some("newer"));
    }

    #[test]
    fn both_direction_omits_force_flag() {
        assert_eq!(SyncDirection::Both.unison_force_flag(), None);
        assert_eq!(SyncDirection::Source.unison_force_flag(), Some("path2"));
    }
}
