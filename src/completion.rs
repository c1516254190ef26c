//! Shell-completion cache: a CLI's own
//! `--help` introspection is slow enough that shells want a cached,
//! pre-computed completion table instead of invoking the binary per
//! keystroke. Two JSON files under the completion cache directory:
//! `.command_completions.json` (written once at startup or when the
//! plugin registry changes) and `.agent_completions.json` (refreshed
//! lazily in the background; readers tolerate it being stale or
//! missing, since shell completion must never block on it).
//!
//! The original namespaces its temp-dir fallback by uid
//! (`/tmp/mng-completions-<uid>`); this crate forbids `unsafe_code`
//! (`Cargo.toml` lints), so rather than reach for an FFI `getuid()` call
//! the fallback uses `dirs::cache_dir()` (already a dependency) joined
//! with the crate name, which is per-user on every platform `dirs`
//! supports without any unsafe surface.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::concurrency::ConcurrencyGroup;
use crate::errors::MngError;
use crate::hoststore::atomic::write_json_atomic;
use crate::list::{list_agents, ListRequest};
use crate::providers::ProviderBackend;
use std::sync::Arc;

pub const COMMAND_COMPLETIONS_FILE: &str = ".command_completions.json";
pub const AGENT_COMPLETIONS_FILE: &str = ".agent_completions.json";

/// Resolve the completion cache directory: `MNG_COMPLETION_CACHE_DIR` if
/// set, else `dirs::cache_dir()/mng`. Created if it doesn't exist.
pub async fn completion_cache_dir() -> Result<PathBuf, MngError> {
    let dir = match std::env::var("MNG_COMPLETION_CACHE_DIR") {
        Ok(value) if !value.is_empty() => PathBuf::from(value),
        _ => dirs::cache_dir()
            .ok_or_else(|| MngError::Other(anyhow::anyhow!("no cache directory available on this platform")))?
            .join("mng"),
    };
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| MngError::Other(anyhow::anyhow!("create_dir_all {dir:?}: {e}")))?;
    Ok(dir)
}

/// Static shape of the CLI's subcommand/option tables, written once
/// per process start (or whenever the plugin registry changes the set
/// of registered commands).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandCompletions {
    pub commands: Vec<String>,
    pub aliases: BTreeMap<String, String>,
    pub subcommand_by_command: BTreeMap<String, Vec<String>>,
    pub options_by_command: BTreeMap<String, Vec<String>>,
    pub option_choices: BTreeMap<String, Vec<String>>,
    /// Names of CLI arguments (`"<command>.<arg>"`) that accept an agent
    /// name, so a completer knows when to consult `AgentCompletions`.
    pub agent_name_arguments: Vec<String>,
}

pub async fn write_command_completions(
    cache_dir: &Path,
    completions: &CommandCompletions,
) -> Result<(), MngError> {
    write_json_atomic(&cache_dir.join(COMMAND_COMPLETIONS_FILE), completions).await
}

/// The live set of agent names, refreshed lazily. `None` if the file is
/// missing, unreadable, or malformed — shell completion degrades to no
/// suggestions rather than ever failing or blocking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCompletions {
    pub names: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

pub async fn read_agent_completions(cache_dir: &Path) -> Option<AgentCompletions> {
    let path = cache_dir.join(AGENT_COMPLETIONS_FILE);
    let bytes = tokio::fs::read(&path).await.ok()?;
    serde_json::from_slice(&bytes).ok()
}

async fn write_agent_completions(cache_dir: &Path, names: Vec<String>) -> Result<(), MngError> {
    let mut names = names;
    names.sort();
    names.dedup();
    let completions = AgentCompletions {
        names,
        updated_at: Utc::now(),
    };
    write_json_atomic(&cache_dir.join(AGENT_COMPLETIONS_FILE), &completions).await
}

/// Recompute `.agent_completions.json` from the live provider set and
/// write it, swallowing (logging) errors rather than propagating them —
/// this is always called fire-and-forget, never awaited by a path the
/// user is blocked on.
pub async fn refresh_agent_completions(
    cache_dir: &Path,
    providers: &[Arc<dyn ProviderBackend>],
) -> Result<(), MngError> {
    let result = list_agents(providers, &ListRequest::default(), None).await?;
    let names = result.agents.into_iter().map(|a| a.name.as_str().to_string()).collect();
    write_agent_completions(cache_dir, names).await
}

/// Spawn `refresh_agent_completions` as an unchecked (fire-and-forget)
/// worker in `group`, so a command that touches the agent set can kick
/// off a cache refresh without making its own caller wait for it.
pub async fn refresh_agent_completions_async(
    group: &ConcurrencyGroup,
    cache_dir: PathBuf,
    providers: Vec<Arc<dyn ProviderBackend>>,
) {
    group
        .start_new_task(Some("refresh-agent-completions"), false, async move {
            if let Err(e) = refresh_agent_completions(&cache_dir, &providers).await {
                warn!(%e, "background agent-completion refresh failed");
            }
            Ok(())
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn command_completions_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut completions = CommandCompletions::default();
        completions.commands = vec!["create".into(), "list".into()];
        completions.agent_name_arguments = vec!["destroy.name".into()];
        write_command_completions(dir.path(), &completions).await.unwrap();

        let bytes = tokio::fs::read(dir.path().join(COMMAND_COMPLETIONS_FILE))
            .await
            .unwrap();
        let read_back: CommandCompletions = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(read_back.commands, completions.commands);
    }

    #[tokio::test]
    async fn missing_agent_completions_is_none_not_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(read_agent_completions(dir.path()).await.is_none());
    }

    #[tokio::test]
    async fn agent_completions_are_sorted_and_deduplicated() {
        let dir = TempDir::new().unwrap();
        write_agent_completions(dir.path(), vec!["b".into(), "a".into(), "a".into()])
            .await
            .unwrap();
        let completions = read_agent_completions(dir.path()).await.unwrap();
        assert_eq!(completions.names, vec!["a".to_string(), "b".to_string()]);
    }
}
