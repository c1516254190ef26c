//! The persisted `Agent` record (`agents/<id>/data.json`) and its sibling
//! `env` file. One record per agent directory under a host's store, so
//! a single agent's data can be written (and locked) independently of
//! its siblings.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::MngError;
use crate::hoststore::atomic::{write_atomic_private, write_json_atomic};
use crate::primitives::{AgentId, AgentLifecycleState, AgentName, HostRef};

pub const AGENT_DATA_FILE: &str = "data.json";
pub const AGENT_ENV_FILE: &str = "env";

/// An agent's persisted record. `plugin` is an opaque
/// per-plugin bag an agent-type plugin can stash readiness markers,
/// tool-specific config, etc. into; the lifecycle engine never
/// interprets its contents. All fields besides `name`, `state`, and
/// `plugin` are immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: AgentId,
    pub name: AgentName,
    #[serde(rename = "type")]
    pub agent_type: String,
    pub command: String,
    pub work_dir: PathBuf,
    pub create_time: DateTime<Utc>,
    pub start_on_boot: bool,
    pub state: AgentLifecycleState,
    pub host: HostRef,
    #[serde(rename = "plugin", default)]
    pub plugin_data: BTreeMap<String, Value>,
}

impl AgentRecord {
    pub fn new(
        name: AgentName,
        agent_type: impl Into<String>,
        command: impl Into<String>,
        work_dir: PathBuf,
        host: HostRef,
    ) -> Self {
        Self {
            id: AgentId::new(),
            name,
            agent_type: agent_type.into(),
            command: command.into(),
            work_dir,
            create_time: Utc::now(),
            start_on_boot: false,
            state: AgentLifecycleState::Stopped,
            host,
            plugin_data: BTreeMap::new(),
        }
    }

    pub fn dir(&self, agents_root: &Path) -> PathBuf {
        agents_root.join(self.id.as_str())
    }

    /// Apply a lifecycle transition, rejecting one the state machine
    /// forbids.
    pub fn transition_to(&mut self, next: AgentLifecycleState) -> Result<(), MngError> {
        if !self.state.can_transition_to(next) {
            return Err(MngError::PreconditionFailed(format!(
                "agent {} cannot transition {:?} -> {next:?}",
                self.id, self.state
            )));
        }
        self.state = next;
        Ok(())
    }

    pub async fn write(&self, agents_root: &Path) -> Result<(), MngError> {
        let dir = self.dir(agents_root);
        write_json_atomic(&dir.join(AGENT_DATA_FILE), self).await
    }

    pub async fn read(agents_root: &Path, id: &AgentId) -> Result<Option<Self>, MngError> {
        let path = agents_root.join(id.as_str()).join(AGENT_DATA_FILE);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let record = serde_json::from_slice(&bytes)
                    .map_err(|e| MngError::Other(anyhow::anyhow!("parse {path:?}: {e}")))?;
                Ok(Some(record))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MngError::Other(anyhow::anyhow!("read {path:?}: {e}"))),
        }
    }

    /// Write the agent's `env` file (`KEY=VALUE` per line, `0600`
    /// permissions since it may carry API keys/secrets).
    pub async fn write_env(
        &self,
        agents_root: &Path,
        vars: &BTreeMap<String, String>,
    ) -> Result<(), MngError> {
        let mut contents = String::new();
        for (k, v) in vars {
            contents.push_str(k);
            contents.push('=');
            contents.push_str(v);
            contents.push('\n');
        }
        let path = self.dir(agents_root).join(AGENT_ENV_FILE);
        write_atomic_private(&path, contents.as_bytes()).await
    }

    pub async fn list(agents_root: &Path) -> Result<Vec<Self>, MngError> {
        let mut records = Vec::new();
        let mut entries = match tokio::fs::read_dir(agents_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(records),
            Err(e) => {
                return Err(MngError::Other(anyhow::anyhow!(
                    "read_dir {agents_root:?}: {e}"
                )))
            }
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| MngError::Other(anyhow::anyhow!("read_dir entry: {e}")))?
        {
            let data_path = entry.path().join(AGENT_DATA_FILE);
            if let Ok(bytes) = tokio::fs::read(&data_path).await {
                if let Ok(record) = serde_json::from_slice(&bytes) {
                    records.push(record);
                }
            }
        }
        Ok(records)
    }
}
