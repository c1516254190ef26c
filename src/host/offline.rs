//! An offline host: reconstructed purely from `CertifiedHostData` on
//! disk, without contacting its provider. Supports state inspection
//! (listing persisted agents, reading certified data) but not command
//! execution; callers needing that call `ensure_host_started` to obtain
//! an `Online` variant first.

use std::path::{Path, PathBuf};

use crate::agent::AgentRecord;
use crate::errors::MngError;
use crate::hoststore::CertifiedHostData;
use crate::primitives::{HostId, HostState};

use super::HostInterface;

pub struct OfflineHost {
    id: HostId,
    name: String,
    host_dir: PathBuf,
    is_local: bool,
    state: HostState,
}

impl OfflineHost {
    pub fn from_certified_data(
        data: &CertifiedHostData,
        host_dir: PathBuf,
        is_local: bool,
        state: HostState,
    ) -> Self {
        Self {
            id: data.host_id.clone(),
            name: data.host_name.clone(),
            host_dir,
            is_local,
            state,
        }
    }

    /// Load an offline host from `host_dir`, reading its certified data.
    /// Fails with `NotFound` if the directory has never been certified.
    pub async fn load(host_dir: &Path, is_local: bool) -> Result<Self, MngError> {
        let data = CertifiedHostData::read(host_dir).await?.ok_or_else(|| {
            MngError::NotFound {
                kind: "host",
                id: host_dir.display().to_string(),
            }
        })?;
        Ok(Self::from_certified_data(&data, host_dir.to_path_buf(), is_local, HostState::Stopped))
    }

    pub async fn list_persisted_agents(&self) -> Result<Vec<AgentRecord>, MngError> {
        AgentRecord::list(&self.host_dir.join("agents")).await
    }
}

impl HostInterface for OfflineHost {
    fn id(&self) -> &HostId {
        &self.id
    }

    fn get_name(&self) -> &str {
        &self.name
    }

    fn host_dir(&self) -> &Path {
        &self.host_dir
    }

    fn is_local(&self) -> bool {
        self.is_local
    }

    fn state(&self) -> HostState {
        self.state
    }
}
