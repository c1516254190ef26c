//! Provider backends: pluggable implementations of host creation,
//! destruction, and listing for local, Docker, SSH, and remote-mng
//! execution substrates. Each backend is a concrete type behind the
//! `ProviderBackend` trait — a typed registry entry, not a dynamically
//! discovered plugin.

pub mod docker;
pub mod local;
pub mod remote;
pub mod ssh;

pub use docker::DockerProvider;
pub use local::LocalProvider;
pub use remote::RemoteMngProvider;
pub use ssh::SshProvider;

use async_trait::async_trait;
use serde::Serialize;

use crate::errors::MngError;
use crate::host::Host;
use crate::primitives::{HostId, HostState, SnapshotId, VolumeId};

#[derive(Debug, Clone, Default)]
pub struct CreateHostOptions {
    pub image: Option<String>,
    pub tags: Vec<(String, String)>,
    pub build_args: Vec<(String, String)>,
    pub start_args: Vec<String>,
    pub snapshot: Option<SnapshotId>,
}

/// `Serialize` lets the garbage collector run CEL predicates over
/// snapshot records via `cel::FilterSet`, the same way `list` filters
/// `AgentRecord`s.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotInfo {
    pub id: SnapshotId,
    pub name: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub recency_idx: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VolumeInfo {
    pub id: VolumeId,
    pub name: String,
}

/// A concrete execution substrate's host-management surface. Backends
/// that don't support an optional capability (snapshots, volumes,
/// mutable tags) return `ProviderError`/`PreconditionFailed` rather than
/// implementing the method as a no-op, so callers can distinguish
/// "unsupported" from "failed".
#[async_trait]
pub trait ProviderBackend: Send + Sync {
    fn name(&self) -> &str;
    fn supports_snapshots(&self) -> bool {
        false
    }
    fn supports_volumes(&self) -> bool {
        false
    }
    fn supports_mutable_tags(&self) -> bool {
        false
    }
    /// Default retention window for destroyed/stopped hosts before GC
    /// sweeps them: 24h unless the provider instance overrides it.
    fn destroyed_host_persisted_seconds(&self) -> u64 {
        86_400
    }

    async fn create_host(&self, name: &str, options: CreateHostOptions) -> Result<Host, MngError>;
    async fn start_host(&self, id_or_name: &str, snapshot: Option<&SnapshotId>) -> Result<Host, MngError>;
    async fn stop_host(&self, id_or_name: &str, create_snapshot: bool) -> Result<(), MngError>;
    async fn destroy_host(&self, id_or_name: &str, delete_snapshots: bool) -> Result<(), MngError>;
    async fn get_host(&self, id_or_name: &str) -> Result<Host, MngError>;
    async fn list_hosts(&self, include_destroyed: bool) -> Result<Vec<Host>, MngError>;

    async fn list_snapshots(&self, _host_id: &HostId) -> Result<Vec<SnapshotInfo>, MngError> {
        Err(MngError::PreconditionFailed(format!(
            "provider '{}' does not support snapshots",
            self.name()
        )))
    }
    async fn create_snapshot(&self, _host_id: &HostId, _name: &str) -> Result<SnapshotInfo, MngError> {
        Err(MngError::PreconditionFailed(format!(
            "provider '{}' does not support snapshots",
            self.name()
        )))
    }
    async fn delete_snapshot(&self, _snapshot_id: &SnapshotId) -> Result<(), MngError> {
        Err(MngError::PreconditionFailed(format!(
            "provider '{}' does not support snapshots",
            self.name()
        )))
    }

    async fn list_volumes(&self, _host_id: &HostId) -> Result<Vec<VolumeInfo>, MngError> {
        Err(MngError::PreconditionFailed(format!(
            "provider '{}' does not support volumes",
            self.name()
        )))
    }
    async fn delete_volume(&self, _volume_id: &VolumeId) -> Result<(), MngError> {
        Err(MngError::PreconditionFailed(format!(
            "provider '{}' does not support volumes",
            self.name()
        )))
    }

    async fn set_host_tags(&self, _host_id: &HostId, _tags: Vec<(String, String)>) -> Result<(), MngError> {
        Err(MngError::PreconditionFailed(format!(
            "provider '{}' does not support mutable tags",
            self.name()
        )))
    }
}

pub fn host_state_is_reclaimable(state: HostState) -> bool {
    matches!(state, HostState::Stopped | HostState::Destroyed)
}
