//! Host interface: the abstraction every provider backend's hosts
//! implement, and the offline variant reconstructed purely from on-disk
//! certified data without contacting the provider.

pub mod offline;

pub use offline::OfflineHost;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::MngError;
use crate::hoststore::{lock_host, CertifiedHostData, HostLock};
use crate::primitives::{HostId, HostState};

#[derive(Debug, Clone, Default)]
pub struct ExecuteCommandOptions<'a> {
    pub user: Option<&'a str>,
    pub cwd: Option<&'a Path>,
    pub env: Option<&'a [(&'a str, &'a str)]>,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct ExecuteCommandResult {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

/// The ssh connection coordinates of a non-local online host, for
/// building `rsync`/`ssh` remote specs (`user@host:path`) in the sync
/// engine. `None` from `OnlineHostInterface::rsync_remote` means
/// the host is reachable as a plain local path (the local provider, or a
/// provider whose transport isn't ssh-shaped).
#[derive(Debug, Clone)]
pub struct RsyncRemote {
    pub user: String,
    pub hostname: String,
    pub port: u16,
    pub identity_file: Option<PathBuf>,
}

impl RsyncRemote {
    /// `-e 'ssh -p PORT [-i IDENTITY] -o StrictHostKeyChecking=no'` args,
    /// as rsync expects them in its `-e` option value.
    pub fn ssh_command(&self) -> String {
        let mut cmd = format!("ssh -p {} -o StrictHostKeyChecking=no", self.port);
        if let Some(identity) = &self.identity_file {
            cmd.push_str(&format!(" -i {}", identity.display()));
        }
        cmd
    }

    pub fn spec(&self, path: &Path) -> String {
        format!("{}@{}:{}", self.user, self.hostname, path.display())
    }
}

/// State inspection any host — online or offline — can answer without
/// necessarily being reachable right now.
#[async_trait]
pub trait HostInterface: Send + Sync {
    fn id(&self) -> &HostId;
    fn get_name(&self) -> &str;
    fn host_dir(&self) -> &Path;
    fn is_local(&self) -> bool;
    fn state(&self) -> HostState;

    fn get_agent_env_path(&self, agent_id: &crate::primitives::AgentId) -> PathBuf {
        self.host_dir()
            .join("agents")
            .join(agent_id.as_str())
            .join("env")
    }

    async fn certified_data(&self) -> Result<Option<CertifiedHostData>, MngError> {
        CertifiedHostData::read(self.host_dir()).await
    }

    /// Scoped mutual exclusion on the host lock file; every operation
    /// that spans multiple files under the host store acquires this for
    /// its critical section.
    async fn lock_cooperatively(&self) -> Result<HostLock, MngError> {
        lock_host(self.host_dir()).await
    }
}

/// A host this process can actively reach: run commands, read/write
/// files. Implemented by each provider's concrete host type (local
/// process, docker container via ssh, ssh host, remote-mng peer).
#[async_trait]
pub trait OnlineHostInterface: HostInterface {
    async fn execute_command(
        &self,
        cmd: &[&str],
        options: ExecuteCommandOptions<'_>,
    ) -> Result<ExecuteCommandResult, MngError>;

    async fn read_text_file(&self, path: &Path) -> Result<String, MngError>;

    async fn write_text_file(&self, path: &Path, content: &str, mode: Option<u32>) -> Result<(), MngError>;

    async fn write_file(&self, path: &Path, bytes: &[u8], mode: Option<u32>) -> Result<(), MngError>;

    /// This host's ssh coordinates, if it is reachable over ssh (docker,
    /// ssh-pool, remote-mng hosts tunneling over ssh); `None` for the
    /// local provider, where a plain path suffices.
    fn rsync_remote(&self) -> Option<RsyncRemote> {
        None
    }
}

/// Either an online host (this process can reach it directly) or an
/// offline one (reconstructed from certified data; must be started via
/// `ensure_host_started` before any online operation).
pub enum Host {
    Online(std::sync::Arc<dyn OnlineHostInterface>),
    Offline(OfflineHost),
}

impl Host {
    pub fn id(&self) -> &HostId {
        match self {
            Host::Online(h) => h.id(),
            Host::Offline(h) => h.id(),
        }
    }

    pub fn get_name(&self) -> &str {
        match self {
            Host::Online(h) => h.get_name(),
            Host::Offline(h) => h.get_name(),
        }
    }

    pub fn state(&self) -> HostState {
        match self {
            Host::Online(h) => h.state(),
            Host::Offline(h) => h.state(),
        }
    }

    pub fn is_local(&self) -> bool {
        match self {
            Host::Online(h) => h.is_local(),
            Host::Offline(h) => h.is_local(),
        }
    }

    pub fn host_dir(&self) -> &Path {
        match self {
            Host::Online(h) => h.host_dir(),
            Host::Offline(h) => h.host_dir(),
        }
    }

    pub fn agents_dir(&self) -> PathBuf {
        self.host_dir().join("agents")
    }

    /// Borrow this host as an `OnlineHostInterface`, for operations that
    /// need to execute commands or transfer files. Offline hosts must be
    /// started first.
    pub fn as_online(&self) -> Result<&(dyn OnlineHostInterface + '_), MngError> {
        match self {
            Host::Online(h) => Ok(h.as_ref()),
            Host::Offline(h) => Err(MngError::PreconditionFailed(format!(
                "host '{}' is offline; start it before running online operations",
                h.get_name()
            ))),
        }
    }

    pub async fn lock_cooperatively(&self) -> Result<crate::hoststore::HostLock, MngError> {
        crate::hoststore::lock_host(self.host_dir()).await
    }
}
