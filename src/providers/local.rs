//! The local provider: a single well-known host (`localhost`), no
//! process boundary to cross. `host_dir` defaults to `~/.mng` (or
//! `MNG_HOST_DIR`). Always `RUNNING`; never garbage-collected.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::errors::MngError;
use crate::host::{ExecuteCommandOptions, ExecuteCommandResult, Host, HostInterface, OnlineHostInterface};
use crate::hoststore::CertifiedHostData;
use crate::primitives::{HostId, HostState};

use super::{CreateHostOptions, ProviderBackend};

pub const LOCAL_HOST_NAME: &str = "localhost";

pub struct LocalHost {
    id: HostId,
    host_dir: PathBuf,
}

impl LocalHost {
    pub fn new(id: HostId, host_dir: PathBuf) -> Self {
        Self { id, host_dir }
    }
}

impl HostInterface for LocalHost {
    fn id(&self) -> &HostId {
        &self.id
    }
    fn get_name(&self) -> &str {
        LOCAL_HOST_NAME
    }
    fn host_dir(&self) -> &Path {
        &self.host_dir
    }
    fn is_local(&self) -> bool {
        true
    }
    fn state(&self) -> HostState {
        HostState::Running
    }
}

#[async_trait]
impl OnlineHostInterface for LocalHost {
    async fn execute_command(
        &self,
        cmd: &[&str],
        options: ExecuteCommandOptions<'_>,
    ) -> Result<ExecuteCommandResult, MngError> {
        let Some((program, args)) = cmd.split_first() else {
            return Err(MngError::UserInput("empty command".into()));
        };
        let mut command = Command::new(program);
        command.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
        if let Some(cwd) = options.cwd {
            command.current_dir(cwd);
        }
        if let Some(env) = options.env {
            for (k, v) in env {
                command.env(k, v);
            }
        }
        let output = command.output().await.map_err(|e| MngError::ProcessSetup {
            command: cmd.join(" "),
            source: e.to_string(),
        })?;
        Ok(ExecuteCommandResult {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
        })
    }

    async fn read_text_file(&self, path: &Path) -> Result<String, MngError> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| MngError::Other(anyhow::anyhow!("read {path:?}: {e}")))
    }

    async fn write_text_file(&self, path: &Path, content: &str, mode: Option<u32>) -> Result<(), MngError> {
        self.write_file(path, content.as_bytes(), mode).await
    }

    async fn write_file(&self, path: &Path, bytes: &[u8], mode: Option<u32>) -> Result<(), MngError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MngError::Other(anyhow::anyhow!("create_dir_all {parent:?}: {e}")))?;
        }
        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| MngError::Other(anyhow::anyhow!("create {path:?}: {e}")))?;
        file.write_all(bytes)
            .await
            .map_err(|e| MngError::Other(anyhow::anyhow!("write {path:?}: {e}")))?;
        #[cfg(unix)]
        if let Some(mode) = mode {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
                .await
                .map_err(|e| MngError::Other(anyhow::anyhow!("chmod {path:?}: {e}")))?;
        }
        #[cfg(not(unix))]
        let _ = mode;
        Ok(())
    }
}

pub struct LocalProvider {
    host_dir: PathBuf,
}

impl LocalProvider {
    pub fn new(host_dir: PathBuf) -> Self {
        Self { host_dir }
    }

    async fn ensure_certified(&self) -> Result<HostId, MngError> {
        if let Some(data) = CertifiedHostData::read(&self.host_dir).await? {
            return Ok(data.host_id);
        }
        let data = CertifiedHostData::new(HostId::new(), LOCAL_HOST_NAME);
        data.write(&self.host_dir).await?;
        Ok(data.host_id)
    }
}

#[async_trait]
impl ProviderBackend for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn create_host(&self, _name: &str, _options: CreateHostOptions) -> Result<Host, MngError> {
        // Local has exactly one host; "creating" is idempotent certification.
        let id = self.ensure_certified().await?;
        Ok(Host::Online(std::sync::Arc::new(LocalHost::new(
            id,
            self.host_dir.clone(),
        ))))
    }

    async fn start_host(&self, _id_or_name: &str, _snapshot: Option<&crate::primitives::SnapshotId>) -> Result<Host, MngError> {
        self.create_host(LOCAL_HOST_NAME, CreateHostOptions::default()).await
    }

    async fn stop_host(&self, _id_or_name: &str, _create_snapshot: bool) -> Result<(), MngError> {
        Err(MngError::PreconditionFailed(
            "the local host cannot be stopped".into(),
        ))
    }

    async fn destroy_host(&self, _id_or_name: &str, _delete_snapshots: bool) -> Result<(), MngError> {
        Err(MngError::PreconditionFailed(
            "the local host cannot be destroyed".into(),
        ))
    }

    async fn get_host(&self, _id_or_name: &str) -> Result<Host, MngError> {
        self.create_host(LOCAL_HOST_NAME, CreateHostOptions::default()).await
    }

    async fn list_hosts(&self, _include_destroyed: bool) -> Result<Vec<Host>, MngError> {
        Ok(vec![self
            .create_host(LOCAL_HOST_NAME, CreateHostOptions::default())
            .await?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn create_host_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let provider = LocalProvider::new(dir.path().to_path_buf());
        let first = provider.create_host("localhost", CreateHostOptions::default()).await.unwrap();
        let second = provider.create_host("localhost", CreateHostOptions::default()).await.unwrap();
        assert_eq!(first.id(), second.id());
    }

    #[tokio::test]
    async fn execute_command_runs_and_captures_stdout() {
        let dir = TempDir::new().unwrap();
        let host = LocalHost::new(HostId::new(), dir.path().to_path_buf());
        let result = host
            .execute_command(&["echo", "hi"], ExecuteCommandOptions::default())
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.stdout.trim(), "hi");
    }

    #[tokio::test]
    async fn stop_and_destroy_are_rejected() {
        let dir = TempDir::new().unwrap();
        let provider = LocalProvider::new(dir.path().to_path_buf());
        assert!(provider.stop_host("localhost", false).await.is_err());
        assert!(provider.destroy_host("localhost", false).await.is_err());
    }
}
