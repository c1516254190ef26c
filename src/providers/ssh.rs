//! The SSH provider: a fixed, config-declared pool of pre-existing hosts.
//! `create_host` is unsupported (there is no substrate to provision);
//! "destroying" an SSH host is a no-op that only warns, since the
//! underlying machine is not ours to tear down.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::warn;

use crate::errors::MngError;
use crate::host::{ExecuteCommandOptions, ExecuteCommandResult, Host, HostInterface, OnlineHostInterface, RsyncRemote};
use crate::primitives::{HostId, HostState};

use super::{CreateHostOptions, ProviderBackend};

/// One entry in the SSH pool, typically sourced from config (`mng.toml`'s
/// `[[ssh_hosts]]` tables).
#[derive(Debug, Clone)]
pub struct SshHostConfig {
    pub name: String,
    pub hostname: String,
    pub user: String,
    pub port: u16,
    pub identity_file: Option<PathBuf>,
}

pub struct SshHost {
    id: HostId,
    config: SshHostConfig,
    host_dir: PathBuf,
}

impl SshHost {
    fn ssh_base_args(&self) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            self.config.port.to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
        ];
        if let Some(identity) = &self.config.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }
        args.push(format!("{}@{}", self.config.user, self.config.hostname));
        args
    }
}

impl HostInterface for SshHost {
    fn id(&self) -> &HostId {
        &self.id
    }
    fn get_name(&self) -> &str {
        &self.config.name
    }
    fn host_dir(&self) -> &Path {
        &self.host_dir
    }
    fn is_local(&self) -> bool {
        false
    }
    fn state(&self) -> HostState {
        HostState::Running
    }
}

#[async_trait]
impl OnlineHostInterface for SshHost {
    async fn execute_command(
        &self,
        cmd: &[&str],
        options: ExecuteCommandOptions<'_>,
    ) -> Result<ExecuteCommandResult, MngError> {
        let mut args = self.ssh_base_args();
        let remote_cmd = match options.cwd {
            Some(cwd) => format!("cd {} && {}", cwd.display(), cmd.join(" ")),
            None => cmd.join(" "),
        };
        args.push(remote_cmd);

        let output = Command::new("ssh")
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| MngError::ProcessSetup {
                command: format!("ssh {}", args.join(" ")),
                source: e.to_string(),
            })?;

        Ok(ExecuteCommandResult {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
        })
    }

    async fn read_text_file(&self, path: &Path) -> Result<String, MngError> {
        let result = self
            .execute_command(&["cat", &path.display().to_string()], ExecuteCommandOptions::default())
            .await?;
        if !result.success {
            return Err(MngError::Other(anyhow::anyhow!(
                "cat {path:?} failed: {}",
                result.stderr
            )));
        }
        Ok(result.stdout)
    }

    async fn write_text_file(&self, path: &Path, content: &str, mode: Option<u32>) -> Result<(), MngError> {
        self.write_file(path, content.as_bytes(), mode).await
    }

    async fn write_file(&self, path: &Path, bytes: &[u8], mode: Option<u32>) -> Result<(), MngError> {
        use tokio::io::AsyncWriteExt;

        if let Some(parent) = path.parent() {
            self.execute_command(
                &["mkdir", "-p", &parent.display().to_string()],
                ExecuteCommandOptions::default(),
            )
            .await?;
        }

        let mut args = self.ssh_base_args();
        args.push(format!("cat > {}", path.display()));

        let mut child = Command::new("ssh")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| MngError::ProcessSetup {
                command: "ssh cat >".into(),
                source: e.to_string(),
            })?;

        child
            .stdin
            .take()
            .expect("piped stdin")
            .write_all(bytes)
            .await
            .map_err(|e| MngError::Other(anyhow::anyhow!("write to ssh stdin: {e}")))?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| MngError::ProcessSetup {
                command: "ssh cat >".into(),
                source: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(MngError::Other(anyhow::anyhow!(
                "write {path:?} over ssh failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        if let Some(mode) = mode {
            self.execute_command(
                &["chmod", &format!("{mode:o}"), &path.display().to_string()],
                ExecuteCommandOptions::default(),
            )
            .await?;
        }
        Ok(())
    }

    fn rsync_remote(&self) -> Option<RsyncRemote> {
        Some(RsyncRemote {
            user: self.config.user.clone(),
            hostname: self.config.hostname.clone(),
            port: self.config.port,
            identity_file: self.config.identity_file.clone(),
        })
    }
}

pub struct SshProvider {
    pool: Vec<SshHostConfig>,
    host_dir_root: PathBuf,
}

impl SshProvider {
    pub fn new(pool: Vec<SshHostConfig>, host_dir_root: PathBuf) -> Self {
        Self { pool, host_dir_root }
    }

    fn find(&self, id_or_name: &str) -> Result<&SshHostConfig, MngError> {
        self.pool
            .iter()
            .find(|h| h.name == id_or_name)
            .ok_or_else(|| MngError::NotFound {
                kind: "host",
                id: id_or_name.to_string(),
            })
    }

    fn to_host(&self, config: &SshHostConfig) -> SshHost {
        SshHost {
            id: HostId::from(format!("host-ssh-{}", config.name)),
            host_dir: self.host_dir_root.join(&config.name),
            config: config.clone(),
        }
    }
}

#[async_trait]
impl ProviderBackend for SshProvider {
    fn name(&self) -> &str {
        "ssh"
    }

    async fn create_host(&self, _name: &str, _options: CreateHostOptions) -> Result<Host, MngError> {
        Err(MngError::PreconditionFailed(
            "the ssh provider only manages a pre-declared pool; create_host is not supported".into(),
        ))
    }

    async fn start_host(&self, id_or_name: &str, _snapshot: Option<&crate::primitives::SnapshotId>) -> Result<Host, MngError> {
        self.get_host(id_or_name).await
    }

    async fn stop_host(&self, id_or_name: &str, _create_snapshot: bool) -> Result<(), MngError> {
        warn!(host = id_or_name, "ssh provider cannot stop a pre-existing host; ignoring");
        Ok(())
    }

    async fn destroy_host(&self, id_or_name: &str, _delete_snapshots: bool) -> Result<(), MngError> {
        warn!(host = id_or_name, "ssh provider cannot destroy a pre-existing host; treating as a no-op");
        Ok(())
    }

    async fn get_host(&self, id_or_name: &str) -> Result<Host, MngError> {
        let config = self.find(id_or_name)?;
        Ok(Host::Online(std::sync::Arc::new(self.to_host(config))))
    }

    async fn list_hosts(&self, _include_destroyed: bool) -> Result<Vec<Host>, MngError> {
        Ok(self
            .pool
            .iter()
            .map(|config| Host::Online(std::sync::Arc::new(self.to_host(config))))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_pool() -> Vec<SshHostConfig> {
        vec![SshHostConfig {
            name: "build-box".into(),
            hostname: "build.example.com".into(),
            user: "agent".into(),
            port: 22,
            identity_file: None,
        }]
    }

    #[tokio::test]
    async fn create_host_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let provider = SshProvider::new(sample_pool(), dir.path().to_path_buf());
        let result = provider.create_host("new-box", CreateHostOptions::default()).await;
        assert!(matches!(result, Err(MngError::PreconditionFailed(_))));
    }

    #[tokio::test]
    async fn destroy_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let provider = SshProvider::new(sample_pool(), dir.path().to_path_buf());
        assert!(provider.destroy_host("build-box", false).await.is_ok());
    }

    #[tokio::test]
    async fn get_host_resolves_from_pool() {
        let dir = TempDir::new().unwrap();
        let provider = SshProvider::new(sample_pool(), dir.path().to_path_buf());
        let host = provider.get_host("build-box").await.unwrap();
        assert_eq!(host.get_name(), "build-box");
    }

    #[tokio::test]
    async fn unknown_host_is_not_found() {
        let dir = TempDir::new().unwrap();
        let provider = SshProvider::new(sample_pool(), dir.path().to_path_buf());
        let result = provider.get_host("ghost-box").await;
        assert!(matches!(result, Err(MngError::NotFound { .. })));
    }
}
