//! The Docker provider: hosts are containers running a base image with
//! `sshd`, tagged with labels `{mng.host_id, mng.host_name, mng.provider}`
//! so they can be enumerated without a side index. Command
//! execution tunnels over the container's exposed SSH port rather than
//! `docker exec`, so the agent runtime sees the same connector shape as a
//! plain SSH host.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::errors::MngError;
use crate::host::{ExecuteCommandOptions, ExecuteCommandResult, Host, HostInterface, OnlineHostInterface, RsyncRemote};
use crate::hoststore::CertifiedHostData;
use crate::primitives::{HostId, HostState};

use super::{CreateHostOptions, ProviderBackend};

const LABEL_PROVIDER: &str = "mng.provider";
const LABEL_HOST_ID: &str = "mng.host_id";
const LABEL_HOST_NAME: &str = "mng.host_name";
const DEFAULT_SSH_USER: &str = "root";

async fn run_docker(args: &[&str]) -> Result<String, MngError> {
    let output = Command::new("docker")
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| MngError::ProcessSetup {
            command: format!("docker {}", args.join(" ")),
            source: e.to_string(),
        })?;
    if !output.status.success() {
        return Err(MngError::ProcessError {
            command: std::iter::once("docker".to_string())
                .chain(args.iter().map(|s| s.to_string()))
                .collect(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            returncode: output.status.code(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

pub struct DockerHost {
    id: HostId,
    name: String,
    container_id: String,
    ssh_port: u16,
    host_dir: PathBuf,
    state: HostState,
}

impl DockerHost {
    fn ssh_target(&self) -> String {
        format!("{DEFAULT_SSH_USER}@localhost")
    }
}

impl HostInterface for DockerHost {
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
        false
    }
    fn state(&self) -> HostState {
        self.state
    }
}

#[async_trait]
impl OnlineHostInterface for DockerHost {
    async fn execute_command(
        &self,
        cmd: &[&str],
        options: ExecuteCommandOptions<'_>,
    ) -> Result<ExecuteCommandResult, MngError> {
        let mut ssh_args = vec![
            "-p".to_string(),
            self.ssh_port.to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            self.ssh_target(),
        ];
        if let Some(cwd) = options.cwd {
            ssh_args.push(format!("cd {} &&", cwd.display()));
        }
        ssh_args.push(cmd.join(" "));

        let output = Command::new("ssh")
            .args(&ssh_args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| MngError::ProcessSetup {
                command: format!("ssh {}", ssh_args.join(" ")),
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

        let mut child = Command::new("ssh")
            .args([
                "-p",
                &self.ssh_port.to_string(),
                "-o",
                "StrictHostKeyChecking=no",
                &self.ssh_target(),
                &format!("cat > {}", path.display()),
            ])
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
            user: DEFAULT_SSH_USER.to_string(),
            hostname: "localhost".to_string(),
            port: self.ssh_port,
            identity_file: None,
        })
    }
}

pub struct DockerProvider {
    image: String,
    host_dir_root: PathBuf,
}

impl DockerProvider {
    pub fn new(image: impl Into<String>, host_dir_root: PathBuf) -> Self {
        Self {
            image: image.into(),
            host_dir_root,
        }
    }

    fn host_dir_for(&self, host_id: &HostId) -> PathBuf {
        self.host_dir_root.join(host_id.as_str())
    }

    async fn inspect(&self, container_id: &str) -> Result<serde_json::Value, MngError> {
        let raw = run_docker(&["inspect", container_id]).await?;
        let mut parsed: Vec<serde_json::Value> = serde_json::from_str(&raw)
            .map_err(|e| MngError::Other(anyhow::anyhow!("parse docker inspect output: {e}")))?;
        parsed.pop().ok_or_else(|| MngError::NotFound {
            kind: "host",
            id: container_id.to_string(),
        })
    }

    fn to_docker_host(&self, inspect: &serde_json::Value) -> Result<DockerHost, MngError> {
        let labels = &inspect["Config"]["Labels"];
        let host_id = labels[LABEL_HOST_ID]
            .as_str()
            .ok_or_else(|| MngError::Other(anyhow::anyhow!("container missing {LABEL_HOST_ID} label")))?;
        let host_name = labels[LABEL_HOST_NAME].as_str().unwrap_or(host_id).to_string();
        let container_id = inspect["Id"]
            .as_str()
            .ok_or_else(|| MngError::Other(anyhow::anyhow!("inspect missing Id")))?
            .to_string();
        let running = inspect["State"]["Running"].as_bool().unwrap_or(false);
        let ssh_port = inspect["NetworkSettings"]["Ports"]["22/tcp"][0]["HostPort"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .unwrap_or(22);

        let id = HostId::from(host_id.to_string());
        Ok(DockerHost {
            host_dir: self.host_dir_for(&id),
            id,
            name: host_name,
            container_id,
            ssh_port,
            state: if running { HostState::Running } else { HostState::Stopped },
        })
    }
}

#[async_trait]
impl ProviderBackend for DockerProvider {
    fn name(&self) -> &str {
        "docker"
    }

    fn supports_mutable_tags(&self) -> bool {
        true
    }

    async fn create_host(&self, name: &str, options: CreateHostOptions) -> Result<Host, MngError> {
        let host_id = HostId::new();
        let image = options.image.unwrap_or_else(|| self.image.clone());
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "-P".to_string(),
            "--label".to_string(),
            format!("{LABEL_PROVIDER}=docker"),
            "--label".to_string(),
            format!("{LABEL_HOST_ID}={}", host_id.as_str()),
            "--label".to_string(),
            format!("{LABEL_HOST_NAME}={name}"),
        ];
        for (k, v) in &options.tags {
            args.push("--label".to_string());
            args.push(format!("{k}={v}"));
        }
        args.push(image);
        args.extend(options.start_args);

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let container_id = run_docker(&arg_refs).await?;

        let host_dir = self.host_dir_for(&host_id);
        let data = CertifiedHostData::new(host_id.clone(), name);
        data.write(&host_dir).await?;

        let inspect = self.inspect(&container_id).await?;
        Ok(Host::Online(std::sync::Arc::new(self.to_docker_host(&inspect)?)))
    }

    async fn start_host(&self, id_or_name: &str, _snapshot: Option<&crate::primitives::SnapshotId>) -> Result<Host, MngError> {
        run_docker(&["start", id_or_name]).await?;
        self.get_host(id_or_name).await
    }

    async fn stop_host(&self, id_or_name: &str, _create_snapshot: bool) -> Result<(), MngError> {
        run_docker(&["stop", id_or_name]).await.map(|_| ())
    }

    async fn destroy_host(&self, id_or_name: &str, _delete_snapshots: bool) -> Result<(), MngError> {
        run_docker(&["rm", "-f", id_or_name]).await.map(|_| ())
    }

    async fn get_host(&self, id_or_name: &str) -> Result<Host, MngError> {
        let inspect = self.inspect(id_or_name).await?;
        Ok(Host::Online(std::sync::Arc::new(self.to_docker_host(&inspect)?)))
    }

    async fn list_hosts(&self, include_destroyed: bool) -> Result<Vec<Host>, MngError> {
        let mut args = vec!["ps".to_string(), "-q".to_string(), "--filter".to_string(), format!("label={LABEL_PROVIDER}=docker")];
        if include_destroyed {
            args.push("-a".to_string());
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let ids = run_docker(&arg_refs).await?;
        let mut hosts = Vec::new();
        for id in ids.lines().filter(|l| !l.is_empty()) {
            let inspect = self.inspect(id).await?;
            hosts.push(Host::Online(std::sync::Arc::new(self.to_docker_host(&inspect)?)));
        }
        Ok(hosts)
    }

    async fn set_host_tags(&self, host_id: &HostId, tags: Vec<(String, String)>) -> Result<(), MngError> {
        // `docker` has no in-place label mutation; record supplementary tags
        // alongside the certified data rather than the container itself.
        let host_dir = self.host_dir_for(host_id);
        if CertifiedHostData::read(&host_dir).await?.is_none() {
            return Err(MngError::NotFound {
                kind: "host",
                id: host_id.as_str().to_string(),
            });
        }
        let tags: std::collections::BTreeMap<String, String> = tags.into_iter().collect();
        crate::hoststore::write_json_atomic(&host_dir.join("tags.json"), &tags).await
    }
}
