//! The remote-mng provider: an HTTP client against a peer `mng` instance's
//! own API. Execution is delegated entirely to the peer; this backend just
//! reports whatever state the peer reports, and `RemoteHost` records carry
//! agent data verbatim from the peer's responses rather than re-deriving it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::MngError;
use crate::host::{ExecuteCommandOptions, ExecuteCommandResult, Host, HostInterface, OnlineHostInterface};
use crate::primitives::{HostId, HostState};

use super::{CreateHostOptions, ProviderBackend};

#[derive(Debug, Serialize)]
struct ExecuteCommandRequest<'a> {
    command: &'a [&'a str],
    cwd: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExecuteCommandResponse {
    stdout: String,
    stderr: String,
    success: bool,
}

#[derive(Debug, Deserialize)]
struct PeerHostPayload {
    id: String,
    name: String,
    state: String,
}

fn peer_state(raw: &str) -> HostState {
    match raw {
        "running" => HostState::Running,
        "stopped" => HostState::Stopped,
        "destroyed" => HostState::Destroyed,
        _ => HostState::Stopped,
    }
}

pub struct RemoteHost {
    id: HostId,
    name: String,
    state: HostState,
    host_dir: PathBuf,
    base_url: String,
    client: reqwest::Client,
}

impl HostInterface for RemoteHost {
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
impl OnlineHostInterface for RemoteHost {
    async fn execute_command(
        &self,
        cmd: &[&str],
        options: ExecuteCommandOptions<'_>,
    ) -> Result<ExecuteCommandResult, MngError> {
        let request = ExecuteCommandRequest {
            command: cmd,
            cwd: options.cwd.map(|p| p.display().to_string()),
        };
        let response = self
            .client
            .post(format!("{}/hosts/{}/exec", self.base_url, self.id.as_str()))
            .json(&request)
            .send()
            .await
            .map_err(|e| MngError::ProviderError {
                provider: "remote-mng".into(),
                message: format!("exec request to peer failed: {e}"),
            })?
            .error_for_status()
            .map_err(|e| MngError::ProviderError {
                provider: "remote-mng".into(),
                message: format!("peer returned an error status: {e}"),
            })?
            .json::<ExecuteCommandResponse>()
            .await
            .map_err(|e| MngError::ProviderError {
                provider: "remote-mng".into(),
                message: format!("malformed exec response from peer: {e}"),
            })?;

        Ok(ExecuteCommandResult {
            stdout: response.stdout,
            stderr: response.stderr,
            success: response.success,
        })
    }

    async fn read_text_file(&self, path: &Path) -> Result<String, MngError> {
        self.client
            .get(format!(
                "{}/hosts/{}/files?path={}",
                self.base_url,
                self.id.as_str(),
                path.display()
            ))
            .send()
            .await
            .map_err(|e| MngError::ProviderError {
                provider: "remote-mng".into(),
                message: format!("read_text_file request to peer failed: {e}"),
            })?
            .error_for_status()
            .map_err(|e| MngError::ProviderError {
                provider: "remote-mng".into(),
                message: e.to_string(),
            })?
            .text()
            .await
            .map_err(|e| MngError::ProviderError {
                provider: "remote-mng".into(),
                message: e.to_string(),
            })
    }

    async fn write_text_file(&self, path: &Path, content: &str, mode: Option<u32>) -> Result<(), MngError> {
        self.write_file(path, content.as_bytes(), mode).await
    }

    async fn write_file(&self, path: &Path, bytes: &[u8], mode: Option<u32>) -> Result<(), MngError> {
        self.client
            .put(format!(
                "{}/hosts/{}/files?path={}&mode={}",
                self.base_url,
                self.id.as_str(),
                path.display(),
                mode.unwrap_or(0o644)
            ))
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| MngError::ProviderError {
                provider: "remote-mng".into(),
                message: format!("write_file request to peer failed: {e}"),
            })?
            .error_for_status()
            .map_err(|e| MngError::ProviderError {
                provider: "remote-mng".into(),
                message: e.to_string(),
            })?;
        Ok(())
    }
}

pub struct RemoteMngProvider {
    name: String,
    base_url: String,
    client: reqwest::Client,
    host_dir_root: PathBuf,
}

impl RemoteMngProvider {
    /// `name` is the registry key this backend is looked up under (a
    /// deployment can configure more than one remote peer, so the
    /// backend name must be caller-supplied rather than a fixed
    /// constant).
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, host_dir_root: PathBuf) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client with a fixed timeout builds"),
            host_dir_root,
        }
    }

    fn to_host(&self, payload: PeerHostPayload) -> RemoteHost {
        RemoteHost {
            id: HostId::from(payload.id),
            host_dir: self.host_dir_root.join(&payload.name),
            name: payload.name,
            state: peer_state(&payload.state),
            base_url: self.base_url.clone(),
            client: self.client.clone(),
        }
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, MngError> {
        self.client
            .get(format!("{}{path}", self.base_url))
            .send()
            .await
            .map_err(|e| MngError::ProviderError {
                provider: "remote-mng".into(),
                message: format!("request to peer failed: {e}"),
            })?
            .error_for_status()
            .map_err(|e| MngError::ProviderError {
                provider: "remote-mng".into(),
                message: format!("peer returned an error status: {e}"),
            })
    }
}

#[async_trait]
impl ProviderBackend for RemoteMngProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create_host(&self, name: &str, options: CreateHostOptions) -> Result<Host, MngError> {
        let payload: PeerHostPayload = self
            .client
            .post(format!("{}/hosts", self.base_url))
            .json(&serde_json::json!({ "name": name, "image": options.image, "tags": options.tags }))
            .send()
            .await
            .map_err(|e| MngError::ProviderError {
                provider: "remote-mng".into(),
                message: format!("create_host request to peer failed: {e}"),
            })?
            .error_for_status()
            .map_err(|e| MngError::ProviderError {
                provider: "remote-mng".into(),
                message: e.to_string(),
            })?
            .json()
            .await
            .map_err(|e| MngError::ProviderError {
                provider: "remote-mng".into(),
                message: format!("malformed create_host response from peer: {e}"),
            })?;
        Ok(Host::Online(std::sync::Arc::new(self.to_host(payload))))
    }

    async fn start_host(&self, id_or_name: &str, _snapshot: Option<&crate::primitives::SnapshotId>) -> Result<Host, MngError> {
        let payload: PeerHostPayload = self
            .get(&format!("/hosts/{id_or_name}/start"))
            .await?
            .json()
            .await
            .map_err(|e| MngError::ProviderError {
                provider: "remote-mng".into(),
                message: e.to_string(),
            })?;
        Ok(Host::Online(std::sync::Arc::new(self.to_host(payload))))
    }

    async fn stop_host(&self, id_or_name: &str, create_snapshot: bool) -> Result<(), MngError> {
        self.client
            .post(format!(
                "{}/hosts/{id_or_name}/stop?snapshot={create_snapshot}",
                self.base_url
            ))
            .send()
            .await
            .map_err(|e| MngError::ProviderError {
                provider: "remote-mng".into(),
                message: e.to_string(),
            })?
            .error_for_status()
            .map_err(|e| MngError::ProviderError {
                provider: "remote-mng".into(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn destroy_host(&self, id_or_name: &str, delete_snapshots: bool) -> Result<(), MngError> {
        self.client
            .delete(format!(
                "{}/hosts/{id_or_name}?delete_snapshots={delete_snapshots}",
                self.base_url
            ))
            .send()
            .await
            .map_err(|e| MngError::ProviderError {
                provider: "remote-mng".into(),
                message: e.to_string(),
            })?
            .error_for_status()
            .map_err(|e| MngError::ProviderError {
                provider: "remote-mng".into(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn get_host(&self, id_or_name: &str) -> Result<Host, MngError> {
        let payload: PeerHostPayload = self
            .get(&format!("/hosts/{id_or_name}"))
            .await?
            .json()
            .await
            .map_err(|e| MngError::ProviderError {
                provider: "remote-mng".into(),
                message: e.to_string(),
            })?;
        Ok(Host::Online(std::sync::Arc::new(self.to_host(payload))))
    }

    async fn list_hosts(&self, include_destroyed: bool) -> Result<Vec<Host>, MngError> {
        let payloads: Vec<PeerHostPayload> = self
            .get(&format!("/hosts?include_destroyed={include_destroyed}"))
            .await?
            .json()
            .await
            .map_err(|e| MngError::ProviderError {
                provider: "remote-mng".into(),
                message: e.to_string(),
            })?;
        Ok(payloads
            .into_iter()
            .map(|p| Host::Online(std::sync::Arc::new(self.to_host(p))))
            .collect())
    }
}
