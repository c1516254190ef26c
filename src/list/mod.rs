//! List / query: parallel cross-provider agent enumeration with CEL
//! include/exclude filtering, streaming or accumulated.
//!
//! One worker per provider runs inside a `ConcurrencyGroup`, the same
//! fan-out shape used elsewhere in the engine (`gc`, the lifecycle
//! engine's rollback scope). `ABORT` propagates the first failure as
//! soon as a worker hits it; `CONTINUE` records it into
//! `ListResult.errors` and keeps enumerating the rest.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::instrument;

use crate::agent::record::AgentRecord;
use crate::cel::FilterSet;
use crate::concurrency::ConcurrencyGroup;
use crate::errors::MngError;
use crate::primitives::ErrorBehavior;
use crate::providers::ProviderBackend;

/// One failure encountered during a list sweep, tagged with the scope it
/// occurred at (a provider name, or `"<provider>/<host>"`) so a caller
/// with `--json` can render `{provider|host|agent, message, type}`.
#[derive(Debug, Clone)]
pub struct ListErrorEntry {
    pub scope: String,
    pub message: String,
    pub error_type: String,
}

#[derive(Debug, Default)]
pub struct ListResult {
    pub agents: Vec<AgentRecord>,
    pub errors: Vec<ListErrorEntry>,
}

#[derive(Clone)]
pub struct ListRequest {
    pub error_behavior: ErrorBehavior,
    pub filters: Arc<FilterSet>,
    pub group_exit_timeout: Duration,
}

impl Default for ListRequest {
    fn default() -> Self {
        Self {
            error_behavior: ErrorBehavior::Continue,
            filters: Arc::new(FilterSet::everything()),
            group_exit_timeout: Duration::from_secs(30),
        }
    }
}

/// Enumerate agents across every given provider. When `stream` is
/// `Some`, matching agents are also sent to it as they're discovered
/// (send errors, e.g. a dropped receiver, are ignored — streaming is a
/// convenience, not a contract the caller must honor to completion);
/// the returned `ListResult` always carries the full accumulated set
/// regardless of whether a stream was given.
#[instrument(skip(providers, request, stream))]
pub async fn list_agents(
    providers: &[Arc<dyn ProviderBackend>],
    request: &ListRequest,
    stream: Option<mpsc::Sender<AgentRecord>>,
) -> Result<ListResult, MngError> {
    let agents = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(Mutex::new(Vec::new()));
    let group = ConcurrencyGroup::make("list-agents", request.group_exit_timeout);

    for provider in providers {
        let provider_name = provider.name().to_string();
        let provider = Arc::clone(provider);
        let filters = Arc::clone(&request.filters);
        let behavior = request.error_behavior;
        let agents = Arc::clone(&agents);
        let errors = Arc::clone(&errors);
        let stream = stream.clone();
        group
            .start_new_task(
                Some(&provider_name),
                true,
                async move { list_one_provider(provider, filters, behavior, agents, errors, stream).await },
            )
            .await;
    }

    group.join().await.into_result()?;

    Ok(ListResult {
        agents: Arc::try_unwrap(agents)
            .map(Mutex::into_inner)
            .unwrap_or_default(),
        errors: Arc::try_unwrap(errors)
            .map(Mutex::into_inner)
            .unwrap_or_default(),
    })
}

async fn list_one_provider(
    provider: Arc<dyn ProviderBackend>,
    filters: Arc<FilterSet>,
    behavior: ErrorBehavior,
    agents: Arc<Mutex<Vec<AgentRecord>>>,
    errors: Arc<Mutex<Vec<ListErrorEntry>>>,
    stream: Option<mpsc::Sender<AgentRecord>>,
) -> Result<(), MngError> {
    let hosts = match provider.list_hosts(false).await {
        Ok(hosts) => hosts,
        Err(e) => return record_or_raise(behavior, &errors, provider.name().to_string(), "provider", e).await,
    };

    for host in hosts {
        let scope = format!("{}/{}", provider.name(), host.get_name());
        let records = match AgentRecord::list(&host.agents_dir()).await {
            Ok(records) => records,
            Err(e) => {
                record_or_raise(behavior, &errors, scope, "host", e).await?;
                continue;
            }
        };

        for record in records {
            match filters.matches(&record) {
                Ok(true) => {
                    if let Some(tx) = &stream {
                        let _ = tx.send(record.clone()).await;
                    }
                    agents.lock().await.push(record);
                }
                Ok(false) => {}
                Err(e) => {
                    let agent_scope = format!("{scope}/{}", record.name.as_str());
                    record_or_raise(behavior, &errors, agent_scope, "agent", e).await?;
                }
            }
        }
    }

    Ok(())
}

async fn record_or_raise(
    behavior: ErrorBehavior,
    errors: &Mutex<Vec<ListErrorEntry>>,
    scope: String,
    error_type: &str,
    err: MngError,
) -> Result<(), MngError> {
    match behavior {
        ErrorBehavior::Abort => Err(err),
        ErrorBehavior::Continue => {
            errors.lock().await.push(ListErrorEntry {
                scope,
                message: err.to_string(),
                error_type: error_type.to_string(),
            });
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ExecuteCommandOptions, ExecuteCommandResult, Host, HostInterface, OnlineHostInterface};
    use crate::primitives::{AgentName, HostId, HostRef, HostState};
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::Arc as StdArc;
    use tempfile::TempDir;

    struct FakeHost {
        id: HostId,
        name: String,
        dir: PathBuf,
    }

    #[async_trait]
    impl HostInterface for FakeHost {
        fn id(&self) -> &HostId {
            &self.id
        }
        fn get_name(&self) -> &str {
            &self.name
        }
        fn host_dir(&self) -> &Path {
            &self.dir
        }
        fn is_local(&self) -> bool {
            true
        }
        fn state(&self) -> HostState {
            HostState::Running
        }
    }

    #[async_trait]
    impl OnlineHostInterface for FakeHost {
        async fn execute_command(
            &self,
            _cmd: &[&str],
            _options: ExecuteCommandOptions<'_>,
        ) -> Result<ExecuteCommandResult, MngError> {
            unimplemented!("not exercised by list tests")
        }
        async fn read_text_file(&self, _path: &Path) -> Result<String, MngError> {
            unimplemented!()
        }
        async fn write_text_file(&self, _path: &Path, _content: &str, _mode: Option<u32>) -> Result<(), MngError> {
            unimplemented!()
        }
        async fn write_file(&self, _path: &Path, _bytes: &[u8], _mode: Option<u32>) -> Result<(), MngError> {
            unimplemented!()
        }
    }

    struct FakeProvider {
        host_dir: PathBuf,
    }

    #[async_trait]
    impl ProviderBackend for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }
        async fn create_host(
            &self,
            _name: &str,
            _options: crate::providers::CreateHostOptions,
        ) -> Result<Host, MngError> {
            unimplemented!()
        }
        async fn start_host(&self, _id_or_name: &str, _snapshot: Option<&crate::primitives::SnapshotId>) -> Result<Host, MngError> {
            unimplemented!()
        }
        async fn stop_host(&self, _id_or_name: &str, _create_snapshot: bool) -> Result<(), MngError> {
            unimplemented!()
        }
        async fn destroy_host(&self, _id_or_name: &str, _delete_snapshots: bool) -> Result<(), MngError> {
            unimplemented!()
        }
        async fn get_host(&self, _id_or_name: &str) -> Result<Host, MngError> {
            unimplemented!()
        }
        async fn list_hosts(&self, _include_destroyed: bool) -> Result<Vec<Host>, MngError> {
            Ok(vec![Host::Online(StdArc::new(FakeHost {
                id: HostId::new(),
                name: "dev-box".into(),
                dir: self.host_dir.clone(),
            }))])
        }
    }

    fn sample_agent(name: &str) -> AgentRecord {
        AgentRecord::new(
            AgentName::new(name).unwrap(),
            "claude-code",
            "claude",
            PathBuf::from("/work/x"),
            HostRef {
                id: HostId::new(),
                name: "dev-box".into(),
                provider_name: "fake".into(),
            },
        )
    }

    #[tokio::test]
    async fn lists_agents_across_a_single_provider() {
        let dir = TempDir::new().unwrap();
        let agents_dir = dir.path().join("agents");
        sample_agent("a1").write(&agents_dir).await.unwrap();
        sample_agent("a2").write(&agents_dir).await.unwrap();

        let providers: Vec<Arc<dyn ProviderBackend>> = vec![Arc::new(FakeProvider {
            host_dir: dir.path().to_path_buf(),
        })];
        let request = ListRequest::default();
        let result = list_agents(&providers, &request, None).await.unwrap();

        assert_eq!(result.agents.len(), 2);
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn include_filter_narrows_results() {
        let dir = TempDir::new().unwrap();
        let agents_dir = dir.path().join("agents");
        sample_agent("prod-1").write(&agents_dir).await.unwrap();
        sample_agent("staging-1").write(&agents_dir).await.unwrap();

        let providers: Vec<Arc<dyn ProviderBackend>> = vec![Arc::new(FakeProvider {
            host_dir: dir.path().to_path_buf(),
        })];
        let mut request = ListRequest::default();
        request.filters = Arc::new(FilterSet::compile(Some(r#"item.name.startsWith("prod-")"#), None).unwrap());
        let result = list_agents(&providers, &request, None).await.unwrap();

        assert_eq!(result.agents.len(), 1);
        assert_eq!(result.agents[0].name.as_str(), "prod-1");
    }

    #[tokio::test]
    async fn streams_agents_as_they_are_discovered() {
        let dir = TempDir::new().unwrap();
        let agents_dir = dir.path().join("agents");
        sample_agent("a1").write(&agents_dir).await.unwrap();

        let providers: Vec<Arc<dyn ProviderBackend>> = vec![Arc::new(FakeProvider {
            host_dir: dir.path().to_path_buf(),
        })];
        let (tx, mut rx) = mpsc::channel(4);
        let request = ListRequest::default();
        list_agents(&providers, &request, Some(tx)).await.unwrap();

        let streamed = rx.recv().await.unwrap();
        assert_eq!(streamed.name.as_str(), "a1");
    }
}
