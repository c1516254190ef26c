//! Lifecycle Engine: `create`/`start`/`stop`/`destroy`/`rename`/`clone`/
//! `migrate`. `create`'s multi-step sequence follows a launcher-style
//! session setup, generalized with a typed rollback (`CreateGuard`)
//! that unwinds exactly what the step sequence actually touched. Work-dir
//! mode `worktree` is grounded directly in `git::worktree`'s
//! validate-or-create path-locked worktree management; `copy_source`
//! reuses the same rsync primitive the Sync Engine uses for
//! `push_files`; `clone` uses `GitCli::clone_repo`.

mod guard;
mod workdir;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::agent::tmux::TmuxClient;
use crate::agent::{self, AgentRecord, ReadinessCondition};
use crate::errors::MngError;
use crate::git::worktree::WorktreeManager;
use crate::host::Host;
use crate::hoststore::CertifiedHostData;
use crate::plugins::PluginRegistry;
use crate::primitives::{AgentLifecycleState, AgentName, HostRef};
use crate::providers::{CreateHostOptions, ProviderBackend};

use guard::CreateGuard;
pub use workdir::WorkDirSource;

/// Everything `create` needs beyond the name/type/command triple.
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub start_on_boot: bool,
    /// Environment variables to write into the agent's `env` file, from
    /// `--pass-env`, `--env-file`, and `--env K=V` combined by the caller.
    pub env: BTreeMap<String, String>,
    pub await_ready: bool,
    pub ready_timeout: Duration,
    pub ready_poll_interval: Duration,
    /// Whether the caller intends to attach after creation; the engine
    /// itself never blocks on a terminal attach, it only reports that the
    /// session is ready to be attached to.
    pub connect: bool,
    pub host_create_options: CreateHostOptions,
}

impl CreateOptions {
    pub fn new() -> Self {
        Self {
            ready_timeout: Duration::from_secs(60),
            ready_poll_interval: Duration::from_millis(500),
            ..Default::default()
        }
    }
}

pub struct CreateRequest {
    pub name: AgentName,
    pub agent_type: String,
    pub command: String,
    pub provider: Arc<dyn ProviderBackend>,
    pub host_name: String,
    pub work_dir_source: WorkDirSource,
    pub options: CreateOptions,
}

pub struct CreateOutcome {
    pub agent: AgentRecord,
    pub host: Host,
    pub session_name: String,
    /// Set once the readiness condition was confirmed; `false` if
    /// `await_ready` was not requested.
    pub ready: bool,
}

/// The Lifecycle Engine: owns no state of its own beyond its collaborators
/// (tmux control, the plugin registry, worktree management) and the
/// process-wide session prefix. One instance is constructed per `main`
/// invocation and threaded through every lifecycle command.
pub struct LifecycleEngine {
    tmux: Arc<dyn TmuxClient>,
    prefix: String,
    registry: Arc<PluginRegistry>,
    worktrees: WorktreeManager,
}

impl LifecycleEngine {
    pub fn new(
        tmux: Arc<dyn TmuxClient>,
        prefix: impl Into<String>,
        registry: Arc<PluginRegistry>,
        worktrees: WorktreeManager,
    ) -> Self {
        Self {
            tmux,
            prefix: prefix.into(),
            registry,
            worktrees,
        }
    }

    fn session_name(&self, agent_name: &str) -> String {
        agent::session_name(&self.prefix, agent_name)
    }

    /// Get an already-running host by name, or create it via the provider
    /// if it does not exist yet.
    async fn ensure_host_started(
        &self,
        provider: &Arc<dyn ProviderBackend>,
        host_name: &str,
        options: CreateHostOptions,
    ) -> Result<Host, MngError> {
        match provider.get_host(host_name).await {
            Ok(host) => Ok(host),
            Err(MngError::NotFound { .. }) => provider.create_host(host_name, options).await,
            Err(e) => Err(e),
        }
    }

    fn readiness_condition(&self, agent_type: &str) -> Result<ReadinessCondition, MngError> {
        let spec = self.registry.agent_type(agent_type).ok_or_else(|| {
            MngError::UserInput(format!("unknown agent type '{agent_type}'"))
        })?;
        ReadinessCondition::new(&spec.ready_patterns, &spec.dialog_patterns)
            .map_err(|e| MngError::Other(anyhow::anyhow!("invalid readiness patterns: {e}")))
    }

    /// **`create`**: validate the name, resolve or create
    /// the host, prepare the work directory, persist the record, provision
    /// every plugin hook, start the tmux session, and optionally wait for
    /// readiness. Any failure past host resolution unwinds everything the
    /// guard has accumulated so far.
    #[instrument(skip(self, request, cancel), fields(name = %request.name))]
    pub async fn create(
        &self,
        request: CreateRequest,
        cancel: &CancellationToken,
    ) -> Result<CreateOutcome, MngError> {
        let CreateRequest {
            name,
            agent_type,
            command,
            provider,
            host_name,
            work_dir_source,
            options,
        } = request;

        // Agent-type must be registered before anything else is touched;
        // an unknown type is a UserInput error, not a provisioning failure.
        let readiness = self.readiness_condition(&agent_type)?;

        // Step 2: resolve or create the host.
        let provider_name = provider.name().to_string();
        let host = self
            .ensure_host_started(&provider, &host_name, options.host_create_options.clone())
            .await?;
        let agents_root = host.agents_dir();

        // Step 1 (validated once the host is known): name must be unused
        // on this host.
        let host_lock = host.lock_cooperatively().await?;
        if AgentRecord::list(&agents_root)
            .await?
            .iter()
            .any(|a| a.name == name)
        {
            drop(host_lock);
            return Err(MngError::PreconditionFailed(format!(
                "agent '{name}' already exists on host '{host_name}'"
            )));
        }

        let mut guard = CreateGuard::new(host.host_dir().to_path_buf());
        let result = self
            .create_inner(
                &host,
                &agents_root,
                name,
                agent_type,
                provider_name,
                command,
                work_dir_source,
                options,
                &readiness,
                &mut guard,
                cancel,
            )
            .await;

        match result {
            Ok(outcome) => {
                guard.disarm();
                drop(host_lock);
                Ok(outcome)
            }
            Err(e) => {
                warn!(error = %e, "create failed, rolling back partial state");
                guard.rollback(self.tmux.as_ref(), &agents_root).await;
                drop(host_lock);
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn create_inner(
        &self,
        host: &Host,
        agents_root: &std::path::Path,
        name: AgentName,
        agent_type: String,
        provider_name: String,
        command: String,
        work_dir_source: WorkDirSource,
        options: CreateOptions,
        readiness: &ReadinessCondition,
        guard: &mut CreateGuard,
        cancel: &CancellationToken,
    ) -> Result<CreateOutcome, MngError> {
        // Step 3: prepare the work directory.
        let prepared = workdir::prepare(
            &work_dir_source,
            host,
            &self.prefix,
            name.as_str(),
            &self.worktrees,
        )
        .await?;
        let work_dir = prepared.path;
        if prepared.owned {
            guard.record_owned_work_dir(work_dir.clone());
        }
        if let Some(mut certified) = CertifiedHostData::read(host.host_dir()).await? {
            certified.add_work_dir(work_dir.clone());
            certified.write(host.host_dir()).await?;
            guard.record_registered_work_dir(work_dir.clone());
        }

        // Step 4: persist the agent record and env file.
        let host_ref = HostRef {
            id: host.id().clone(),
            name: host.get_name().to_string(),
            provider_name,
        };
        let mut record = AgentRecord::new(name.clone(), agent_type.clone(), command.clone(), work_dir.clone(), host_ref);
        record.start_on_boot = options.start_on_boot;
        record.write(agents_root).await?;
        guard.record_agent_written(record.id.clone());
        if !options.env.is_empty() {
            record.write_env(agents_root, &options.env).await?;
        }

        // Step 5: provision every plugin hook, in registration order.
        // Provisioning is required to be idempotent.
        self.registry.provision_all(&record, host).await?;

        // Step 6/7: readiness hooks are installed implicitly by passing
        // `readiness` through to the wait in step 9; `on_agent_created`
        // fires once the session itself is up (step 8): start session,
        // then emit.

        // Step 8: start the tmux session.
        let session = self.session_name(name.as_str());
        self.tmux
            .create_session(&session, &work_dir.display().to_string())
            .map_err(|e| MngError::Other(anyhow::anyhow!("create tmux session {session}: {e}")))?;
        guard.record_session_started(session.clone());
        self.tmux
            .send_keys(&session, &command, true)
            .map_err(|e| MngError::Other(anyhow::anyhow!("send startup command: {e}")))?;

        record.transition_to(AgentLifecycleState::Running)?;
        record.write(agents_root).await?;

        agent::activity::touch(&record.dir(agents_root), crate::primitives::ActivitySource::Create).await?;
        agent::activity::touch(&record.dir(agents_root), crate::primitives::ActivitySource::Start).await?;

        self.registry.emit_agent_created(&record, host).await?;

        // Step 9: optionally wait for readiness.
        let mut ready = false;
        if options.await_ready {
            let tmux = self.tmux.clone();
            let session_for_poll = session.clone();
            agent::wait_for(
                || {
                    let tmux = tmux.clone();
                    let session = session_for_poll.clone();
                    let readiness = readiness.clone();
                    async move {
                        tmux.capture_pane(&session, false)
                            .map(|content| readiness.is_ready(&content))
                            .unwrap_or(false)
                    }
                },
                options.ready_timeout,
                options.ready_poll_interval,
                cancel,
            )
            .await?;
            ready = true;
        }

        info!(agent = %record.id, session = %session, "agent created");

        Ok(CreateOutcome {
            agent: record,
            host: match host {
                Host::Online(h) => Host::Online(h.clone()),
                Host::Offline(_) => {
                    return Err(MngError::Other(anyhow::anyhow!(
                        "host became offline mid-create"
                    )))
                }
            },
            session_name: session,
            ready,
        })
    }

    /// **`start`**: re-launch the tmux session for a `STOPPED` agent,
    /// resending the startup command and reapplying readiness hooks.
    #[instrument(skip(self, agent, agents_root))]
    pub async fn start(
        &self,
        mut agent: AgentRecord,
        agents_root: &std::path::Path,
        work_dir: &std::path::Path,
    ) -> Result<AgentRecord, MngError> {
        agent.transition_to(AgentLifecycleState::Running)?;
        let session = self.session_name(agent.name.as_str());
        if !self.tmux.session_exists(&session).unwrap_or(false) {
            self.tmux
                .create_session(&session, &work_dir.display().to_string())
                .map_err(|e| MngError::Other(anyhow::anyhow!("create tmux session {session}: {e}")))?;
            self.tmux
                .send_keys(&session, &agent.command, true)
                .map_err(|e| MngError::Other(anyhow::anyhow!("send startup command: {e}")))?;
        }
        agent.write(agents_root).await?;
        agent::activity::touch(&agent.dir(agents_root), crate::primitives::ActivitySource::Start).await?;
        Ok(agent)
    }

    /// **`stop`**: kill the tmux session but keep the persisted record and
    /// work-dir. Idempotent: stopping an already-stopped agent (missing
    /// session) succeeds.
    #[instrument(skip(self, agent, agents_root))]
    pub async fn stop(
        &self,
        mut agent: AgentRecord,
        agents_root: &std::path::Path,
        is_dry_run: bool,
    ) -> Result<AgentRecord, MngError> {
        if is_dry_run {
            return Ok(agent);
        }
        let session = self.session_name(agent.name.as_str());
        match self.tmux.kill_session(&session) {
            Ok(()) | Err(crate::agent::TmuxError::SessionNotFound(_)) => {}
            Err(e) => return Err(MngError::Other(anyhow::anyhow!("kill tmux session {session}: {e}"))),
        }
        if agent.state == AgentLifecycleState::Running || agent.state == AgentLifecycleState::Waiting {
            agent.transition_to(AgentLifecycleState::Stopped)?;
            agent.write(agents_root).await?;
        }
        Ok(agent)
    }

    /// **`destroy`**: stop (if running), remove the agent record, delete
    /// the work directory the engine generated for this agent (unless
    /// `no_copy_work_dir` asks to leave it in place), unregister it from
    /// the host's `generated_work_dirs`, and fire `on_agent_destroyed`.
    /// `is_force` only governs whether a missing tmux session is treated
    /// as an error; destroy of an already-gone session always succeeds.
    #[instrument(skip(self, agent, host))]
    pub async fn destroy(
        &self,
        agent: AgentRecord,
        host: &Host,
        agents_root: &std::path::Path,
        is_force: bool,
        no_copy_work_dir: bool,
    ) -> Result<(), MngError> {
        let session = self.session_name(agent.name.as_str());
        match self.tmux.kill_session(&session) {
            Ok(()) | Err(crate::agent::TmuxError::SessionNotFound(_)) => {}
            Err(e) if is_force => {
                warn!(error = %e, session, "forced destroy ignoring tmux error");
            }
            Err(e) => return Err(MngError::Other(anyhow::anyhow!("kill tmux session {session}: {e}"))),
        }

        self.registry.emit_agent_destroyed(&agent, host).await?;

        let dir = agent.dir(agents_root);
        if dir.exists() {
            tokio::fs::remove_dir_all(&dir)
                .await
                .map_err(|e| MngError::Other(anyhow::anyhow!("remove {dir:?}: {e}")))?;
        }

        let certified = CertifiedHostData::read(host.host_dir()).await?;
        let owned = certified
            .as_ref()
            .is_some_and(|c| c.generated_work_dirs.contains(&agent.work_dir));
        if owned && !no_copy_work_dir {
            self.remove_work_dir(&agent.work_dir).await?;
        }

        if let Some(mut certified) = certified {
            certified.remove_work_dir(&agent.work_dir);
            certified.write(host.host_dir()).await?;
        }

        Ok(())
    }

    /// Delete a generated work directory, using `git worktree remove`
    /// when it is a linked worktree so the main repo's worktree metadata
    /// stays consistent, falling back to a plain recursive removal for
    /// copy/clone-mode directories (and if worktree removal itself
    /// fails — matches `git::worktree::WorktreeManager::cleanup_worktree`'s
    /// own fallback chain).
    async fn remove_work_dir(&self, path: &std::path::Path) -> Result<(), MngError> {
        if !path.exists() {
            return Ok(());
        }

        if crate::git::cli::GitCli::is_worktree(path).await.unwrap_or(false) {
            if let Ok(repo_root) = crate::git::cli::GitCli::worktree_repo_root(path).await {
                if repo_root != path {
                    match crate::git::cli::GitCli::remove_worktree(&repo_root, path, true).await {
                        Ok(()) => return Ok(()),
                        Err(e) => {
                            warn!(?path, error = %e, "git worktree remove failed, falling back to rm -rf");
                        }
                    }
                }
            }
        }

        tokio::fs::remove_dir_all(path)
            .await
            .map_err(|e| MngError::Other(anyhow::anyhow!("remove work dir {path:?}: {e}")))
    }

    /// **`rename`**: rename the tmux session and rewrite the persisted
    /// record atomically under the host lock.
    #[instrument(skip(self, agent, agents_root))]
    pub async fn rename(
        &self,
        mut agent: AgentRecord,
        agents_root: &std::path::Path,
        new_name: AgentName,
    ) -> Result<AgentRecord, MngError> {
        if AgentRecord::list(agents_root)
            .await?
            .iter()
            .any(|a| a.name == new_name && a.id != agent.id)
        {
            return Err(MngError::PreconditionFailed(format!(
                "agent '{new_name}' already exists"
            )));
        }

        let old_session = self.session_name(agent.name.as_str());
        let new_session = self.session_name(new_name.as_str());
        if self.tmux.session_exists(&old_session).unwrap_or(false) {
            self.tmux
                .rename_session(&old_session, &new_session)
                .map_err(|e| MngError::Other(anyhow::anyhow!("rename tmux session: {e}")))?;
        }

        agent.name = new_name;
        agent.write(agents_root).await?;
        Ok(agent)
    }

    /// **`clone`**: `create` where the work-dir source is the existing
    /// agent's work directory and unspecified options inherit from it.
    #[instrument(skip(self, source, request, cancel))]
    pub async fn clone_agent(
        &self,
        source: &AgentRecord,
        mut request: CreateRequest,
        cancel: &CancellationToken,
    ) -> Result<CreateOutcome, MngError> {
        if matches!(request.work_dir_source, WorkDirSource::InPlace(ref p) if p.as_os_str().is_empty())
        {
            request.work_dir_source = WorkDirSource::CopySource(source.work_dir.clone());
        }
        self.create(request, cancel).await
    }

    /// **`migrate`**: `clone` then `destroy(source, force=true)`. If the
    /// destroy fails after a successful clone, the error is surfaced but
    /// the clone is kept.
    #[instrument(skip(self, source, source_host, agents_root, request, cancel))]
    pub async fn migrate(
        &self,
        source: AgentRecord,
        source_host: &Host,
        agents_root: &std::path::Path,
        request: CreateRequest,
        cancel: &CancellationToken,
    ) -> Result<CreateOutcome, MngError> {
        let outcome = self.clone_agent(&source, request, cancel).await?;
        self.destroy(source, source_host, agents_root, true, false).await?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::MockTmuxClient;
    use crate::plugins::AgentTypeSpec;
    use crate::providers::LocalProvider;
    use tempfile::TempDir;

    fn registry_with_bash() -> Arc<PluginRegistry> {
        let mut registry = PluginRegistry::new();
        registry.register_agent_type(AgentTypeSpec {
            name: "bash".into(),
            ready_patterns: vec![r"\$\s*$".into()],
            dialog_patterns: vec![],
            default_command: "bash".into(),
        });
        Arc::new(registry)
    }

    fn engine(dir: &std::path::Path) -> (LifecycleEngine, Arc<MockTmuxClient>) {
        let tmux = Arc::new(MockTmuxClient::new());
        let worktrees = WorktreeManager::new(dir.join("worktrees"));
        let engine = LifecycleEngine::new(tmux.clone(), "mng-", registry_with_bash(), worktrees);
        (engine, tmux)
    }

    #[tokio::test]
    async fn create_then_destroy_leaves_no_residue() {
        let dir = TempDir::new().unwrap();
        let (lifecycle, _tmux) = engine(dir.path());
        let provider = Arc::new(LocalProvider::new(dir.path().join("hosts")));
        let work_dir = dir.path().join("work-a1");
        tokio::fs::create_dir_all(&work_dir).await.unwrap();

        let request = CreateRequest {
            name: AgentName::new("a1").unwrap(),
            agent_type: "bash".into(),
            command: "sleep 9999".into(),
            provider: provider.clone(),
            host_name: "localhost".into(),
            work_dir_source: WorkDirSource::InPlace(work_dir.clone()),
            options: CreateOptions::new(),
        };
        let token = CancellationToken::new();
        let outcome = lifecycle.create(request, &token).await.unwrap();
        assert_eq!(outcome.agent.state, AgentLifecycleState::Running);

        let agents_root = outcome.host.agents_dir();
        lifecycle
            .destroy(outcome.agent, &outcome.host, &agents_root, true, false)
            .await
            .unwrap();

        assert!(AgentRecord::list(&agents_root).await.unwrap().is_empty());
        let certified = CertifiedHostData::read(outcome.host.host_dir()).await.unwrap().unwrap();
        assert!(!certified.generated_work_dirs.contains(&work_dir));
        // `InPlace` work dirs are never registered as generated, so destroy
        // must not have deleted the caller's own directory.
        assert!(work_dir.exists());
    }

    #[tokio::test]
    async fn destroy_removes_owned_work_dir() {
        let dir = TempDir::new().unwrap();
        let (lifecycle, _tmux) = engine(dir.path());
        let provider = Arc::new(LocalProvider::new(dir.path().join("hosts")));
        let source = dir.path().join("source");
        tokio::fs::create_dir_all(&source).await.unwrap();

        let request = CreateRequest {
            name: AgentName::new("a1").unwrap(),
            agent_type: "bash".into(),
            command: "sleep 9999".into(),
            provider,
            host_name: "localhost".into(),
            work_dir_source: WorkDirSource::CopySource(source),
            options: CreateOptions::new(),
        };
        let token = CancellationToken::new();
        let outcome = lifecycle.create(request, &token).await.unwrap();
        let work_dir = outcome.agent.work_dir.clone();
        assert!(work_dir.exists());

        let agents_root = outcome.host.agents_dir();
        lifecycle
            .destroy(outcome.agent, &outcome.host, &agents_root, true, false)
            .await
            .unwrap();

        assert!(!work_dir.exists());
    }

    #[tokio::test]
    async fn destroy_with_no_copy_work_dir_keeps_directory() {
        let dir = TempDir::new().unwrap();
        let (lifecycle, _tmux) = engine(dir.path());
        let provider = Arc::new(LocalProvider::new(dir.path().join("hosts")));
        let source = dir.path().join("source");
        tokio::fs::create_dir_all(&source).await.unwrap();

        let request = CreateRequest {
            name: AgentName::new("a1").unwrap(),
            agent_type: "bash".into(),
            command: "sleep 9999".into(),
            provider,
            host_name: "localhost".into(),
            work_dir_source: WorkDirSource::CopySource(source),
            options: CreateOptions::new(),
        };
        let token = CancellationToken::new();
        let outcome = lifecycle.create(request, &token).await.unwrap();
        let work_dir = outcome.agent.work_dir.clone();

        let agents_root = outcome.host.agents_dir();
        lifecycle
            .destroy(outcome.agent, &outcome.host, &agents_root, true, true)
            .await
            .unwrap();

        assert!(work_dir.exists());
        let certified = CertifiedHostData::read(outcome.host.host_dir()).await.unwrap().unwrap();
        assert!(!certified.generated_work_dirs.contains(&work_dir));
    }

    #[tokio::test]
    async fn create_rejects_duplicate_name_on_same_host() {
        let dir = TempDir::new().unwrap();
        let (lifecycle, _tmux) = engine(dir.path());
        let provider = Arc::new(LocalProvider::new(dir.path().join("hosts")));
        let work_dir = dir.path().join("work-a1");
        tokio::fs::create_dir_all(&work_dir).await.unwrap();

        let make_request = || CreateRequest {
            name: AgentName::new("dup").unwrap(),
            agent_type: "bash".into(),
            command: "true".into(),
            provider: provider.clone(),
            host_name: "localhost".into(),
            work_dir_source: WorkDirSource::InPlace(work_dir.clone()),
            options: CreateOptions::new(),
        };
        let token = CancellationToken::new();
        lifecycle.create(make_request(), &token).await.unwrap();
        let result = lifecycle.create(make_request(), &token).await;
        assert!(matches!(result, Err(MngError::PreconditionFailed(_))));
    }

    #[tokio::test]
    async fn unknown_agent_type_is_user_input_error() {
        let dir = TempDir::new().unwrap();
        let (lifecycle, _tmux) = engine(dir.path());
        let provider = Arc::new(LocalProvider::new(dir.path().join("hosts")));

        let request = CreateRequest {
            name: AgentName::new("a1").unwrap(),
            agent_type: "nonexistent".into(),
            command: "true".into(),
            provider,
            host_name: "localhost".into(),
            work_dir_source: WorkDirSource::InPlace(dir.path().to_path_buf()),
            options: CreateOptions::new(),
        };
        let token = CancellationToken::new();
        let result = lifecycle.create(request, &token).await;
        assert!(matches!(result, Err(MngError::UserInput(_))));
    }

    #[tokio::test]
    async fn rename_updates_session_and_record() {
        let dir = TempDir::new().unwrap();
        let (lifecycle, tmux) = engine(dir.path());
        let provider = Arc::new(LocalProvider::new(dir.path().join("hosts")));
        let work_dir = dir.path().join("work-a1");
        tokio::fs::create_dir_all(&work_dir).await.unwrap();

        let request = CreateRequest {
            name: AgentName::new("old-name").unwrap(),
            agent_type: "bash".into(),
            command: "true".into(),
            provider,
            host_name: "localhost".into(),
            work_dir_source: WorkDirSource::InPlace(work_dir),
            options: CreateOptions::new(),
        };
        let token = CancellationToken::new();
        let outcome = lifecycle.create(request, &token).await.unwrap();
        let agents_root = outcome.host.agents_dir();

        let renamed = lifecycle
            .rename(outcome.agent, &agents_root, AgentName::new("new-name").unwrap())
            .await
            .unwrap();

        assert_eq!(renamed.name.as_str(), "new-name");
        assert!(tmux.get_session_working_dir("mng-new-name").is_some());
        assert!(tmux.get_session_working_dir("mng-old-name").is_none());
    }

    #[tokio::test]
    async fn stop_is_idempotent_on_missing_session() {
        let dir = TempDir::new().unwrap();
        let (lifecycle, _tmux) = engine(dir.path());
        let mut agent = AgentRecord::new(
            AgentName::new("ghost").unwrap(),
            "bash",
            "true",
            dir.path().to_path_buf(),
            HostRef {
                id: crate::primitives::HostId::new(),
                name: "localhost".into(),
                provider_name: "local".into(),
            },
        );
        agent.state = AgentLifecycleState::Running;
        agent.write(dir.path()).await.unwrap();

        let stopped = lifecycle.stop(agent, dir.path(), false).await.unwrap();
        assert_eq!(stopped.state, AgentLifecycleState::Stopped);
    }
}
