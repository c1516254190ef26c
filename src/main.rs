//! `mng` CLI: a thin `clap`-derived shell dispatching into the
//! `mng` library's engine (see `lib.rs`). Subcommands mirror the
//! lifecycle/sync/gc/list operations the library exposes; this file owns
//! no engine logic of its own beyond option parsing, provider/registry
//! wiring, and human-readable output formatting.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use mng::agent::{SystemTmuxClient, TmuxClient, TmuxError};
use mng::cel::FilterSet;
use mng::config::MngConfig;
use mng::duration::parse_duration;
use mng::env_vars::env_vars_by_category;
use mng::errors::MngError;
use mng::gc::{self, GcRequest};
use mng::git::worktree::WorktreeManager;
use mng::host::Host;
use mng::lifecycle::{CreateOptions, CreateRequest, LifecycleEngine, WorkDirSource};
use mng::list::{self, ListRequest};
use mng::logging;
use mng::plugins::{AgentTypeSpec, PluginRegistry};
use mng::primitives::{AgentName, ErrorBehavior, SnapshotId};
use mng::providers::{DockerProvider, LocalProvider, ProviderBackend, RemoteMngProvider, SshProvider};
use mng::sync::{
    pair_files, pull_files, pull_git, push_files, push_git, ConflictPolicy, FileSyncOutcome,
    GitSyncDirection, PairRequest, PushPullRequest, SyncDirection, UncommittedChanges,
};

const MIN_TMUX_MAJOR: u32 = 2;
const MIN_TMUX_MINOR: u32 = 1;

#[derive(Parser)]
#[command(name = "mng")]
#[command(about = "Orchestrate autonomous coding agents across local, Docker, SSH, and remote-mng hosts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to an explicit config file, layered above `.mng/config.toml` and the user config dir.
    #[arg(short, long, global = true)]
    config: Option<String>,
    /// Verbose logging to stderr regardless of `MNG_LOG_LEVEL`.
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new agent session.
    Create {
        name: String,
        /// Registered agent type (see `mng plugin types`).
        #[arg(long, default_value = "bash")]
        r#type: String,
        /// Startup command; defaults to the agent type's `default_command`.
        #[arg(long)]
        command: Option<String>,
        #[arg(long, default_value = "local")]
        provider: String,
        #[arg(long, default_value = "localhost")]
        host: String,
        #[arg(long)]
        in_place: Option<PathBuf>,
        #[arg(long)]
        copy_source: Option<PathBuf>,
        #[arg(long)]
        worktree: Option<PathBuf>,
        #[arg(long, default_value = "main")]
        base_branch: String,
        #[arg(long)]
        clone: Option<String>,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        start_on_boot: bool,
        /// `KEY=VALUE`, repeatable.
        #[arg(long = "env", value_parser = parse_env_kv)]
        env: Vec<(String, String)>,
        /// Forward an already-set environment variable by name.
        #[arg(long = "pass-env")]
        pass_env: Vec<String>,
        #[arg(long)]
        await_ready: bool,
        #[arg(long, value_parser = parse_duration_arg, default_value = "60s")]
        ready_timeout: Duration,
        #[arg(long)]
        connect: bool,
    },
    /// Re-launch a stopped agent's session.
    Start { name: String },
    /// Kill an agent's session, keeping its record and work directory.
    Stop {
        name: String,
        #[arg(long)]
        dry_run: bool,
    },
    /// Remove an agent's session, record, work-dir, and work-dir
    /// registration.
    Destroy {
        name: String,
        #[arg(long)]
        force: bool,
        /// Leave the work directory on disk instead of deleting it.
        #[arg(long)]
        no_copy_work_dir: bool,
    },
    /// List agents across every registered provider.
    List {
        #[arg(long)]
        include: Option<String>,
        #[arg(long)]
        exclude: Option<String>,
        #[arg(long, value_enum, default_value = "continue")]
        on_error: ErrorBehavior,
        #[arg(long)]
        json: bool,
    },
    /// Attach the terminal to an agent's tmux session.
    Connect { name: String },
    /// Create a new agent whose work-dir starts as a copy of an existing one.
    Clone {
        source: String,
        new_name: String,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        host: Option<String>,
    },
    /// Clone an agent onto a new host/provider, then destroy the source.
    Migrate {
        source: String,
        new_name: String,
        #[arg(long, default_value = "local")]
        provider: String,
        #[arg(long, default_value = "localhost")]
        host: String,
    },
    /// Rename an agent and its tmux session.
    Rename { name: String, new_name: String },
    /// Send a line of input to an agent's session.
    Message {
        name: String,
        text: String,
        /// Send even if the pane shows a blocking confirmation dialog.
        #[arg(long)]
        force: bool,
    },
    /// Run a command directly on a host (not inside an agent's session).
    Exec {
        #[arg(long, default_value = "localhost")]
        host: String,
        #[arg(long, default_value = "local")]
        provider: String,
        command: Vec<String>,
    },
    /// Rsync a local directory up to an agent's work-dir.
    Push {
        name: String,
        #[arg(long)]
        local: PathBuf,
        #[arg(long)]
        remote: Option<PathBuf>,
        #[arg(long)]
        delete: bool,
        #[arg(long)]
        dry_run: bool,
        #[arg(long, value_enum, default_value = "fail")]
        uncommitted: UncommittedChanges,
        /// Sync branches via git instead of rsyncing files.
        #[arg(long)]
        git: bool,
        #[arg(long, default_value = "main")]
        branch: String,
        #[arg(long, value_enum, default_value = "fast-forward")]
        direction: GitSyncDirection,
    },
    /// Rsync an agent's work-dir down to a local directory.
    Pull {
        name: String,
        #[arg(long)]
        local: PathBuf,
        #[arg(long)]
        remote: Option<PathBuf>,
        #[arg(long)]
        delete: bool,
        #[arg(long)]
        dry_run: bool,
        #[arg(long, value_enum, default_value = "fail")]
        uncommitted: UncommittedChanges,
        #[arg(long)]
        git: bool,
        #[arg(long, default_value = "main")]
        branch: String,
        #[arg(long, value_enum, default_value = "fast-forward")]
        direction: GitSyncDirection,
    },
    /// Bidirectional reconciliation via unison.
    Pair {
        name: String,
        #[arg(long)]
        local: PathBuf,
        #[arg(long)]
        remote: Option<PathBuf>,
        #[arg(long, value_enum, default_value = "newer")]
        conflict: ConflictPolicy,
        #[arg(long = "direction", value_enum, default_value = "both")]
        sync_direction: SyncDirection,
        #[arg(long)]
        dry_run: bool,
    },
    /// Host snapshot management (providers that support it).
    Snapshot {
        #[command(subcommand)]
        action: SnapshotAction,
    },
    /// Sweep reclaimable work-dirs, hosts, snapshots, and volumes.
    Gc {
        #[arg(long)]
        dry_run: bool,
        #[arg(long, value_enum, default_value = "abort")]
        on_error: ErrorBehavior,
        #[arg(long, default_value_t = true)]
        sweep_work_dirs: bool,
        #[arg(long, default_value_t = true)]
        sweep_hosts: bool,
        #[arg(long, default_value_t = true)]
        sweep_snapshots: bool,
        #[arg(long, default_value_t = true)]
        sweep_volumes: bool,
        #[arg(long)]
        snapshot_include: Option<String>,
        #[arg(long)]
        snapshot_exclude: Option<String>,
        #[arg(long)]
        volume_include: Option<String>,
        #[arg(long)]
        volume_exclude: Option<String>,
    },
    /// Print the active log directory, or the tail of an agent's pane.
    Logs {
        #[arg(long)]
        agent: Option<String>,
        #[arg(long, default_value_t = 200)]
        lines: usize,
    },
    /// Print an agent's work directory (for `cd "$(mng open NAME)"`).
    Open { name: String },
    /// Inspect or write the layered configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Inspect the plugin registry (providers, agent types).
    Plugin {
        #[command(subcommand)]
        action: PluginAction,
    },
    /// Interactive onboarding walkthrough.
    Tutor,
    /// Kanban-style board of agent activity.
    #[command(alias = "kanpan")]
    Pankan,
}

#[derive(Subcommand)]
enum SnapshotAction {
    List {
        #[arg(long, default_value = "local")]
        provider: String,
        host: String,
    },
    Create {
        #[arg(long, default_value = "local")]
        provider: String,
        host: String,
        name: String,
    },
    Delete {
        #[arg(long, default_value = "local")]
        provider: String,
        snapshot_id: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the resolved configuration as TOML.
    Show,
    /// Print the project config file path.
    Path,
    /// Write the current (defaults + overrides) configuration to the project config file.
    Save,
    /// Document every recognized `MNG_*` environment variable.
    Env,
}

#[derive(Subcommand)]
enum PluginAction {
    /// List registered provider backends.
    Providers,
    /// List registered agent types.
    Types,
}

fn parse_env_kv(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))
}

fn parse_duration_arg(s: &str) -> Result<Duration, String> {
    parse_duration(s)
}

/// Every provider backend this registry knows about, in registration order.
fn all_providers(registry: &PluginRegistry) -> Vec<Arc<dyn ProviderBackend>> {
    registry
        .provider_names()
        .into_iter()
        .filter_map(|name| registry.provider(name))
        .collect()
}

fn build_registry(config: &MngConfig, host_dir: &std::path::Path) -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    registry.register_provider_backend(Arc::new(LocalProvider::new(host_dir.to_path_buf())));

    if let Some(docker) = &config.providers.docker {
        registry.register_provider_backend(Arc::new(DockerProvider::new(
            docker.image.clone(),
            host_dir.to_path_buf(),
        )));
    }

    if !config.providers.ssh_hosts.is_empty() {
        let pool = config
            .providers
            .ssh_hosts
            .iter()
            .cloned()
            .map(Into::into)
            .collect();
        registry.register_provider_backend(Arc::new(SshProvider::new(pool, host_dir.to_path_buf())));
    }

    for remote in &config.providers.remotes {
        registry.register_provider_backend(Arc::new(RemoteMngProvider::new(
            remote.name.clone(),
            remote.base_url.clone(),
            host_dir.to_path_buf(),
        )));
    }

    registry.register_agent_type(AgentTypeSpec {
        name: "bash".to_string(),
        ready_patterns: vec![r"\$\s*$".to_string(), r">\s*$".to_string()],
        dialog_patterns: vec![],
        default_command: "bash".to_string(),
    });
    registry.register_agent_type(AgentTypeSpec {
        name: "claude".to_string(),
        ready_patterns: vec![r"^>\s*$".to_string(), r"Human:\s*$".to_string()],
        dialog_patterns: vec![
            r"(?i)do you want to proceed".to_string(),
            r"(?i)allow this (tool|command)".to_string(),
        ],
        default_command: "claude".to_string(),
    });

    registry
}

/// `check_tmux_available`/`print_tmux_error`: every tmux-dependent
/// command gates on this before touching a session, so a missing or
/// too-old tmux fails with an actionable message instead of a raw
/// `TmuxError` bubbling out of the engine.
fn check_tmux_available(tmux: &dyn TmuxClient) -> Result<(), MngError> {
    match tmux.check_available() {
        Ok(version) if version.meets_minimum(MIN_TMUX_MAJOR, MIN_TMUX_MINOR) => Ok(()),
        Ok(version) => {
            print_tmux_error(&TmuxError::VersionTooOld(
                format!("{}.{}", version.major, version.minor),
                format!("{MIN_TMUX_MAJOR}.{MIN_TMUX_MINOR}"),
            ));
            Err(MngError::PreconditionFailed("tmux version too old".into()))
        }
        Err(e) => {
            print_tmux_error(&e);
            Err(MngError::PreconditionFailed("tmux not available".into()))
        }
    }
}

fn print_tmux_error(err: &TmuxError) {
    match err {
        TmuxError::NotInstalled => {
            eprintln!("mng requires tmux, and it wasn't found on PATH.");
            eprintln!("Install it via your platform's package manager, e.g. `apt install tmux` or `brew install tmux`.");
        }
        TmuxError::VersionTooOld(current, required) => {
            eprintln!("mng requires tmux >= {required}, found {current}.");
            eprintln!("Upgrade tmux via your platform's package manager.");
        }
        other => eprintln!("tmux error: {other}"),
    }
}

async fn find_agent(
    providers: &[Arc<dyn ProviderBackend>],
    name: &str,
) -> Result<(mng::agent::AgentRecord, Host, PathBuf), MngError> {
    for provider in providers {
        let hosts = provider.list_hosts(false).await?;
        for host in hosts {
            let agents_root = host.agents_dir();
            let records = mng::agent::AgentRecord::list(&agents_root).await?;
            if let Some(record) = records.into_iter().find(|a| a.name.as_str() == name) {
                return Ok((record, host, agents_root));
            }
        }
    }
    Err(MngError::NotFound {
        kind: "agent",
        id: name.to_string(),
    })
}

fn collect_env(env: &[(String, String)], pass_env: &[String]) -> BTreeMap<String, String> {
    let mut vars: BTreeMap<String, String> = env.iter().cloned().collect();
    for name in pass_env {
        if let Ok(value) = std::env::var(name) {
            vars.insert(name.clone(), value);
        }
    }
    vars
}

fn work_dir_source(
    in_place: Option<PathBuf>,
    copy_source: Option<PathBuf>,
    worktree: Option<PathBuf>,
    base_branch: String,
    clone: Option<String>,
    branch: Option<String>,
) -> Result<WorkDirSource, MngError> {
    match (in_place, copy_source, worktree, clone) {
        (Some(p), None, None, None) => Ok(WorkDirSource::InPlace(p)),
        (None, Some(p), None, None) => Ok(WorkDirSource::CopySource(p)),
        (None, None, Some(repo_path), None) => Ok(WorkDirSource::Worktree {
            repo_path,
            base_branch,
        }),
        (None, None, None, Some(source)) => Ok(WorkDirSource::Clone { source, branch }),
        (None, None, None, None) => Ok(WorkDirSource::InPlace(PathBuf::new())),
        _ => Err(MngError::UserInput(
            "at most one of --in-place, --copy-source, --worktree, --clone may be given".into(),
        )),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = MngConfig::load(cli.config.as_deref())?;
    let _logging = logging::init_logging(&config, command_name(&cli.command), cli.debug)?;

    let host_dir = config.resolve_host_dir();
    tokio::fs::create_dir_all(&host_dir).await?;

    let registry = Arc::new(build_registry(&config, &host_dir));
    let tmux: Arc<dyn TmuxClient> = Arc::new(SystemTmuxClient::new());
    let worktrees = WorktreeManager::new(host_dir.join("worktrees"));
    let engine = LifecycleEngine::new(tmux.clone(), config.prefix.clone(), registry.clone(), worktrees);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    match run(cli.command, &config, registry, tmux, &engine, &cancel).await {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Create { .. } => "create",
        Commands::Start { .. } => "start",
        Commands::Stop { .. } => "stop",
        Commands::Destroy { .. } => "destroy",
        Commands::List { .. } => "list",
        Commands::Connect { .. } => "connect",
        Commands::Clone { .. } => "clone",
        Commands::Migrate { .. } => "migrate",
        Commands::Rename { .. } => "rename",
        Commands::Message { .. } => "message",
        Commands::Exec { .. } => "exec",
        Commands::Push { .. } => "push",
        Commands::Pull { .. } => "pull",
        Commands::Pair { .. } => "pair",
        Commands::Snapshot { .. } => "snapshot",
        Commands::Gc { .. } => "gc",
        Commands::Logs { .. } => "logs",
        Commands::Open { .. } => "open",
        Commands::Config { .. } => "config",
        Commands::Plugin { .. } => "plugin",
        Commands::Tutor => "tutor",
        Commands::Pankan => "pankan",
    }
}

#[allow(clippy::too_many_lines)]
async fn run(
    command: Commands,
    config: &MngConfig,
    registry: Arc<PluginRegistry>,
    tmux: Arc<dyn TmuxClient>,
    engine: &LifecycleEngine,
    cancel: &CancellationToken,
) -> Result<(), MngError> {
    match command {
        Commands::Create {
            name,
            r#type,
            command,
            provider,
            host,
            in_place,
            copy_source,
            worktree,
            base_branch,
            clone,
            branch,
            start_on_boot,
            env,
            pass_env,
            await_ready,
            ready_timeout,
            connect,
        } => {
            check_tmux_available(tmux.as_ref())?;
            let backend = registry
                .provider(&provider)
                .ok_or_else(|| MngError::UserInput(format!("unknown provider '{provider}'")))?;
            let spec = registry
                .agent_type(&r#type)
                .ok_or_else(|| MngError::UserInput(format!("unknown agent type '{}'", r#type)))?;
            let command = command.unwrap_or_else(|| spec.default_command.clone());
            let source = work_dir_source(in_place, copy_source, worktree, base_branch, clone, branch)?;
            let options = CreateOptions {
                start_on_boot,
                env: collect_env(&env, &pass_env),
                await_ready,
                ready_timeout,
                connect,
                ..CreateOptions::new()
            };

            let outcome = engine
                .create(
                    CreateRequest {
                        name: AgentName::new(name).map_err(|e| MngError::UserInput(e.to_string()))?,
                        agent_type: r#type,
                        command,
                        provider: backend,
                        host_name: host,
                        work_dir_source: source,
                        options,
                    },
                    cancel,
                )
                .await?;
            println!("created agent {} (session {})", outcome.agent.id, outcome.session_name);
            if outcome.ready {
                println!("agent is ready");
            }
            if connect {
                tmux.attach_session(&outcome.session_name)
                    .map_err(|e| MngError::Other(anyhow::anyhow!("attach: {e}")))?;
            }
            Ok(())
        }

        Commands::Start { name } => {
            check_tmux_available(tmux.as_ref())?;
            let providers = all_providers(&registry);
            let (agent, _host, agents_root) = find_agent(&providers, &name).await?;
            let work_dir = agent.work_dir.clone();
            let agent = engine.start(agent, &agents_root, &work_dir).await?;
            println!("started agent {} ({:?})", agent.name, agent.state);
            Ok(())
        }

        Commands::Stop { name, dry_run } => {
            check_tmux_available(tmux.as_ref())?;
            let providers = all_providers(&registry);
            let (agent, _host, agents_root) = find_agent(&providers, &name).await?;
            let agent = engine.stop(agent, &agents_root, dry_run).await?;
            println!("stopped agent {} ({:?})", agent.name, agent.state);
            Ok(())
        }

        Commands::Destroy { name, force, no_copy_work_dir } => {
            check_tmux_available(tmux.as_ref())?;
            let providers = all_providers(&registry);
            let (agent, host, agents_root) = find_agent(&providers, &name).await?;
            let agent_name = agent.name.clone();
            engine
                .destroy(agent, &host, &agents_root, force, no_copy_work_dir)
                .await?;
            println!("destroyed agent {agent_name}");
            Ok(())
        }

        Commands::List {
            include,
            exclude,
            on_error,
            json,
        } => {
            let providers = all_providers(&registry);
            let filters = Arc::new(FilterSet::compile(include.as_deref(), exclude.as_deref())?);
            let request = ListRequest {
                error_behavior: on_error,
                filters,
                group_exit_timeout: Duration::from_secs(30),
            };
            let result = list::list_agents(&providers, &request, None).await?;
            if json {
                let body = serde_json::to_string_pretty(&result.agents)
                    .map_err(|e| MngError::Other(anyhow::anyhow!("serialize agent list: {e}")))?;
                println!("{body}");
            } else {
                for agent in &result.agents {
                    println!(
                        "{:<20} {:<10} {:<10} {}",
                        agent.name,
                        agent.agent_type,
                        format!("{:?}", agent.state),
                        agent.host.name
                    );
                }
            }
            for err in &result.errors {
                eprintln!("warning: {} ({}): {}", err.scope, err.error_type, err.message);
            }
            Ok(())
        }

        Commands::Connect { name } => {
            check_tmux_available(tmux.as_ref())?;
            let providers = all_providers(&registry);
            let (agent, _host, _agents_root) = find_agent(&providers, &name).await?;
            let session = mng::agent::session_name(&config.prefix, agent.name.as_str());
            tmux.attach_session(&session)
                .map_err(|e| MngError::Other(anyhow::anyhow!("attach: {e}")))?;
            Ok(())
        }

        Commands::Clone {
            source,
            new_name,
            provider,
            host,
        } => {
            check_tmux_available(tmux.as_ref())?;
            let providers = all_providers(&registry);
            let (source_agent, source_host, _agents_root) = find_agent(&providers, &source).await?;
            let provider_name = provider.unwrap_or_else(|| source_agent.host.provider_name.clone());
            let backend = registry
                .provider(&provider_name)
                .ok_or_else(|| MngError::UserInput(format!("unknown provider '{provider_name}'")))?;
            let host_name = host.unwrap_or_else(|| source_host.get_name().to_string());
            let request = CreateRequest {
                name: AgentName::new(new_name).map_err(|e| MngError::UserInput(e.to_string()))?,
                agent_type: source_agent.agent_type.clone(),
                command: source_agent.command.clone(),
                provider: backend,
                host_name,
                work_dir_source: WorkDirSource::InPlace(PathBuf::new()),
                options: CreateOptions::new(),
            };
            let outcome = engine.clone_agent(&source_agent, request, cancel).await?;
            println!(
                "cloned {} -> {} (session {})",
                source, outcome.agent.name, outcome.session_name
            );
            Ok(())
        }

        Commands::Migrate {
            source,
            new_name,
            provider,
            host,
        } => {
            check_tmux_available(tmux.as_ref())?;
            let providers = all_providers(&registry);
            let (source_agent, source_host, agents_root) = find_agent(&providers, &source).await?;
            let backend = registry
                .provider(&provider)
                .ok_or_else(|| MngError::UserInput(format!("unknown provider '{provider}'")))?;
            let request = CreateRequest {
                name: AgentName::new(new_name).map_err(|e| MngError::UserInput(e.to_string()))?,
                agent_type: source_agent.agent_type.clone(),
                command: source_agent.command.clone(),
                provider: backend,
                host_name: host,
                work_dir_source: WorkDirSource::InPlace(PathBuf::new()),
                options: CreateOptions::new(),
            };
            let outcome = engine
                .migrate(source_agent, &source_host, &agents_root, request, cancel)
                .await?;
            println!("migrated -> {} (session {})", outcome.agent.name, outcome.session_name);
            Ok(())
        }

        Commands::Rename { name, new_name } => {
            check_tmux_available(tmux.as_ref())?;
            let providers = all_providers(&registry);
            let (agent, _host, agents_root) = find_agent(&providers, &name).await?;
            let new_name = AgentName::new(new_name).map_err(|e| MngError::UserInput(e.to_string()))?;
            let agent = engine.rename(agent, &agents_root, new_name).await?;
            println!("renamed -> {}", agent.name);
            Ok(())
        }

        Commands::Message { name, text, force } => {
            check_tmux_available(tmux.as_ref())?;
            let providers = all_providers(&registry);
            let (agent, _host, agents_root) = find_agent(&providers, &name).await?;
            let session = mng::agent::session_name(&config.prefix, agent.name.as_str());
            if !force {
                if let Some(spec) = registry.agent_type(&agent.agent_type) {
                    let readiness =
                        mng::agent::ReadinessCondition::new(&spec.ready_patterns, &spec.dialog_patterns)
                            .map_err(|e| MngError::Other(anyhow::anyhow!("invalid readiness patterns: {e}")))?;
                    let pane = tmux
                        .capture_pane(&session, false)
                        .map_err(|e| MngError::Other(anyhow::anyhow!("capture pane: {e}")))?;
                    if readiness.is_dialog(&pane) {
                        return Err(mng::agent::DialogDetectedError::Blocked.into());
                    }
                }
            }
            tmux.send_keys_safe(&session, &text, true)
                .map_err(|e| MngError::Other(anyhow::anyhow!("send message: {e}")))?;
            mng::agent::activity::touch(&agent.dir(&agents_root), mng::primitives::ActivitySource::User).await?;
            Ok(())
        }

        Commands::Exec {
            host,
            provider,
            command,
        } => {
            if command.is_empty() {
                return Err(MngError::UserInput("exec requires a command".into()));
            }
            let backend = registry
                .provider(&provider)
                .ok_or_else(|| MngError::UserInput(format!("unknown provider '{provider}'")))?;
            let resolved_host = backend.get_host(&host).await?;
            let online = resolved_host.as_online()?;
            let args: Vec<&str> = command.iter().map(String::as_str).collect();
            let result = online
                .execute_command(&args, mng::host::ExecuteCommandOptions::default())
                .await?;
            print!("{}", result.stdout);
            eprint!("{}", result.stderr);
            if !result.success {
                return Err(MngError::Other(anyhow::anyhow!("command exited non-zero")));
            }
            Ok(())
        }

        Commands::Push {
            name,
            local,
            remote,
            delete,
            dry_run,
            uncommitted,
            git,
            branch,
            direction,
        } => {
            let providers = all_providers(&registry);
            let (agent, host, _agents_root) = find_agent(&providers, &name).await?;
            if git {
                push_git(&local, &branch, &agent.work_dir, &branch, direction, uncommitted, false).await?;
                println!("pushed branch {branch} to {name}");
            } else {
                let remote_path = remote.unwrap_or_else(|| agent.work_dir.clone());
                let outcome = push_files(
                    &host,
                    &PushPullRequest {
                        local_path: local,
                        remote_path,
                        is_delete: delete,
                        is_dry_run: dry_run,
                        uncommitted_changes: uncommitted,
                        timeout: Duration::from_secs(300),
                    },
                )
                .await?;
                print_sync_outcome(&outcome);
            }
            Ok(())
        }

        Commands::Pull {
            name,
            local,
            remote,
            delete,
            dry_run,
            uncommitted,
            git,
            branch,
            direction,
        } => {
            let providers = all_providers(&registry);
            let (agent, host, _agents_root) = find_agent(&providers, &name).await?;
            if git {
                pull_git(&agent.work_dir, &branch, &local, &branch, direction, uncommitted).await?;
                println!("pulled branch {branch} from {name}");
            } else {
                let remote_path = remote.unwrap_or_else(|| agent.work_dir.clone());
                let outcome = pull_files(
                    &host,
                    &PushPullRequest {
                        local_path: local,
                        remote_path,
                        is_delete: delete,
                        is_dry_run: dry_run,
                        uncommitted_changes: uncommitted,
                        timeout: Duration::from_secs(300),
                    },
                )
                .await?;
                print_sync_outcome(&outcome);
            }
            Ok(())
        }

        Commands::Pair {
            name,
            local,
            remote,
            conflict,
            sync_direction,
            dry_run,
        } => {
            let providers = all_providers(&registry);
            let (agent, _host, _agents_root) = find_agent(&providers, &name).await?;
            let remote_path = remote.unwrap_or_else(|| agent.work_dir.clone());
            pair_files(&PairRequest {
                source_path: local,
                target_path: remote_path,
                conflict,
                sync_direction,
                is_dry_run: dry_run,
                timeout: Duration::from_secs(300),
            })
            .await?;
            println!("paired with {name}");
            Ok(())
        }

        Commands::Snapshot { action } => run_snapshot(action, &registry).await,

        Commands::Gc {
            dry_run,
            on_error,
            sweep_work_dirs,
            sweep_hosts,
            sweep_snapshots,
            sweep_volumes,
            snapshot_include,
            snapshot_exclude,
            volume_include,
            volume_exclude,
        } => {
            let providers = all_providers(&registry);
            let request = GcRequest {
                dry_run,
                error_behavior: on_error,
                sweep_work_dirs,
                sweep_hosts,
                sweep_snapshots,
                sweep_volumes,
                snapshot_filter: Arc::new(FilterSet::compile(
                    snapshot_include.as_deref(),
                    snapshot_exclude.as_deref(),
                )?),
                volume_filter: Arc::new(FilterSet::compile(
                    volume_include.as_deref(),
                    volume_exclude.as_deref(),
                )?),
            };
            let report = gc::sweep(&providers, &request).await?;
            for r in &report.reclaimed {
                println!(
                    "{}reclaimed {:?} {} ({})",
                    if dry_run { "would have " } else { "" },
                    r.kind,
                    r.id,
                    r.detail
                );
            }
            for e in &report.errors {
                eprintln!("warning: sweep of {:?} {} failed: {}", e.kind, e.id, e.message);
            }
            Ok(())
        }

        Commands::Logs { agent, lines } => {
            if let Some(name) = agent {
                check_tmux_available(tmux.as_ref())?;
                let providers = all_providers(&registry);
                let (record, _host, _agents_root) = find_agent(&providers, &name).await?;
                let session = mng::agent::session_name(&config.prefix, record.name.as_str());
                let content = tmux
                    .capture_pane(&session, false)
                    .map_err(|e| MngError::Other(anyhow::anyhow!("capture pane: {e}")))?;
                let tail: Vec<&str> = content.lines().collect();
                let start = tail.len().saturating_sub(lines);
                for line in &tail[start..] {
                    println!("{line}");
                }
            } else {
                let path = config.resolve_host_dir().join("logs");
                println!("{}", path.display());
            }
            Ok(())
        }

        Commands::Open { name } => {
            let providers = all_providers(&registry);
            let (agent, _host, _agents_root) = find_agent(&providers, &name).await?;
            println!("{}", agent.work_dir.display());
            Ok(())
        }

        Commands::Config { action } => run_config(action, config),

        Commands::Plugin { action } => run_plugin(action, &registry),

        Commands::Tutor => {
            println!("tutor is not available in this build.");
            Ok(())
        }

        Commands::Pankan => {
            println!("the kanban board is not available in this build.");
            Ok(())
        }
    }
}

fn print_sync_outcome(outcome: &FileSyncOutcome) {
    println!(
        "{} file(s), {} byte(s) transferred{}",
        outcome.files_transferred,
        outcome.bytes_transferred,
        if outcome.stashed { " (local changes stashed)" } else { "" }
    );
}

async fn run_snapshot(action: SnapshotAction, registry: &PluginRegistry) -> Result<(), MngError> {
    match action {
        SnapshotAction::List { provider, host } => {
            let backend = registry
                .provider(&provider)
                .ok_or_else(|| MngError::UserInput(format!("unknown provider '{provider}'")))?;
            let resolved = backend.get_host(&host).await?;
            let snapshots = backend.list_snapshots(resolved.id()).await?;
            for s in snapshots {
                println!("{:<20} {} ({})", s.id, s.name, s.created_at);
            }
            Ok(())
        }
        SnapshotAction::Create { provider, host, name } => {
            let backend = registry
                .provider(&provider)
                .ok_or_else(|| MngError::UserInput(format!("unknown provider '{provider}'")))?;
            let resolved = backend.get_host(&host).await?;
            let snapshot = backend.create_snapshot(resolved.id(), &name).await?;
            println!("created snapshot {} ({})", snapshot.id, snapshot.name);
            Ok(())
        }
        SnapshotAction::Delete { provider, snapshot_id } => {
            let backend = registry
                .provider(&provider)
                .ok_or_else(|| MngError::UserInput(format!("unknown provider '{provider}'")))?;
            let id: SnapshotId = snapshot_id.clone().into();
            backend.delete_snapshot(&id).await?;
            println!("deleted snapshot {snapshot_id}");
            Ok(())
        }
    }
}

fn run_config(action: ConfigAction, config: &MngConfig) -> Result<(), MngError> {
    match action {
        ConfigAction::Show => {
            let toml = toml::to_string_pretty(config)
                .map_err(|e| MngError::Other(anyhow::anyhow!("serialize config: {e}")))?;
            println!("{toml}");
            Ok(())
        }
        ConfigAction::Path => {
            println!("{}", MngConfig::project_config_path().display());
            Ok(())
        }
        ConfigAction::Save => {
            config
                .save()
                .map_err(|e| MngError::Other(anyhow::anyhow!("save config: {e}")))?;
            println!("wrote {}", MngConfig::project_config_path().display());
            Ok(())
        }
        ConfigAction::Env => {
            for (category, vars) in env_vars_by_category() {
                println!("{}:", category.display_name());
                for var in vars {
                    println!(
                        "  {:<28} {}{}",
                        var.name,
                        var.description,
                        var.default.map(|d| format!(" (default: {d})")).unwrap_or_default()
                    );
                }
            }
            Ok(())
        }
    }
}

fn run_plugin(action: PluginAction, registry: &PluginRegistry) -> Result<(), MngError> {
    match action {
        PluginAction::Providers => {
            for name in registry.provider_names() {
                println!("{name}");
            }
            Ok(())
        }
        PluginAction::Types => {
            for name in ["bash", "claude"] {
                if let Some(spec) = registry.agent_type(name) {
                    println!("{:<10} default_command={}", spec.name, spec.default_command);
                }
            }
            Ok(())
        }
    }
}
