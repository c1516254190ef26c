//! Layered configuration, built as a `config::Config::builder()` chain:
//! embedded defaults, then a project-local file, then a user config-dir
//! file, then an explicit CLI-provided path, then `MNG_*` environment
//! variables — each source overriding the ones before it. Sections cover
//! the host store, session defaults, providers, gc, and logging; there is
//! no `--json-schema` surface on this crate's CLI, so no schema derive is
//! carried on these types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sysinfo::System;

use crate::providers::ssh::SshHostConfig;

fn default_prefix() -> String {
    "mng-".to_string()
}

fn default_destroyed_host_persisted_seconds() -> u64 {
    // 24h default retention window for a destroyed/stopped host.
    86_400
}

fn default_docker_image() -> String {
    "mng/agent-host:latest".to_string()
}

fn default_silence_threshold() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    1800
}

fn default_idle_timeout_duration() -> Duration {
    Duration::from_secs(default_idle_timeout())
}

fn default_max_parallel() -> usize {
    16
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_to_file() -> bool {
    true
}

fn default_ssh_user() -> String {
    "root".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

/// Root configuration, deserialized from the layered `config::Config`
/// builder in [`MngConfig::load`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MngConfig {
    /// Overrides `~/.mng` when set. Mirrors `MNG_HOST_DIR`.
    pub host_dir: Option<PathBuf>,
    /// Base subdirectory name under the host directory; tests set this
    /// for isolation. Mirrors `MNG_ROOT_NAME`.
    pub root_name: Option<String>,
    /// Session-name prefix; all tmux sessions are `<prefix><agent_name>`.
    /// Mirrors `MNG_PREFIX`.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Overrides the shell-completion cache directory. Mirrors
    /// `MNG_COMPLETION_CACHE_DIR`.
    pub completion_cache_dir: Option<PathBuf>,
    pub providers: ProvidersConfig,
    pub agents: AgentsConfig,
    pub gc: GcConfig,
    pub logging: LoggingConfig,
}

impl Default for MngConfig {
    fn default() -> Self {
        Self {
            host_dir: None,
            root_name: None,
            prefix: default_prefix(),
            completion_cache_dir: None,
            providers: ProvidersConfig::default(),
            agents: AgentsConfig::default(),
            gc: GcConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Per-backend provider configuration. Only `docker`/`ssh`/`remote`
/// are config-driven — the local backend needs none (it is always
/// available, always `localhost`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    pub docker: Option<DockerProviderSettings>,
    #[serde(rename = "ssh_host")]
    pub ssh_hosts: Vec<SshHostSettings>,
    #[serde(rename = "remote")]
    pub remotes: Vec<RemoteProviderSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerProviderSettings {
    #[serde(default = "default_docker_image")]
    pub image: String,
    /// Per-provider override of [`GcConfig::destroyed_host_persisted_seconds`].
    pub destroyed_host_persisted_seconds: Option<u64>,
}

impl Default for DockerProviderSettings {
    fn default() -> Self {
        Self {
            image: default_docker_image(),
            destroyed_host_persisted_seconds: None,
        }
    }
}

/// One statically pre-declared SSH host: the ssh provider accepts a
/// config-declared pool; `create_host` is not supported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshHostSettings {
    pub name: String,
    pub hostname: String,
    #[serde(default = "default_ssh_user")]
    pub user: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub identity_file: Option<PathBuf>,
}

impl From<SshHostSettings> for SshHostConfig {
    fn from(settings: SshHostSettings) -> Self {
        SshHostConfig {
            name: settings.name,
            hostname: settings.hostname,
            user: settings.user,
            port: settings.port,
            identity_file: settings.identity_file,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteProviderSettings {
    pub name: String,
    pub base_url: String,
    /// Per-provider override of [`GcConfig::destroyed_host_persisted_seconds`].
    pub destroyed_host_persisted_seconds: Option<u64>,
}

/// Agent runtime defaults: idle detection and concurrency caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    /// Hard ceiling on concurrently-running agent workers, independent of
    /// CPU count; see [`MngConfig::effective_max_agents`].
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    /// CPU cores left unreserved for agent work.
    #[serde(default)]
    pub cores_reserved: usize,
    /// Seconds of tmux silence before `IdleMode::Io` activity is
    /// considered stale (an agent's own pane-content churn counts as
    /// activity; see `agent::idle`).
    #[serde(default = "default_silence_threshold")]
    pub silence_threshold: u64,
    /// Default `idle_timeout` passed to `agent::idle::is_idle` when a
    /// command doesn't override it.
    #[serde(default = "default_idle_timeout_duration", deserialize_with = "crate::duration::deserialize_duration")]
    pub idle_timeout: Duration,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            cores_reserved: 0,
            silence_threshold: default_silence_threshold(),
            idle_timeout: Duration::from_secs(default_idle_timeout()),
        }
    }
}

/// Garbage collector defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GcConfig {
    /// How long a `DESTROYED`/`STOPPED` host persists before it is
    /// eligible for host-retention GC (local hosts are never swept).
    #[serde(default = "default_destroyed_host_persisted_seconds")]
    pub destroyed_host_persisted_seconds: u64,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            destroyed_host_persisted_seconds: default_destroyed_host_persisted_seconds(),
        }
    }
}

/// Logging configuration, mirroring `MNG_LOG_LEVEL`/`MNG_LOG_TO_FILE`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_to_file")]
    pub to_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            to_file: default_log_to_file(),
        }
    }
}

impl MngConfig {
    /// Project-local config file, checked before the user config dir.
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".mng/config.toml")
    }

    /// `~/.config/mng/config.toml` (or the platform equivalent via `dirs`).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("mng").join("config.toml"))
    }

    /// Build the layered configuration: embedded defaults, project file,
    /// user config-dir file, an explicit `config_path` (CLI `--config`),
    /// then `MNG_*` environment variables — last source wins.
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        let defaults = MngConfig::default();
        let defaults_json = serde_json::to_string(&defaults).context("failed to serialize default mng config")?;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(&defaults_json, config::FileFormat::Json));

        let project_config = Self::project_config_path();
        if project_config.exists() {
            builder = builder.add_source(config::File::from(project_config));
        }

        if let Some(user_config) = Self::user_config_path() {
            if user_config.exists() {
                builder = builder.add_source(config::File::from(user_config));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("MNG")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("failed to load mng configuration")?;
        config.try_deserialize().context("failed to deserialize mng configuration")
    }

    /// Write the current configuration to [`Self::project_config_path`],
    /// creating its parent directory if needed.
    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::project_config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("failed to create mng config directory")?;
        }
        let toml_str = toml::to_string_pretty(self).context("failed to serialize mng config to TOML")?;
        std::fs::write(&path, toml_str).context("failed to write mng config file")?;
        Ok(())
    }

    /// Resolve the local host directory: `self.host_dir`, else
    /// `MNG_HOST_DIR`, else `~/.mng`.
    pub fn resolve_host_dir(&self) -> PathBuf {
        if let Some(dir) = &self.host_dir {
            return dir.clone();
        }
        if let Ok(value) = std::env::var("MNG_HOST_DIR") {
            if !value.is_empty() {
                return PathBuf::from(value);
            }
        }
        dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".mng")
    }

    /// Clamp the configured parallelism ceiling to what the host's CPU
    /// count can actually support, always leaving room for at least one
    /// worker.
    pub fn effective_max_agents(&self) -> usize {
        let cpu_count = System::new_all().cpus().len();
        let core_based_max = cpu_count.saturating_sub(self.agents.cores_reserved);
        self.agents.max_parallel.min(core_based_max).max(1)
    }

    /// Per-provider override of `gc.destroyed_host_persisted_seconds`, if
    /// any is configured for `provider_name`.
    pub fn destroyed_host_persisted_seconds_for(&self, provider_name: &str) -> u64 {
        match provider_name {
            "docker" => self
                .providers
                .docker
                .as_ref()
                .and_then(|d| d.destroyed_host_persisted_seconds),
            other => self
                .providers
                .remotes
                .iter()
                .find(|r| r.name == other)
                .and_then(|r| r.destroyed_host_persisted_seconds),
        }
        .unwrap_or(self.gc.destroyed_host_persisted_seconds)
    }

    /// Resolve a relative path against the current working directory, or
    /// return it unchanged if already absolute.
    pub fn resolve_path(path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir().unwrap_or_default().join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = MngConfig::default();
        assert_eq!(config.prefix, "mng-");
        assert_eq!(config.gc.destroyed_host_persisted_seconds, 86_400);
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.to_file);
    }

    #[test]
    fn resolve_host_dir_falls_back_to_home_dot_mng() {
        let config = MngConfig {
            host_dir: None,
            ..MngConfig::default()
        };
        std::env::remove_var("MNG_HOST_DIR");
        let resolved = config.resolve_host_dir();
        assert!(resolved.ends_with(".mng"));
    }

    #[test]
    fn resolve_host_dir_prefers_explicit_field() {
        let config = MngConfig {
            host_dir: Some(PathBuf::from("/srv/mng")),
            ..MngConfig::default()
        };
        assert_eq!(config.resolve_host_dir(), PathBuf::from("/srv/mng"));
    }

    #[test]
    fn effective_max_agents_is_at_least_one() {
        let config = MngConfig {
            agents: AgentsConfig {
                max_parallel: 1,
                cores_reserved: 999,
                ..AgentsConfig::default()
            },
            ..MngConfig::default()
        };
        assert_eq!(config.effective_max_agents(), 1);
    }

    #[test]
    fn per_provider_gc_override_falls_back_to_global_default() {
        let mut config = MngConfig::default();
        assert_eq!(config.destroyed_host_persisted_seconds_for("docker"), 86_400);
        config.providers.docker = Some(DockerProviderSettings {
            image: default_docker_image(),
            destroyed_host_persisted_seconds: Some(3_600),
        });
        assert_eq!(config.destroyed_host_persisted_seconds_for("docker"), 3_600);
        assert_eq!(config.destroyed_host_persisted_seconds_for("some-ssh-pool"), 86_400);
    }

    #[test]
    fn ssh_host_settings_convert_into_provider_config() {
        let settings = SshHostSettings {
            name: "box1".into(),
            hostname: "10.0.0.5".into(),
            user: default_ssh_user(),
            port: default_ssh_port(),
            identity_file: None,
        };
        let converted: SshHostConfig = settings.into();
        assert_eq!(converted.name, "box1");
        assert_eq!(converted.port, 22);
    }
}
