//! Plugin hook registry: a typed, compile-time-registered sum of
//! interfaces rather than a dynamically discovered plugin system. Each
//! provider backend, agent type, and CLI command is a concrete value
//! registered with a `PluginRegistry` at process startup; hook dispatch
//! iterates the registry in declared order. There is no runtime rebinding
//! and no manifest-file loader — registration happens in `main.rs`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::agent::AgentRecord;
use crate::errors::MngError;
use crate::host::Host;
use crate::providers::ProviderBackend;

/// What a plugin's `get_files_for_deploy` hook returns: a destination path
/// (relative, or `~`-prefixed) mapped to either literal bytes or a source
/// path to copy from. Absolute destinations are rejected by the caller.
#[derive(Debug, Clone)]
pub enum DeployFileSource {
    Bytes(Vec<u8>),
    Path(PathBuf),
}

/// One plugin's hook surface. `provision` runs during `create` in
/// registration order and must be idempotent: repeated `provision` is a
/// no-op. All hooks are optional;
/// default impls are no-ops so a plugin can implement only what it needs.
#[async_trait]
pub trait PluginHook: Send + Sync {
    fn name(&self) -> &str;

    /// Apply this plugin's provisioning to a freshly created agent: upload
    /// files, append/prepend to config, create directories, mutate env.
    async fn provision(&self, _agent: &AgentRecord, _host: &Host) -> Result<(), MngError> {
        Ok(())
    }

    async fn on_agent_created(&self, _agent: &AgentRecord, _host: &Host) -> Result<(), MngError> {
        Ok(())
    }

    async fn on_agent_destroyed(&self, _agent: &AgentRecord, _host: &Host) -> Result<(), MngError> {
        Ok(())
    }

    /// Mutate `params` in place before a command executes, e.g. to inject
    /// a default or enforce a policy.
    fn override_command_options(&self, _command_name: &str, _params: &mut BTreeMap<String, Value>) {}

    /// Files this plugin wants deployed into an agent's work-dir or the
    /// user's config directory. Keys are destinations; callers reject
    /// absolute paths that are not `~`-prefixed.
    fn get_files_for_deploy(
        &self,
        _include_user_settings: bool,
        _include_project_settings: bool,
        _repo_root: &std::path::Path,
    ) -> BTreeMap<String, DeployFileSource> {
        BTreeMap::new()
    }
}

/// One agent-type registration: a name, and the readiness/dialog patterns
/// that drive `agent::readiness::ReadinessCondition` for sessions of this
/// type — these markers are plugin data, never hardcoded in the core.
#[derive(Debug, Clone)]
pub struct AgentTypeSpec {
    pub name: String,
    pub ready_patterns: Vec<String>,
    pub dialog_patterns: Vec<String>,
    pub default_command: String,
}

/// The process-wide registry: provider backends, agent types, and
/// lifecycle hooks, all populated once at startup and never mutated
/// afterward during a command's execution.
pub struct PluginRegistry {
    providers: BTreeMap<String, Arc<dyn ProviderBackend>>,
    agent_types: BTreeMap<String, AgentTypeSpec>,
    hooks: Vec<Arc<dyn PluginHook>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            providers: BTreeMap::new(),
            agent_types: BTreeMap::new(),
            hooks: Vec::new(),
        }
    }

    pub fn register_provider_backend(&mut self, backend: Arc<dyn ProviderBackend>) {
        self.providers.insert(backend.name().to_string(), backend);
    }

    pub fn register_agent_type(&mut self, spec: AgentTypeSpec) {
        self.agent_types.insert(spec.name.clone(), spec);
    }

    pub fn register_hook(&mut self, hook: Arc<dyn PluginHook>) {
        self.hooks.push(hook);
    }

    pub fn provider(&self, name: &str) -> Option<Arc<dyn ProviderBackend>> {
        self.providers.get(name).cloned()
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    pub fn agent_type(&self, name: &str) -> Option<&AgentTypeSpec> {
        self.agent_types.get(name)
    }

    pub fn hooks(&self) -> &[Arc<dyn PluginHook>] {
        &self.hooks
    }

    /// Run every registered hook's `provision`, in registration order.
    pub async fn provision_all(&self, agent: &AgentRecord, host: &Host) -> Result<(), MngError> {
        for hook in &self.hooks {
            hook.provision(agent, host)
                .await
                .map_err(|e| MngError::Plugin {
                    plugin: hook.name().to_string(),
                    message: e.to_string(),
                })?;
        }
        Ok(())
    }

    pub async fn emit_agent_created(&self, agent: &AgentRecord, host: &Host) -> Result<(), MngError> {
        for hook in &self.hooks {
            hook.on_agent_created(agent, host)
                .await
                .map_err(|e| MngError::Plugin {
                    plugin: hook.name().to_string(),
                    message: e.to_string(),
                })?;
        }
        Ok(())
    }

    pub async fn emit_agent_destroyed(&self, agent: &AgentRecord, host: &Host) -> Result<(), MngError> {
        for hook in &self.hooks {
            hook.on_agent_destroyed(agent, host)
                .await
                .map_err(|e| MngError::Plugin {
                    plugin: hook.name().to_string(),
                    message: e.to_string(),
                })?;
        }
        Ok(())
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::LocalProvider;

    #[test]
    fn registers_and_looks_up_provider_by_name() {
        let mut registry = PluginRegistry::new();
        registry.register_provider_backend(Arc::new(LocalProvider::new(PathBuf::from("/tmp/mng"))));
        assert!(registry.provider("local").is_some());
        assert!(registry.provider("docker").is_none());
    }

    #[test]
    fn registers_agent_type() {
        let mut registry = PluginRegistry::new();
        registry.register_agent_type(AgentTypeSpec {
            name: "bash".into(),
            ready_patterns: vec!["\\$\\s*$".into()],
            dialog_patterns: vec![],
            default_command: "bash".into(),
        });
        assert!(registry.agent_type("bash").is_some());
        assert!(registry.agent_type("claude").is_none());
    }

    struct CountingHook {
        provisioned: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl PluginHook for CountingHook {
        fn name(&self) -> &str {
            "counting"
        }

        async fn provision(&self, _agent: &AgentRecord, _host: &Host) -> Result<(), MngError> {
            self.provisioned.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn provision_all_runs_every_hook() {
        use crate::primitives::{AgentName, HostId, HostRef};

        let mut registry = PluginRegistry::new();
        let hook = Arc::new(CountingHook {
            provisioned: std::sync::atomic::AtomicUsize::new(0),
        });
        registry.register_hook(hook.clone());

        let agent = AgentRecord::new(
            AgentName::new("a1").unwrap(),
            "bash",
            "bash",
            PathBuf::from("/work/a1"),
            HostRef {
                id: HostId::new(),
                name: "localhost".into(),
                provider_name: "local".into(),
            },
        );
        let provider = LocalProvider::new(PathBuf::from("/tmp/mng"));
        let host = provider.create_host("localhost", Default::default()).await.unwrap();

        registry.provision_all(&agent, &host).await.unwrap();
        assert_eq!(hook.provisioned.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
