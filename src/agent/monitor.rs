//! Health/idle reconciliation: periodically checks that every `RUNNING`
//! agent's tmux session is still alive (a tmux session is expected to
//! exist iff the agent's state is RUNNING), and on startup reconciles
//! the store against whatever sessions actually exist, marking orphans.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::agent::tmux::TmuxClient;
use crate::errors::MngError;
use crate::primitives::AgentLifecycleState;

use super::record::AgentRecord;

#[derive(Debug, Default)]
pub struct HealthCheckResult {
    pub checked: usize,
    pub alive: usize,
    pub orphaned: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ReconciliationResult {
    /// Agents whose record says RUNNING and whose tmux session still exists.
    pub active: Vec<String>,
    /// Agents whose record says RUNNING but whose tmux session is gone;
    /// demoted to STOPPED.
    pub orphaned: Vec<String>,
    /// Tmux sessions found with our prefix but no matching agent record.
    pub stale_sessions: Vec<String>,
}

pub struct SessionMonitor {
    tmux: Arc<dyn TmuxClient>,
    session_prefix: String,
}

impl SessionMonitor {
    pub fn new(tmux: Arc<dyn TmuxClient>, session_prefix: impl Into<String>) -> Self {
        Self {
            tmux,
            session_prefix: session_prefix.into(),
        }
    }

    fn session_name(&self, agent: &AgentRecord) -> String {
        super::session_name(&self.session_prefix, agent.name.as_str())
    }

    /// Check that every RUNNING agent still has a live tmux session,
    /// demoting orphans to STOPPED in the store.
    pub async fn check_health(&self, agents_root: &Path) -> Result<HealthCheckResult, MngError> {
        let mut result = HealthCheckResult::default();
        let agents = AgentRecord::list(agents_root).await?;

        for mut agent in agents {
            if agent.state != AgentLifecycleState::Running
                && agent.state != AgentLifecycleState::Waiting
            {
                continue;
            }
            result.checked += 1;
            let session = self.session_name(&agent);
            let alive = self.tmux.session_exists(&session).unwrap_or(false);
            if alive {
                result.alive += 1;
            } else {
                warn!(agent = %agent.id, session, "tmux session missing for running agent, demoting to stopped");
                agent.state = AgentLifecycleState::Stopped;
                agent.write(agents_root).await?;
                result.orphaned.push(agent.id.as_str().to_string());
            }
        }

        Ok(result)
    }

    /// Reconcile the store against live tmux sessions on process startup:
    /// agents recorded RUNNING without a session are orphaned; sessions
    /// bearing our prefix without a matching agent record are flagged
    /// stale (candidates for `gc`).
    pub async fn reconcile_on_startup(
        &self,
        agents_root: &Path,
    ) -> Result<ReconciliationResult, MngError> {
        let mut result = ReconciliationResult::default();
        let agents = AgentRecord::list(agents_root).await?;
        let live_sessions = self
            .tmux
            .list_sessions(Some(&self.session_prefix))
            .map_err(|e| MngError::Other(anyhow::anyhow!("list_sessions: {e}")))?;
        let live_names: std::collections::HashSet<String> =
            live_sessions.into_iter().map(|s| s.name).collect();

        let mut known_sessions = std::collections::HashSet::new();
        for mut agent in agents {
            let session = self.session_name(&agent);
            known_sessions.insert(session.clone());
            let should_be_running = matches!(
                agent.state,
                AgentLifecycleState::Running | AgentLifecycleState::Waiting
            );
            if should_be_running && !live_names.contains(&session) {
                agent.state = AgentLifecycleState::Stopped;
                agent.write(agents_root).await?;
                result.orphaned.push(agent.id.as_str().to_string());
            } else if should_be_running {
                result.active.push(agent.id.as_str().to_string());
            }
        }

        for name in live_names {
            if !known_sessions.contains(&name) {
                result.stale_sessions.push(name);
            }
        }

        info!(
            active = result.active.len(),
            orphaned = result.orphaned.len(),
            stale = result.stale_sessions.len(),
            "reconciled agent store against live tmux sessions"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tmux::MockTmuxClient;
    use crate::primitives::{AgentName, HostId, HostRef};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn sample_agent() -> AgentRecord {
        AgentRecord::new(
            AgentName::new("worker-1").unwrap(),
            "claude-code",
            "claude",
            PathBuf::from("/work/worker-1"),
            HostRef {
                id: HostId::new(),
                name: "localhost".into(),
                provider_name: "local".into(),
            },
        )
    }

    #[tokio::test]
    async fn demotes_orphaned_running_agent() {
        let dir = TempDir::new().unwrap();
        let mut agent = sample_agent();
        agent.state = AgentLifecycleState::Running;
        agent.write(dir.path()).await.unwrap();

        let tmux = Arc::new(MockTmuxClient::new());
        let monitor = SessionMonitor::new(tmux, "mng-");
        let result = monitor.check_health(dir.path()).await.unwrap();

        assert_eq!(result.checked, 1);
        assert_eq!(result.orphaned.len(), 1);

        let reloaded = AgentRecord::read(dir.path(), &agent.id).await.unwrap().unwrap();
        assert_eq!(reloaded.state, AgentLifecycleState::Stopped);
    }

    #[tokio::test]
    async fn counts_alive_session_as_healthy() {
        let dir = TempDir::new().unwrap();
        let mut agent = sample_agent();
        agent.state = AgentLifecycleState::Running;
        agent.write(dir.path()).await.unwrap();

        let tmux = Arc::new(MockTmuxClient::new());
        tmux.add_session(&format!("mng-{}", agent.name.as_str()), "/work/worker-1");
        let monitor = SessionMonitor::new(tmux, "mng-");
        let result = monitor.check_health(dir.path()).await.unwrap();

        assert_eq!(result.alive, 1);
        assert!(result.orphaned.is_empty());
    }

    #[tokio::test]
    async fn reconcile_flags_stale_sessions() {
        let dir = TempDir::new().unwrap();
        let tmux = Arc::new(MockTmuxClient::new());
        tmux.add_session("mng-agent-deadbeef", "/work/ghost");
        let monitor = SessionMonitor::new(tmux, "mng-");
        let result = monitor.reconcile_on_startup(dir.path()).await.unwrap();
        assert_eq!(result.stale_sessions, vec!["mng-agent-deadbeef".to_string()]);
    }
}
