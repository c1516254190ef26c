//! `CreateGuard`: explicit (non-`Drop`) rollback bookkeeping for
//! `LifecycleEngine::create`'s partial-failure contract: remove
//! partial work-dir, remove partial agent record, unregister work-dir from
//! generated list. A `Drop` impl can't `.await`, so rollback is an
//! explicit async method the caller invokes from its error branch instead
//! of an RAII destructor — the engine's `create` always calls either
//! `disarm()` on success or `rollback()` on failure, never both.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::agent::tmux::TmuxClient;
use crate::hoststore::CertifiedHostData;
use crate::primitives::AgentId;

#[derive(Default)]
pub struct CreateGuard {
    host_dir: PathBuf,
    /// Set only when the work directory was generated by this `create`
    /// call (copy/worktree/clone modes); `in_place` work-dirs are the
    /// caller's pre-existing directory and must never be deleted on
    /// rollback.
    owned_work_dir: Option<PathBuf>,
    registered_work_dir: Option<PathBuf>,
    agent_id: Option<AgentId>,
    session_name: Option<String>,
    armed: bool,
}

impl CreateGuard {
    pub fn new(host_dir: PathBuf) -> Self {
        Self {
            host_dir,
            armed: true,
            ..Default::default()
        }
    }

    pub fn record_owned_work_dir(&mut self, path: PathBuf) {
        self.owned_work_dir = Some(path);
    }

    pub fn record_registered_work_dir(&mut self, path: PathBuf) {
        self.registered_work_dir = Some(path);
    }

    pub fn record_agent_written(&mut self, id: AgentId) {
        self.agent_id = Some(id);
    }

    pub fn record_session_started(&mut self, session: String) {
        self.session_name = Some(session);
    }

    /// Mark creation successful; nothing further to clean up.
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// Best-effort teardown of everything recorded so far, in reverse
    /// order of creation. Errors are logged, not propagated: a failure
    /// during rollback must not mask the original failure that triggered
    /// it, and residue is a GC concern if cleanup here is incomplete.
    pub async fn rollback(mut self, tmux: &dyn TmuxClient, agents_root: &Path) {
        if !self.armed {
            return;
        }
        self.armed = false;

        if let Some(session) = &self.session_name {
            if let Err(e) = tmux.kill_session(session) {
                warn!(session, error = %e, "rollback: failed to kill tmux session");
            }
        }

        if let Some(id) = &self.agent_id {
            let dir = agents_root.join(id.as_str());
            if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(?dir, error = %e, "rollback: failed to remove agent directory");
                }
            }
        }

        if let Some(path) = &self.registered_work_dir {
            match CertifiedHostData::read(&self.host_dir).await {
                Ok(Some(mut certified)) => {
                    certified.remove_work_dir(path);
                    if let Err(e) = certified.write(&self.host_dir).await {
                        warn!(error = %e, "rollback: failed to unregister work-dir");
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "rollback: failed to read certified data"),
            }
        }

        if let Some(path) = &self.owned_work_dir {
            if path.exists() {
                if let Err(e) = tokio::fs::remove_dir_all(path).await {
                    warn!(?path, error = %e, "rollback: failed to remove work directory");
                }
            }
        }
    }
}
