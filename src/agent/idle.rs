//! Idle computation: an agent is idle under a given `IdleMode` once every
//! activity source that mode considers has gone silent for longer than
//! the configured timeout. Pane-content pattern matching lives separately
//! in `agent::readiness` as a secondary, agent-type-specific signal;
//! `IdleMode` mtime comparison is the sole source of truth for idleness.

use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::agent::activity;
use crate::primitives::IdleMode;

/// Whether the agent at `agent_dir` has been idle (under `mode`) for at
/// least `idle_timeout`. An agent with no activity record at all is
/// considered idle (nothing has ever happened).
pub async fn is_idle(agent_dir: &Path, mode: IdleMode, idle_timeout: Duration, now: SystemTime) -> bool {
    match activity::latest_among(agent_dir, mode.sources()).await {
        Some(latest) => now
            .duration_since(latest)
            .map(|elapsed| elapsed >= idle_timeout)
            .unwrap_or(false),
        None => true,
    }
}

/// How long the agent has been idle, or `None` if it is currently active
/// (or has no activity record).
pub async fn idle_duration(agent_dir: &Path, mode: IdleMode, now: SystemTime) -> Option<Duration> {
    let latest = activity::latest_among(agent_dir, mode.sources()).await?;
    now.duration_since(latest).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn no_activity_is_idle() {
        let dir = TempDir::new().unwrap();
        assert!(is_idle(dir.path(), IdleMode::User, Duration::from_secs(60), SystemTime::now()).await);
    }

    #[tokio::test]
    async fn recent_activity_is_not_idle() {
        let dir = TempDir::new().unwrap();
        activity::touch(dir.path(), crate::primitives::ActivitySource::User)
            .await
            .unwrap();
        assert!(
            !is_idle(dir.path(), IdleMode::User, Duration::from_secs(60), SystemTime::now()).await
        );
    }

    #[tokio::test]
    async fn old_activity_past_timeout_is_idle() {
        let dir = TempDir::new().unwrap();
        activity::touch(dir.path(), crate::primitives::ActivitySource::User)
            .await
            .unwrap();
        let future = SystemTime::now() + Duration::from_secs(120);
        assert!(is_idle(dir.path(), IdleMode::User, Duration::from_secs(60), future).await);
    }

    #[tokio::test]
    async fn io_mode_counts_agent_source_user_mode_does_not() {
        let dir = TempDir::new().unwrap();
        activity::touch(dir.path(), crate::primitives::ActivitySource::Agent)
            .await
            .unwrap();
        assert!(is_idle(dir.path(), IdleMode::User, Duration::from_secs(60), SystemTime::now()).await);
        assert!(
            !is_idle(dir.path(), IdleMode::Io, Duration::from_secs(60), SystemTime::now()).await
        );
    }
}
