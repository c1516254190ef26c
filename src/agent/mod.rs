//! Agent runtime: the persisted agent record, tmux session control,
//! activity tracking, idle computation, and readiness/dialog detection.

pub mod activity;
pub mod idle;
pub mod monitor;
pub mod readiness;
pub mod record;
pub mod tmux;

pub use monitor::{HealthCheckResult, ReconciliationResult, SessionMonitor};
pub use readiness::{wait_for, DialogDetectedError, ReadinessCondition};
pub use record::AgentRecord;
pub use tmux::{MockTmuxClient, SystemTmuxClient, TmuxClient, TmuxError, MNG_SOCKET};

/// The tmux session name for an agent: `<prefix><agent_name>`,
/// sanitized so the name can never collide with tmux's own `-t` syntax.
/// Two agents on the same host never share a session name because names
/// are unique within a host's scope.
pub fn session_name(prefix: &str, agent_name: &str) -> String {
    format!("{prefix}{}", tmux::sanitize_session_name(agent_name))
}
