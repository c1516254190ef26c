//! Garbage collector: sweeps orphaned work directories,
//! long-destroyed/stopped hosts, and (per provider) snapshots/volumes
//! matching a CEL predicate.
//!
//! Each sweep follows the same set-difference pattern as session
//! reconciliation: compute what the store says exists against what's
//! actually live, and act on the difference. Here "recorded" is
//! `CertifiedHostData.generated_work_dirs` / the host list, and "live" is
//! current `AgentRecord.work_dir`s / reclaimable host age.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::agent::record::AgentRecord;
use crate::cel::FilterSet;
use crate::errors::MngError;
use crate::host::{ExecuteCommandOptions, Host};
use crate::hoststore::CertifiedHostData;
use crate::primitives::ErrorBehavior;
use crate::providers::{host_state_is_reclaimable, ProviderBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReclaimedKind {
    WorkDir,
    Host,
    Snapshot,
    Volume,
}

/// One resource the sweep removed, or would remove under `dry_run`.
#[derive(Debug, Clone)]
pub struct ReclaimedResource {
    pub kind: ReclaimedKind,
    pub id: String,
    pub detail: String,
}

/// One resource the sweep failed to inspect or remove, recorded rather
/// than propagated when `error_behavior` is `CONTINUE`.
#[derive(Debug, Clone)]
pub struct SweepError {
    pub kind: ReclaimedKind,
    pub id: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub reclaimed: Vec<ReclaimedResource>,
    pub errors: Vec<SweepError>,
}

impl SweepReport {
    fn record(&mut self, kind: ReclaimedKind, id: String, detail: String) {
        self.reclaimed.push(ReclaimedResource { kind, id, detail });
    }

    /// Apply `behavior` to a failure: abort propagates it, continue
    /// records it and lets the sweep carry on to the next resource.
    fn handle_failure(
        &mut self,
        behavior: ErrorBehavior,
        kind: ReclaimedKind,
        id: String,
        err: MngError,
    ) -> Result<(), MngError> {
        match behavior {
            ErrorBehavior::Abort => Err(err),
            ErrorBehavior::Continue => {
                warn!(id, ?kind, %err, "gc: resource failed, continuing sweep");
                self.errors.push(SweepError {
                    kind,
                    id,
                    message: err.to_string(),
                });
                Ok(())
            }
        }
    }
}

/// What to sweep and how. Resource classes are independently toggled so
/// a caller can run `mng gc --work-dirs` without also touching hosts.
#[derive(Debug, Clone)]
pub struct GcRequest {
    pub dry_run: bool,
    pub error_behavior: ErrorBehavior,
    pub sweep_work_dirs: bool,
    pub sweep_hosts: bool,
    pub sweep_snapshots: bool,
    pub sweep_volumes: bool,
    pub snapshot_filter: Arc<FilterSet>,
    pub volume_filter: Arc<FilterSet>,
}

impl Default for GcRequest {
    fn default() -> Self {
        Self {
            dry_run: false,
            error_behavior: ErrorBehavior::Abort,
            sweep_work_dirs: true,
            sweep_hosts: true,
            sweep_snapshots: true,
            sweep_volumes: true,
            snapshot_filter: Arc::new(FilterSet::everything()),
            volume_filter: Arc::new(FilterSet::everything()),
        }
    }
}

/// Run one sweep pass across every host of every given provider.
/// Providers are passed in rather than discovered here, so the
/// collector stays testable against a handful of fake providers without
/// needing the full config-driven provider registry wired up.
pub async fn sweep(
    providers: &[Arc<dyn ProviderBackend>],
    request: &GcRequest,
) -> Result<SweepReport, MngError> {
    let mut report = SweepReport::default();

    for provider in providers {
        let hosts = provider.list_hosts(true).await?;

        if request.sweep_work_dirs {
            for host in &hosts {
                sweep_work_dirs_for_host(host, request, &mut report).await?;
            }
        }

        if request.sweep_snapshots && provider.supports_snapshots() {
            for host in &hosts {
                sweep_snapshots_for_host(provider.as_ref(), host, request, &mut report).await?;
            }
        }

        if request.sweep_volumes && provider.supports_volumes() {
            for host in &hosts {
                sweep_volumes_for_host(provider.as_ref(), host, request, &mut report).await?;
            }
        }

        if request.sweep_hosts {
            sweep_hosts_for_provider(provider.as_ref(), &hosts, request, &mut report).await?;
        }
    }

    info!(
        reclaimed = report.reclaimed.len(),
        errors = report.errors.len(),
        "gc sweep complete"
    );
    Ok(report)
}

/// Remove generated work directories no agent record references any
/// more. Only possible for online hosts, since deletion runs as a
/// command on the host itself (the directory may live on a remote
/// docker/ssh machine, not the local control-plane disk).
async fn sweep_work_dirs_for_host(
    host: &Host,
    request: &GcRequest,
    report: &mut SweepReport,
) -> Result<(), MngError> {
    let Some(certified) = CertifiedHostData::read(host.host_dir()).await? else {
        return Ok(());
    };
    if certified.generated_work_dirs.is_empty() {
        return Ok(());
    }

    let agents = AgentRecord::list(&host.agents_dir()).await?;
    let live: std::collections::BTreeSet<_> = agents.into_iter().map(|a| a.work_dir).collect();
    let orphaned: Vec<_> = certified
        .generated_work_dirs
        .iter()
        .filter(|path| !live.contains(*path))
        .cloned()
        .collect();
    if orphaned.is_empty() {
        return Ok(());
    }

    let online = match host.as_online() {
        Ok(online) => online,
        Err(_) => {
            info!(host = host.get_name(), "gc: host offline, skipping work-dir sweep");
            return Ok(());
        }
    };

    let _lock = host.lock_cooperatively().await?;
    let mut certified = certified;
    for path in orphaned {
        let id = path.display().to_string();
        if request.dry_run {
            report.record(ReclaimedKind::WorkDir, id, format!("would remove {path:?}"));
            continue;
        }
        match remove_remote_path(online, &path).await {
            Ok(()) => {
                certified.remove_work_dir(&path);
                report.record(ReclaimedKind::WorkDir, id, format!("removed {path:?}"));
            }
            Err(e) => report.handle_failure(request.error_behavior, ReclaimedKind::WorkDir, id, e)?,
        }
    }
    if !request.dry_run {
        certified.write(host.host_dir()).await?;
    }
    Ok(())
}

async fn remove_remote_path(
    online: &(dyn crate::host::OnlineHostInterface + '_),
    path: &std::path::Path,
) -> Result<(), MngError> {
    let path_str = path.to_string_lossy().to_string();
    let result = online
        .execute_command(&["rm", "-rf", &path_str], ExecuteCommandOptions::default())
        .await?;
    if !result.success {
        return Err(MngError::Other(anyhow::anyhow!(
            "rm -rf {path_str} failed: {}",
            result.stderr
        )));
    }
    Ok(())
}

/// Destroy hosts that have sat `STOPPED`/`DESTROYED` longer than the
/// provider's retention window. Local hosts are never reclaimed — there
/// is nowhere else for "local" to be.
async fn sweep_hosts_for_provider(
    provider: &dyn ProviderBackend,
    hosts: &[Host],
    request: &GcRequest,
    report: &mut SweepReport,
) -> Result<(), MngError> {
    let threshold = Duration::from_secs(provider.destroyed_host_persisted_seconds());

    for host in hosts {
        if host.is_local() || !host_state_is_reclaimable(host.state()) {
            continue;
        }
        let Some(certified) = CertifiedHostData::read(host.host_dir()).await? else {
            continue;
        };
        let idle = chrono::Utc::now().signed_duration_since(certified.updated_at);
        let idle_duration = idle.to_std().unwrap_or(Duration::ZERO);
        if idle_duration < threshold {
            continue;
        }

        let id = host.id().as_str().to_string();
        let detail = format!(
            "host '{}' idle {}s (threshold {}s)",
            host.get_name(),
            idle.num_seconds(),
            threshold.as_secs()
        );
        if request.dry_run {
            report.record(ReclaimedKind::Host, id, format!("would destroy: {detail}"));
            continue;
        }
        match provider.destroy_host(host.get_name(), true).await {
            Ok(()) => report.record(ReclaimedKind::Host, id, format!("destroyed: {detail}")),
            Err(e) => report.handle_failure(request.error_behavior, ReclaimedKind::Host, id, e)?,
        }
    }
    Ok(())
}

async fn sweep_snapshots_for_host(
    provider: &dyn ProviderBackend,
    host: &Host,
    request: &GcRequest,
    report: &mut SweepReport,
) -> Result<(), MngError> {
    let snapshots = match provider.list_snapshots(host.id()).await {
        Ok(snapshots) => snapshots,
        Err(MngError::PreconditionFailed(_)) => return Ok(()),
        Err(e) => return Err(e),
    };
    for snapshot in snapshots {
        if !request.snapshot_filter.matches(&snapshot)? {
            continue;
        }
        let id = snapshot.id.as_str().to_string();
        if request.dry_run {
            report.record(
                ReclaimedKind::Snapshot,
                id,
                format!("would delete snapshot '{}'", snapshot.name),
            );
            continue;
        }
        match provider.delete_snapshot(&snapshot.id).await {
            Ok(()) => report.record(
                ReclaimedKind::Snapshot,
                id,
                format!("deleted snapshot '{}'", snapshot.name),
            ),
            Err(e) => report.handle_failure(request.error_behavior, ReclaimedKind::Snapshot, id, e)?,
        }
    }
    Ok(())
}

async fn sweep_volumes_for_host(
    provider: &dyn ProviderBackend,
    host: &Host,
    request: &GcRequest,
    report: &mut SweepReport,
) -> Result<(), MngError> {
    let volumes = match provider.list_volumes(host.id()).await {
        Ok(volumes) => volumes,
        Err(MngError::PreconditionFailed(_)) => return Ok(()),
        Err(e) => return Err(e),
    };
    for volume in volumes {
        if !request.volume_filter.matches(&volume)? {
            continue;
        }
        let id = volume.id.as_str().to_string();
        if request.dry_run {
            report.record(
                ReclaimedKind::Volume,
                id,
                format!("would delete volume '{}'", volume.name),
            );
            continue;
        }
        match provider.delete_volume(&volume.id).await {
            Ok(()) => report.record(
                ReclaimedKind::Volume,
                id,
                format!("deleted volume '{}'", volume.name),
            ),
            Err(e) => report.handle_failure(request.error_behavior, ReclaimedKind::Volume, id, e)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{AgentName, HostId, HostRef};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn sample_agent(work_dir: PathBuf, host_id: HostId) -> AgentRecord {
        AgentRecord::new(
            AgentName::new("worker-1").unwrap(),
            "claude-code",
            "claude",
            work_dir,
            HostRef {
                id: host_id,
                name: "dev-box".into(),
                provider_name: "local".into(),
            },
        )
    }

    #[tokio::test]
    async fn sweep_report_records_continue_errors_without_aborting() {
        let mut report = SweepReport::default();
        let behavior = ErrorBehavior::Continue;
        let result = report.handle_failure(
            behavior,
            ReclaimedKind::Host,
            "host-1".into(),
            MngError::PreconditionFailed("boom".into()),
        );
        assert!(result.is_ok());
        assert_eq!(report.errors.len(), 1);
    }

    #[tokio::test]
    async fn sweep_report_aborts_on_abort_behavior() {
        let mut report = SweepReport::default();
        let result = report.handle_failure(
            ErrorBehavior::Abort,
            ReclaimedKind::Host,
            "host-1".into(),
            MngError::PreconditionFailed("boom".into()),
        );
        assert!(result.is_err());
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn certified_work_dirs_minus_live_agents_leaves_only_orphans() {
        let dir = TempDir::new().unwrap();
        let host_id = HostId::new();
        let mut certified = CertifiedHostData::new(host_id.clone(), "dev-box");
        certified.add_work_dir(PathBuf::from("/work/keep"));
        certified.add_work_dir(PathBuf::from("/work/orphan"));
        certified.write(dir.path()).await.unwrap();

        let agents_dir = dir.path().join("agents");
        let agent = sample_agent(PathBuf::from("/work/keep"), host_id);
        agent.write(&agents_dir).await.unwrap();

        let live: std::collections::BTreeSet<_> = AgentRecord::list(&agents_dir)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.work_dir)
            .collect();
        let orphaned: Vec<_> = certified
            .generated_work_dirs
            .iter()
            .filter(|p| !live.contains(*p))
            .collect();
        assert_eq!(orphaned, vec![&PathBuf::from("/work/orphan")]);
    }
}
