//! `CertifiedHostData`: the host-authoritative record a provider stamps
//! into a host's work directory at creation time. It is the source of
//! truth the garbage collector and the data-model invariants check
//! against — a directory under the configured host root with no matching
//! certified data (or a mismatched `host_id`) is never ours to touch.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::MngError;
use crate::hoststore::atomic::write_json_atomic;
use crate::primitives::HostId;

pub const CERTIFIED_DATA_FILE: &str = "data.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CertifiedHostData {
    pub host_id: HostId,
    pub host_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Work directories this host is known to have generated (worktrees,
    /// scratch dirs); the GC only ever removes paths in this set.
    pub generated_work_dirs: BTreeSet<PathBuf>,
}

impl CertifiedHostData {
    pub fn new(host_id: HostId, host_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            host_id,
            host_name: host_name.into(),
            created_at: now,
            updated_at: now,
            generated_work_dirs: BTreeSet::new(),
        }
    }

    pub fn add_work_dir(&mut self, path: PathBuf) {
        self.generated_work_dirs.insert(path);
        self.updated_at = Utc::now();
    }

    pub fn remove_work_dir(&mut self, path: &Path) {
        self.generated_work_dirs.remove(path);
        self.updated_at = Utc::now();
    }

    pub async fn write(&self, host_dir: &Path) -> Result<(), MngError> {
        write_json_atomic(&host_dir.join(CERTIFIED_DATA_FILE), self).await
    }

    pub async fn read(host_dir: &Path) -> Result<Option<Self>, MngError> {
        let path = host_dir.join(CERTIFIED_DATA_FILE);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let data = serde_json::from_slice(&bytes)
                    .map_err(|e| MngError::Other(anyhow::anyhow!("parse {path:?}: {e}")))?;
                Ok(Some(data))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MngError::Other(anyhow::anyhow!("read {path:?}: {e}"))),
        }
    }

    /// Whether `host_id` matches the certified record, i.e. whether a
    /// caller holding `host_id` is certified to manage this directory.
    pub fn certifies(&self, host_id: &HostId) -> bool {
        &self.host_id == host_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn round_trips_through_disk() {
        let dir = TempDir::new().unwrap();
        let mut data = CertifiedHostData::new(HostId::new(), "dev-box");
        data.add_work_dir(PathBuf::from("/tmp/work/agent-1"));
        data.write(dir.path()).await.unwrap();

        let read_back = CertifiedHostData::read(dir.path()).await.unwrap().unwrap();
        assert_eq!(read_back.host_name, "dev-box");
        assert!(read_back
            .generated_work_dirs
            .contains(&PathBuf::from("/tmp/work/agent-1")));
    }

    #[tokio::test]
    async fn missing_file_reads_as_none() {
        let dir = TempDir::new().unwrap();
        assert!(CertifiedHostData::read(dir.path()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn certifies_matches_only_own_host_id() {
        let host_id = HostId::new();
        let data = CertifiedHostData::new(host_id.clone(), "dev-box");
        assert!(data.certifies(&host_id));
        assert!(!data.certifies(&HostId::new()));
    }
}
