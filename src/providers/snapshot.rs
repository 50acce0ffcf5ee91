//! Snapshot stores

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::provider::SnapshotStore;
use crate::types::LiveTimingSnapshot;
use crate::{RaceControlError, Result};

/// Keeps the snapshot in memory. Survives controller restarts, not process restarts.
#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshot: Mutex<Option<LiveTimingSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self) -> Result<Option<LiveTimingSnapshot>> {
        Ok(self.snapshot.lock().clone())
    }

    async fn save(&self, snapshot: &LiveTimingSnapshot) -> Result<()> {
        *self.snapshot.lock() = Some(snapshot.clone());
        Ok(())
    }
}

/// Stores the snapshot as a YAML file.
///
/// Writes go to a sibling temporary file which is then renamed over the
/// target, so a crash mid-write never leaves a truncated snapshot behind.
pub struct YamlSnapshotStore {
    path: PathBuf,
}

impl YamlSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait::async_trait]
impl SnapshotStore for YamlSnapshotStore {
    async fn load(&self) -> Result<Option<LiveTimingSnapshot>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No live timing snapshot on disk");
                return Ok(None);
            }
            Err(e) => return Err(RaceControlError::persistence(&self.path, e)),
        };

        let snapshot = serde_yaml_ng::from_str(&raw)
            .map_err(|e| RaceControlError::persistence(&self.path, e))?;
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &LiveTimingSnapshot) -> Result<()> {
        let yaml = serde_yaml_ng::to_string(snapshot)
            .map_err(|e| RaceControlError::persistence(&self.path, e))?;

        let temp = self.temp_path();
        tokio::fs::write(&temp, yaml).await.map_err(|e| RaceControlError::persistence(&temp, e))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| RaceControlError::persistence(&self.path, e))?;

        info!(
            path = %self.path.display(),
            drivers = snapshot.drivers.len(),
            "Saved live timing snapshot"
        );
        Ok(())
    }
}
