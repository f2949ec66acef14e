use crate::SnapshotStore;
use async_trait::async_trait;
use kiln_models::{BuildError, FileTree, Snapshot, SnapshotKey};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Persistent snapshot store under a cache root:
///
/// ```text
/// <root>/snapshots/<key>/meta.json   snapshot metadata
/// <root>/snapshots/<key>/fs/         materialized file tree
/// <root>/staging/<uuid>/             in-flight writes
/// ```
///
/// A snapshot is committed by fully writing it into a staging directory and
/// renaming that directory to its final key path. The rename is the commit
/// point: readers either see a complete snapshot directory or none at all,
/// and a cancelled build leaves at most staging garbage, never a half-written
/// snapshot.
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, BuildError> {
        let root = root.into();
        std::fs::create_dir_all(root.join("snapshots"))?;
        std::fs::create_dir_all(root.join("staging"))?;
        Ok(Self { root })
    }

    fn snapshot_dir(&self, key: &SnapshotKey) -> PathBuf {
        self.root.join("snapshots").join(key.as_str())
    }

    fn load(&self, dir: &Path) -> Result<Snapshot, BuildError> {
        let meta = std::fs::read_to_string(dir.join("meta.json"))?;
        let mut snapshot: Snapshot =
            serde_json::from_str(&meta).map_err(|e| BuildError::Store {
                reason: format!("corrupt snapshot metadata in {}: {}", dir.display(), e),
            })?;
        snapshot.tree = FileTree::from_dir(&dir.join("fs"))?;
        Ok(snapshot)
    }
}

#[async_trait]
impl SnapshotStore for FsStore {
    async fn get(&self, key: &SnapshotKey) -> Result<Option<Snapshot>, BuildError> {
        let dir = self.snapshot_dir(key);
        if !dir.join("meta.json").exists() {
            return Ok(None);
        }
        Ok(Some(self.load(&dir)?))
    }

    async fn put_if_absent(&self, snapshot: Snapshot) -> Result<Snapshot, BuildError> {
        let target = self.snapshot_dir(&snapshot.key);
        if target.exists() {
            debug!(key = %snapshot.key.short(), "snapshot already committed, keeping first writer");
            return self.load(&target);
        }

        let staging = self.root.join("staging").join(Uuid::new_v4().to_string());
        std::fs::create_dir_all(&staging)?;
        snapshot.tree.write_to(&staging.join("fs"))?;
        let meta = serde_json::to_string_pretty(&snapshot).map_err(|e| BuildError::Store {
            reason: format!("cannot encode snapshot metadata: {}", e),
        })?;
        std::fs::write(staging.join("meta.json"), meta)?;

        // Commit point. A concurrent build of the same step may have renamed
        // its copy in first; content is identical by construction, so the
        // loser discards its staging copy and adopts the committed one.
        match std::fs::rename(&staging, &target) {
            Ok(()) => Ok(snapshot),
            Err(_) if target.exists() => {
                warn!(key = %snapshot.key.short(), "lost commit race, adopting existing snapshot");
                let _ = std::fs::remove_dir_all(&staging);
                self.load(&target)
            }
            Err(e) => {
                let _ = std::fs::remove_dir_all(&staging);
                Err(BuildError::Io {
                    reason: format!("cannot commit snapshot {}: {}", snapshot.key, e),
                })
            }
        }
    }

    async fn contains(&self, key: &SnapshotKey) -> Result<bool, BuildError> {
        Ok(self.snapshot_dir(key).join("meta.json").exists())
    }
}
