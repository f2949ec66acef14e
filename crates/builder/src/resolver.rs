use kiln_models::{BaseImageRef, BuildError, FileTree, Snapshot, SnapshotKey};
use kiln_store::SnapshotStore;
use std::path::PathBuf;
use tracing::{info, instrument};

/// Resolves a `name:tag` base reference against a local, directory-backed
/// catalog and materializes the root snapshot. The catalog lays bases out as
/// `<catalog>/<name>/<tag>/` containing the base's root filesystem.
pub struct BaseResolver {
    catalog: PathBuf,
}

impl BaseResolver {
    pub fn new(catalog: impl Into<PathBuf>) -> Self {
        Self {
            catalog: catalog.into(),
        }
    }

    /// Produces the root snapshot for `base`, reusing the store copy when the
    /// same base content was resolved before. Every failure here is fatal to
    /// the build; no retry, no partial output.
    #[instrument(skip(self, store), fields(base = %base))]
    pub async fn resolve(
        &self,
        base: &BaseImageRef,
        store: &dyn SnapshotStore,
    ) -> Result<Snapshot, BuildError> {
        let dir = self.catalog.join(&base.name).join(&base.tag);
        if !dir.is_dir() {
            return Err(BuildError::BaseResolution {
                reference: base.to_string(),
                reason: format!("not present in base catalog {}", self.catalog.display()),
            });
        }

        let tree = FileTree::from_dir(&dir).map_err(|e| BuildError::BaseResolution {
            reference: base.to_string(),
            reason: format!("cannot read base filesystem: {}", e),
        })?;
        let digest = tree.digest();

        if let Some(pinned) = &base.digest {
            if pinned != &digest {
                return Err(BuildError::BaseResolution {
                    reference: base.to_string(),
                    reason: format!("digest mismatch: catalog content is sha256:{}", digest),
                });
            }
        }

        let key = SnapshotKey::new(digest);
        if let Some(cached) = store.get(&key).await? {
            info!(key = %key.short(), "base snapshot cache hit");
            return Ok(cached);
        }

        let snapshot = Snapshot::new(key.clone(), None, "/", format!("FROM {}", base), tree);
        let stored = store.put_if_absent(snapshot).await?;
        info!(key = %key.short(), files = stored.tree.len(), "resolved base image");
        Ok(stored)
    }
}
