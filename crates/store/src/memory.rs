use crate::SnapshotStore;
use async_trait::async_trait;
use kiln_models::{BuildError, Snapshot, SnapshotKey};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory snapshot store for tests and throwaway builds.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<HashMap<SnapshotKey, Snapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn get(&self, key: &SnapshotKey) -> Result<Option<Snapshot>, BuildError> {
        Ok(self.inner.read().await.get(key).cloned())
    }

    async fn put_if_absent(&self, snapshot: Snapshot) -> Result<Snapshot, BuildError> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .entry(snapshot.key.clone())
            .or_insert(snapshot);
        Ok(stored.clone())
    }

    async fn contains(&self, key: &SnapshotKey) -> Result<bool, BuildError> {
        Ok(self.inner.read().await.contains_key(key))
    }
}
