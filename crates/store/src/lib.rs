pub mod fs;
pub mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use kiln_models::{BuildError, Snapshot, SnapshotKey};

/// Content-addressed snapshot storage shared by build invocations.
///
/// Keys are content-derived, so two writers racing on the same key are by
/// construction writing identical content; `put_if_absent` keeps whichever
/// copy committed first and the loser adopts it. Implementations must never
/// expose a partially written snapshot to a concurrent reader.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn get(&self, key: &SnapshotKey) -> Result<Option<Snapshot>, BuildError>;

    /// Commits a snapshot under its key, or returns the already-stored copy
    /// when the key exists (first-writer-wins).
    async fn put_if_absent(&self, snapshot: Snapshot) -> Result<Snapshot, BuildError>;

    async fn contains(&self, key: &SnapshotKey) -> Result<bool, BuildError>;
}
