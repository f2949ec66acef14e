use crate::recipe::StartupDirective;
use crate::snapshot::SnapshotKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The built image: the final snapshot plus the recorded startup directive.
/// An `Image` value only exists after finalization succeeded, so holding one
/// implies the directive was validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub image_id: Uuid,
    pub snapshot: SnapshotKey,
    pub startup: StartupDirective,
    pub workdir: String,
    pub created_at: DateTime<Utc>,
}

impl Image {
    pub fn new(snapshot: SnapshotKey, startup: StartupDirective, workdir: impl Into<String>) -> Self {
        Self {
            image_id: Uuid::new_v4(),
            snapshot,
            startup,
            workdir: workdir.into(),
            created_at: Utc::now(),
        }
    }
}

/// Per-step outcome recorded while the pipeline runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub index: usize,
    pub kind: String,
    pub key: SnapshotKey,
    pub cache_hit: bool,
}

/// Terminal and intermediate pipeline states. `Complete` and `FailedAtStep`
/// are terminal; there is no retry or resumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BuildStatus {
    Pending,
    StepApplied { index: usize },
    Complete,
    FailedAtStep { index: usize },
}

/// Result of a successful build invocation: the image handle plus the
/// per-step cache trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub image: Image,
    pub steps: Vec<StepRecord>,
    pub status: BuildStatus,
}
