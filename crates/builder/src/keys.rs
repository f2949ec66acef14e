use crate::context::ResolvedSource;
use kiln_models::{BuildStep, SnapshotKey};
use sha2::{Digest, Sha256};

/// Versioned so a change to the encoding invalidates old caches instead of
/// silently colliding with them.
const KEY_VERSION: &[u8] = b"kiln-step-key-v1";

/// Deterministic cache key for one build step: SHA-256 over the parent key,
/// the step kind, the step's literal parameters and the content hashes of its
/// resolved inputs. Identical inputs at the same point in the sequence always
/// produce the same key; the parent key transitively encodes everything that
/// came before, so position in the sequence is covered for free.
pub fn step_key(
    parent: &SnapshotKey,
    step: &BuildStep,
    sources: &[ResolvedSource],
) -> SnapshotKey {
    let mut hasher = Sha256::new();
    hasher.update(KEY_VERSION);
    field(&mut hasher, b"parent", parent.as_str().as_bytes());

    match step {
        BuildStep::Workdir { path } => {
            field(&mut hasher, b"kind", b"workdir");
            field(&mut hasher, b"path", path.as_bytes());
        }
        BuildStep::Copy { dest, .. } => {
            field(&mut hasher, b"kind", b"copy");
            field(&mut hasher, b"dest", dest.as_bytes());
            for source in sources {
                field(&mut hasher, b"src", source.declared.as_bytes());
                field(&mut hasher, b"hash", source.content_hash.as_bytes());
            }
        }
        BuildStep::Run { command } => {
            field(&mut hasher, b"kind", b"run");
            field(&mut hasher, b"command", command.as_bytes());
        }
    }

    SnapshotKey::new(format!("{:x}", hasher.finalize()))
}

fn field(hasher: &mut Sha256, label: &[u8], value: &[u8]) {
    hasher.update(label);
    hasher.update((value.len() as u64).to_be_bytes());
    hasher.update(value);
}
