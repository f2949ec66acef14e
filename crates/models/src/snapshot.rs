use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::Path;

/// Content-derived identifier of a snapshot. Equal keys mean equal content by
/// construction, which is what makes cache reuse safe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotKey(String);

impl SnapshotKey {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry in a [`FileTree`]. Regular files carry their bytes and unix mode
/// bits; directories exist so empty ones survive materialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileNode {
    File { data: Vec<u8>, mode: u32 },
    Directory,
}

/// Deterministic in-memory filesystem state. Paths are '/'-separated and
/// relative to the image root; the map is sorted so the digest is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileTree {
    entries: BTreeMap<String, FileNode>,
}

impl FileTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&FileNode> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FileNode)> {
        self.entries.iter()
    }

    /// Inserts a regular file, creating parent directory entries as needed.
    /// A later insert at the same path overwrites the earlier one, which is
    /// exactly the layer-ordering semantics copy steps rely on.
    pub fn insert_file(&mut self, path: &str, data: Vec<u8>, mode: u32) {
        self.ensure_parents(path);
        self.entries
            .insert(path.to_string(), FileNode::File { data, mode });
    }

    pub fn insert_dir(&mut self, path: &str) {
        if path.is_empty() {
            return;
        }
        self.ensure_parents(path);
        self.entries
            .entry(path.to_string())
            .or_insert(FileNode::Directory);
    }

    fn ensure_parents(&mut self, path: &str) {
        let mut prefix = String::new();
        let mut components = path.split('/').peekable();
        while let Some(component) = components.next() {
            if components.peek().is_none() {
                break;
            }
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(component);
            self.entries
                .entry(prefix.clone())
                .or_insert(FileNode::Directory);
        }
    }

    /// Content digest of the whole tree: SHA-256 over the sorted entry list
    /// (path, node type, mode, file bytes). Two trees with identical content
    /// always hash identically.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for (path, node) in &self.entries {
            match node {
                FileNode::File { data, mode } => {
                    hasher.update(b"F");
                    hasher.update(path.as_bytes());
                    hasher.update(mode.to_be_bytes());
                    hasher.update((data.len() as u64).to_be_bytes());
                    hasher.update(data);
                }
                FileNode::Directory => {
                    hasher.update(b"D");
                    hasher.update(path.as_bytes());
                }
            }
            hasher.update(b"\x00");
        }
        format!("{:x}", hasher.finalize())
    }

    /// Loads a directory tree from disk into a deterministic `FileTree`.
    pub fn from_dir(root: &Path) -> io::Result<Self> {
        let mut tree = Self::new();
        collect_dir(root, "", &mut tree)?;
        Ok(tree)
    }

    /// Materializes the tree under `root`, creating parent directories and
    /// restoring mode bits where the platform supports them.
    pub fn write_to(&self, root: &Path) -> io::Result<()> {
        std::fs::create_dir_all(root)?;
        for (path, node) in &self.entries {
            let target = root.join(path);
            match node {
                FileNode::Directory => {
                    std::fs::create_dir_all(&target)?;
                }
                FileNode::File { data, mode } => {
                    if let Some(parent) = target.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&target, data)?;
                    #[cfg(unix)]
                    {
                        use std::os::unix::fs::PermissionsExt;
                        std::fs::set_permissions(&target, std::fs::Permissions::from_mode(*mode))?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn collect_dir(dir: &Path, prefix: &str, tree: &mut FileTree) -> io::Result<()> {
    let mut names: Vec<_> = std::fs::read_dir(dir)?
        .collect::<io::Result<Vec<_>>>()?
        .into_iter()
        .map(|e| e.file_name())
        .collect();
    names.sort();

    for name in names {
        let path = dir.join(&name);
        let rel = if prefix.is_empty() {
            name.to_string_lossy().into_owned()
        } else {
            format!("{}/{}", prefix, name.to_string_lossy())
        };
        let metadata = std::fs::symlink_metadata(&path)?;
        if metadata.is_dir() {
            tree.insert_dir(&rel);
            collect_dir(&path, &rel, tree)?;
        } else if metadata.is_file() {
            let data = std::fs::read(&path)?;
            tree.insert_file(&rel, data, file_mode(&metadata));
        }
        // Symlinks and special files are skipped; the invocation context and
        // base catalogs are expected to contain plain files and directories.
    }
    Ok(())
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(_metadata: &std::fs::Metadata) -> u32 {
    0o644
}

/// Joins `path` onto `workdir` and normalizes the result to a tree key:
/// '/'-separated, relative to the image root, `.` and `..` collapsed.
pub fn resolve_path(workdir: &str, path: &str) -> String {
    let joined = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{}/{}", workdir, path)
    };
    let mut parts: Vec<&str> = Vec::new();
    for component in joined.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// An immutable filesystem state produced by one build step (or by base
/// resolution). The snapshot owns the tree it denotes and refers to its
/// parent by key only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub key: SnapshotKey,
    pub parent: Option<SnapshotKey>,
    pub workdir: String,
    pub summary: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub tree: FileTree,
}

impl Snapshot {
    pub fn new(
        key: SnapshotKey,
        parent: Option<SnapshotKey>,
        workdir: impl Into<String>,
        summary: impl Into<String>,
        tree: FileTree,
    ) -> Self {
        Self {
            key,
            parent,
            workdir: workdir.into(),
            summary: summary.into(),
            created_at: Utc::now(),
            tree,
        }
    }
}
