use kiln_models::{BuildError, FileTree};
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};

/// The invocation context: the source tree copy-step paths resolve against.
#[derive(Debug, Clone)]
pub struct BuildContext {
    root: PathBuf,
}

/// One resolved copy source. `content_hash` feeds the step's cache key, so a
/// change to any source byte invalidates the step without re-reading the
/// recipe.
#[derive(Debug, Clone)]
pub struct ResolvedSource {
    pub declared: String,
    pub content_hash: String,
    pub payload: SourcePayload,
}

#[derive(Debug, Clone)]
pub enum SourcePayload {
    File { data: Vec<u8>, mode: u32 },
    /// Directory sources copy their contents into the destination.
    Tree(FileTree),
}

impl BuildContext {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves every declared source of a copy step. Any missing path fails
    /// the build with the path and step index; paths reaching outside the
    /// context root are treated as missing.
    pub fn resolve_sources(
        &self,
        sources: &[String],
        step_index: usize,
    ) -> Result<Vec<ResolvedSource>, BuildError> {
        sources
            .iter()
            .map(|declared| self.resolve_one(declared, step_index))
            .collect()
    }

    fn resolve_one(&self, declared: &str, step_index: usize) -> Result<ResolvedSource, BuildError> {
        let not_found = || BuildError::SourceNotFound {
            step_index,
            path: declared.to_string(),
        };

        let relative = Path::new(declared);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(not_found());
        }

        let path = self.root.join(relative);
        let metadata = std::fs::metadata(&path).map_err(|_| not_found())?;

        if metadata.is_dir() {
            let tree = FileTree::from_dir(&path)?;
            Ok(ResolvedSource {
                declared: declared.to_string(),
                content_hash: tree.digest(),
                payload: SourcePayload::Tree(tree),
            })
        } else {
            let data = std::fs::read(&path)?;
            let mode = file_mode(&metadata);
            let mut hasher = Sha256::new();
            hasher.update(&data);
            Ok(ResolvedSource {
                declared: declared.to_string(),
                content_hash: format!("{:x}", hasher.finalize()),
                payload: SourcePayload::File { data, mode },
            })
        }
    }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_source_names_path_and_step() {
        let dir = tempfile::tempdir().unwrap();
        let context = BuildContext::new(dir.path());
        let err = context
            .resolve_sources(&["nope.txt".to_string()], 3)
            .unwrap_err();
        match err {
            BuildError::SourceNotFound { step_index, path } => {
                assert_eq!(step_index, 3);
                assert_eq!(path, "nope.txt");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_escaping_paths_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let context = BuildContext::new(dir.path().join("ctx"));
        std::fs::create_dir_all(dir.path().join("ctx")).unwrap();
        std::fs::write(dir.path().join("secret.txt"), b"x").unwrap();

        let err = context
            .resolve_sources(&["../secret.txt".to_string()], 0)
            .unwrap_err();
        assert_eq!(err.kind(), "SourceNotFoundError");
    }

    #[test]
    fn test_file_source_hash_tracks_content() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("reqs.txt"), b"requests==2.0").unwrap();
        let context = BuildContext::new(dir.path());

        let first = context
            .resolve_sources(&["reqs.txt".to_string()], 0)
            .unwrap();
        std::fs::write(dir.path().join("reqs.txt"), b"requests==2.1").unwrap();
        let second = context
            .resolve_sources(&["reqs.txt".to_string()], 0)
            .unwrap();

        assert_ne!(first[0].content_hash, second[0].content_hash);
    }

    #[test]
    fn test_directory_source_resolves_to_tree() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/pkg")).unwrap();
        std::fs::write(dir.path().join("src/pkg/mod.py"), b"x = 1").unwrap();
        let context = BuildContext::new(dir.path());

        let resolved = context.resolve_sources(&["src".to_string()], 0).unwrap();
        match &resolved[0].payload {
            SourcePayload::Tree(tree) => assert!(tree.contains("pkg/mod.py")),
            other => panic!("unexpected payload: {other:?}"),
        }
    }
}
