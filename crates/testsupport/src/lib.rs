//! Fixtures shared by the integration tests: throwaway base catalogs,
//! invocation contexts and builder configurations.

use kiln_models::BuilderConfig;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Creates a temp base catalog holding one base image per `(name, tag)` pair.
/// Each base gets a small marker filesystem so its digest is non-trivial.
pub fn base_catalog(bases: &[(&str, &str)]) -> anyhow::Result<TempDir> {
    let dir = tempfile::tempdir()?;
    for (name, tag) in bases {
        let root = dir.path().join(name).join(tag);
        std::fs::create_dir_all(root.join("etc"))?;
        std::fs::write(
            root.join("etc/os-release"),
            format!("NAME={}\nVERSION={}\n", name, tag),
        )?;
        std::fs::create_dir_all(root.join("usr/bin"))?;
        std::fs::write(root.join("usr/bin/interpreter"), b"#!/bin/fake\n")?;
    }
    Ok(dir)
}

/// Creates a temp invocation context containing the given `(path, content)`
/// files. Parent directories are created as needed.
pub fn context_dir(files: &[(&str, &str)]) -> anyhow::Result<TempDir> {
    let dir = tempfile::tempdir()?;
    for (path, content) in files {
        let target = dir.path().join(path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(target, content)?;
    }
    Ok(dir)
}

/// Writes a recipe file into `dir` and returns its path.
pub fn write_recipe(dir: &Path, text: &str) -> anyhow::Result<PathBuf> {
    let path = dir.join("Recipe");
    std::fs::write(&path, text)?;
    Ok(path)
}

/// Builder config pointing at the given catalog, with a short run timeout so
/// timeout tests stay fast.
pub fn test_config(catalog: &Path, cache: &Path) -> BuilderConfig {
    BuilderConfig {
        cache_dir: cache.to_path_buf(),
        base_catalog: catalog.to_path_buf(),
        run_timeout_secs: 10,
    }
}
