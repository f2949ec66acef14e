use crate::error::BuildError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Builder configuration, loadable from a TOML file with CLI flags layered on
/// top by the invocation surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderConfig {
    /// Root of the content-addressed snapshot cache shared across builds.
    pub cache_dir: PathBuf,
    /// Local base-image catalog: `<base_catalog>/<name>/<tag>/` is the root
    /// filesystem of one base image.
    pub base_catalog: PathBuf,
    /// Upper bound for a single external `RUN` invocation.
    pub run_timeout_secs: u64,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(".kiln/cache"),
            base_catalog: PathBuf::from(".kiln/bases"),
            run_timeout_secs: 300,
        }
    }
}

impl BuilderConfig {
    pub fn load(config_path: &str) -> Result<Self, BuildError> {
        let config_str = std::fs::read_to_string(config_path).map_err(|e| BuildError::Config {
            reason: format!("cannot read {}: {}", config_path, e),
        })?;
        toml::from_str(&config_str).map_err(|e| BuildError::Config {
            reason: format!("cannot parse {}: {}", config_path, e),
        })
    }

    pub fn run_timeout_ms(&self) -> u64 {
        self.run_timeout_secs.saturating_mul(1000)
    }
}
