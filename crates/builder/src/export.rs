use kiln_models::{BuildError, Image, resolve_path};
use kiln_store::SnapshotStore;
use std::path::Path;
use tracing::{info, instrument};

/// Materializes a built image into `output`:
///
/// ```text
/// <output>/manifest.json   image metadata incl. the startup directive
/// <output>/rootfs/         the final snapshot's filesystem
/// ```
///
/// The export is staged next to the destination and renamed into place, so a
/// partially exported image directory is never visible.
#[instrument(skip(store, image), fields(image = %image.image_id))]
pub async fn export_image(
    image: &Image,
    store: &dyn SnapshotStore,
    output: &Path,
) -> Result<(), BuildError> {
    let snapshot = store
        .get(&image.snapshot)
        .await?
        .ok_or_else(|| BuildError::Store {
            reason: format!("final snapshot {} missing from store", image.snapshot),
        })?;

    if output.exists() {
        return Err(BuildError::Io {
            reason: format!("output path {} already exists", output.display()),
        });
    }
    let parent = output.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let staging = tempfile::Builder::new()
        .prefix(".kiln-export-")
        .tempdir_in(parent)?;
    snapshot.tree.write_to(&staging.path().join("rootfs"))?;
    let manifest = serde_json::to_string_pretty(image).map_err(|e| BuildError::Store {
        reason: format!("cannot encode image manifest: {}", e),
    })?;
    std::fs::write(staging.path().join("manifest.json"), manifest)?;

    // Commit point: rename makes the export visible all at once.
    let staged = staging.into_path();
    std::fs::rename(&staged, output).map_err(|e| {
        let _ = std::fs::remove_dir_all(&staged);
        BuildError::Io {
            reason: format!("cannot publish export to {}: {}", output.display(), e),
        }
    })?;

    info!(output = %output.display(), "image exported");
    Ok(())
}

/// Reads the manifest of an exported image directory.
pub fn load_manifest(image_dir: &Path) -> Result<Image, BuildError> {
    let manifest = std::fs::read_to_string(image_dir.join("manifest.json")).map_err(|e| {
        BuildError::Io {
            reason: format!("cannot read manifest in {}: {}", image_dir.display(), e),
        }
    })?;
    serde_json::from_str(&manifest).map_err(|e| BuildError::Store {
        reason: format!("corrupt image manifest in {}: {}", image_dir.display(), e),
    })
}

/// Instantiates an exported image: spawns the recorded startup directive
/// verbatim (no shell) with the image workdir as current directory, and
/// returns the child's exit code unchanged.
#[instrument(skip(image_dir))]
pub async fn instantiate_image(image_dir: &Path) -> Result<i32, BuildError> {
    let image = load_manifest(image_dir)?;
    let executable = image
        .startup
        .executable()
        .ok_or(BuildError::InvalidStartupDirective {
            reason: "image manifest carries an empty argument vector".to_string(),
        })?;

    let rootfs = image_dir.join("rootfs");
    let cwd_rel = resolve_path(&image.workdir, ".");
    let cwd = if cwd_rel.is_empty() {
        rootfs.clone()
    } else {
        rootfs.join(cwd_rel)
    };

    info!(argv = ?image.startup.argv, cwd = %cwd.display(), "starting container process");
    let status = tokio::process::Command::new(executable)
        .args(image.startup.arguments())
        .current_dir(&cwd)
        .status()
        .await
        .map_err(|e| BuildError::Io {
            reason: format!("cannot spawn '{}': {}", executable, e),
        })?;

    Ok(status.code().unwrap_or(1))
}
