use crate::context::{BuildContext, ResolvedSource, SourcePayload};
use crate::keys::step_key;
use crate::resolver::BaseResolver;
use kiln_models::{
    resolve_path, BuildError, BuildReport, BuildStatus, BuildStep, BuilderConfig, FileTree, Image,
    Recipe, Snapshot, StepRecord,
};
use kiln_store::SnapshotStore;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, instrument};

/// The layered build pipeline: applies a recipe's steps strictly in
/// declaration order on top of the resolved base snapshot, committing one
/// immutable snapshot per step and consulting the shared store by cache key
/// before executing any mutation.
pub struct Pipeline {
    store: Arc<dyn SnapshotStore>,
    config: BuilderConfig,
}

impl Pipeline {
    pub fn new(store: Arc<dyn SnapshotStore>, config: BuilderConfig) -> Self {
        Self { store, config }
    }

    /// Runs the whole build: base resolution, the step loop, finalization.
    /// Fails fatally on the first error; no image is published unless every
    /// step and the final startup directive validation succeeded.
    #[instrument(skip(self, recipe, context), fields(base = %recipe.base, steps = recipe.steps.len()))]
    pub async fn build(
        &self,
        recipe: &Recipe,
        context: &BuildContext,
    ) -> Result<BuildReport, BuildError> {
        let resolver = BaseResolver::new(&self.config.base_catalog);
        let mut parent = resolver.resolve(&recipe.base, self.store.as_ref()).await?;
        let mut records: Vec<StepRecord> = Vec::with_capacity(recipe.steps.len());
        let mut status = BuildStatus::Pending;

        for (index, step) in recipe.steps.iter().enumerate() {
            let sources = match step {
                BuildStep::Copy { sources, .. } => context.resolve_sources(sources, index)?,
                _ => Vec::new(),
            };
            let key = step_key(&parent.key, step, &sources);

            if let Some(cached) = self.store.get(&key).await? {
                debug!(step = index, key = %key.short(), "cache hit, skipping execution");
                records.push(StepRecord {
                    index,
                    kind: step.kind().to_string(),
                    key: key.clone(),
                    cache_hit: true,
                });
                parent = cached;
                status = BuildStatus::StepApplied { index };
                continue;
            }

            let snapshot = self.apply_step(index, step, &sources, &parent).await?;
            debug_assert_eq!(snapshot.key, key);
            let stored = self.store.put_if_absent(snapshot).await?;
            info!(step = index, kind = step.kind(), key = %stored.key.short(), "step applied");
            records.push(StepRecord {
                index,
                kind: step.kind().to_string(),
                key: stored.key.clone(),
                cache_hit: false,
            });
            parent = stored;
            status = BuildStatus::StepApplied { index };
        }
        debug!(?status, "all steps applied, finalizing");

        let startup = recipe
            .startup
            .clone()
            .ok_or(BuildError::InvalidStartupDirective {
                reason: "recipe does not declare a startup command".to_string(),
            })?;
        if startup.is_empty() {
            return Err(BuildError::InvalidStartupDirective {
                reason: "startup argument vector is empty".to_string(),
            });
        }

        let image = Image::new(parent.key.clone(), startup, parent.workdir.clone());
        info!(image = %image.image_id, snapshot = %image.snapshot.short(), "build complete");
        Ok(BuildReport {
            image,
            steps: records,
            status: BuildStatus::Complete,
        })
    }

    async fn apply_step(
        &self,
        index: usize,
        step: &BuildStep,
        sources: &[ResolvedSource],
        parent: &Snapshot,
    ) -> Result<Snapshot, BuildError> {
        let key = step_key(&parent.key, step, sources);
        let (tree, workdir) = match step {
            BuildStep::Workdir { path } => {
                let rel = resolve_path(&parent.workdir, path);
                let mut tree = parent.tree.clone();
                tree.insert_dir(&rel);
                (tree, format!("/{}", rel))
            }
            BuildStep::Copy { dest, .. } => {
                let dest_rel = resolve_path(&parent.workdir, dest);
                let mut tree = parent.tree.clone();
                for source in sources {
                    apply_copy(&mut tree, &dest_rel, source);
                }
                (tree, parent.workdir.clone())
            }
            BuildStep::Run { command } => {
                let tree = self.run_command(index, command, parent).await?;
                (tree, parent.workdir.clone())
            }
        };

        Ok(Snapshot::new(
            key,
            Some(parent.key.clone()),
            workdir,
            step.to_string(),
            tree,
        ))
    }

    /// Executes a RUN step: materialize the parent tree into a staging
    /// directory, invoke the command text through the shell with the
    /// effective working directory, bounded by the configured timeout, and
    /// rescan the staging directory into the new tree.
    async fn run_command(
        &self,
        index: usize,
        command: &str,
        parent: &Snapshot,
    ) -> Result<FileTree, BuildError> {
        let staging = tempfile::tempdir()?;
        parent.tree.write_to(staging.path())?;

        let cwd_rel = resolve_path(&parent.workdir, ".");
        let cwd = if cwd_rel.is_empty() {
            staging.path().to_path_buf()
        } else {
            staging.path().join(&cwd_rel)
        };
        std::fs::create_dir_all(&cwd)?;

        info!(step = index, command, "running command");
        let mut child = Command::new("sh");
        child
            .arg("-c")
            .arg(command)
            .current_dir(&cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let timeout_ms = self.config.run_timeout_ms();
        let output = match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            child.output(),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(BuildError::StepExecution {
                    step_index: index,
                    reason: format!("cannot spawn '{}': {}", command, e),
                })
            }
            Err(_elapsed) => {
                return Err(BuildError::StepTimeout {
                    step_index: index,
                    timeout_ms,
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BuildError::StepExecution {
                step_index: index,
                reason: format!(
                    "'{}' exited with {}: {}",
                    command,
                    output.status,
                    stderr.trim()
                ),
            });
        }

        Ok(FileTree::from_dir(staging.path())?)
    }
}

/// Merges one resolved copy source into the tree. File sources land at
/// `<dest>/<basename>`; directory sources copy their contents under `<dest>`.
/// Later copies overwrite earlier entries at the same path, which is why step
/// order must be preserved exactly.
fn apply_copy(tree: &mut FileTree, dest_rel: &str, source: &ResolvedSource) {
    match &source.payload {
        SourcePayload::File { data, mode } => {
            let name = source
                .declared
                .rsplit('/')
                .next()
                .unwrap_or(source.declared.as_str());
            tree.insert_file(&join_dest(dest_rel, name), data.clone(), *mode);
        }
        SourcePayload::Tree(subtree) => {
            if !dest_rel.is_empty() {
                tree.insert_dir(dest_rel);
            }
            for (path, node) in subtree.iter() {
                let target = join_dest(dest_rel, path);
                match node {
                    kiln_models::FileNode::File { data, mode } => {
                        tree.insert_file(&target, data.clone(), *mode)
                    }
                    kiln_models::FileNode::Directory => tree.insert_dir(&target),
                }
            }
        }
    }
}

fn join_dest(dest_rel: &str, name: &str) -> String {
    if dest_rel.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dest_rel, name)
    }
}
