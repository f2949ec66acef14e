use kiln_builder::{parse_recipe, BuildContext, Pipeline};
use kiln_store::{FsStore, MemoryStore};
use kiln_testsupport::*;
use std::sync::Arc;

const RECIPE: &str = r#"
FROM runtime:slim
WORKDIR /app
COPY reqs.txt .
RUN cat reqs.txt > installed.txt
COPY main.py .
CMD ["run", "main.py"]
"#;

#[tokio::test]
async fn identical_builds_produce_identical_keys() -> anyhow::Result<()> {
    let catalog = base_catalog(&[("runtime", "slim")])?;
    let context = context_dir(&[("reqs.txt", "requests==2.31\n"), ("main.py", "print('hi')\n")])?;
    let recipe = parse_recipe(RECIPE)?;

    // Two fully independent invocations: separate stores, no shared state.
    let mut keys = Vec::new();
    for _ in 0..2 {
        let cache = tempfile::tempdir()?;
        let pipeline = Pipeline::new(
            Arc::new(MemoryStore::new()),
            test_config(catalog.path(), cache.path()),
        );
        let report = pipeline
            .build(&recipe, &BuildContext::new(context.path()))
            .await?;
        keys.push(report.steps.iter().map(|s| s.key.clone()).collect::<Vec<_>>());
    }
    assert_eq!(keys[0], keys[1]);
    Ok(())
}

#[tokio::test]
async fn second_build_is_fully_cached() -> anyhow::Result<()> {
    let catalog = base_catalog(&[("runtime", "slim")])?;
    let context = context_dir(&[("reqs.txt", "requests==2.31\n"), ("main.py", "print('hi')\n")])?;
    let cache = tempfile::tempdir()?;
    let recipe = parse_recipe(RECIPE)?;

    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::new(store, test_config(catalog.path(), cache.path()));

    let first = pipeline
        .build(&recipe, &BuildContext::new(context.path()))
        .await?;
    assert!(first.steps.iter().all(|s| !s.cache_hit));

    let second = pipeline
        .build(&recipe, &BuildContext::new(context.path()))
        .await?;
    assert!(second.steps.iter().all(|s| s.cache_hit));
    assert_eq!(
        first.steps.iter().map(|s| &s.key).collect::<Vec<_>>(),
        second.steps.iter().map(|s| &s.key).collect::<Vec<_>>()
    );
    Ok(())
}

#[tokio::test]
async fn manifest_change_invalidates_install_step_and_later_only() -> anyhow::Result<()> {
    let catalog = base_catalog(&[("runtime", "slim")])?;
    let context = context_dir(&[("reqs.txt", "requests==2.31\n"), ("main.py", "print('hi')\n")])?;
    let cache = tempfile::tempdir()?;
    let recipe = parse_recipe(RECIPE)?;

    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::new(store, test_config(catalog.path(), cache.path()));
    let first = pipeline
        .build(&recipe, &BuildContext::new(context.path()))
        .await?;

    // Only the dependency manifest changes.
    std::fs::write(context.path().join("reqs.txt"), "requests==2.32\n")?;
    let second = pipeline
        .build(&recipe, &BuildContext::new(context.path()))
        .await?;

    // Step 0 (WORKDIR) precedes the manifest copy: untouched, cache hit.
    assert_eq!(first.steps[0].key, second.steps[0].key);
    assert!(second.steps[0].cache_hit);

    // Step 1 copies the manifest: invalidated, and every later step with it.
    for index in 1..second.steps.len() {
        assert_ne!(first.steps[index].key, second.steps[index].key, "step {index}");
        assert!(!second.steps[index].cache_hit, "step {index}");
    }
    Ok(())
}

#[tokio::test]
async fn independent_builds_share_a_persistent_cache() -> anyhow::Result<()> {
    let catalog = base_catalog(&[("runtime", "slim")])?;
    let context = context_dir(&[("reqs.txt", "requests==2.31\n"), ("main.py", "print('hi')\n")])?;
    let cache = tempfile::tempdir()?;
    let recipe = parse_recipe(RECIPE)?;

    let first = Pipeline::new(
        Arc::new(FsStore::open(cache.path())?),
        test_config(catalog.path(), cache.path()),
    )
    .build(&recipe, &BuildContext::new(context.path()))
    .await?;

    // A later invocation with a fresh store handle reuses every snapshot.
    let second = Pipeline::new(
        Arc::new(FsStore::open(cache.path())?),
        test_config(catalog.path(), cache.path()),
    )
    .build(&recipe, &BuildContext::new(context.path()))
    .await?;

    assert!(second.steps.iter().all(|s| s.cache_hit));
    assert_eq!(first.image.snapshot, second.image.snapshot);
    Ok(())
}
