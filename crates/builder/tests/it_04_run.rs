use kiln_builder::{export_image, instantiate_image, parse_recipe, BuildContext, Pipeline};
use kiln_store::MemoryStore;
use kiln_testsupport::*;
use std::sync::Arc;

async fn build_and_export(recipe_text: &str) -> anyhow::Result<tempfile::TempDir> {
    let catalog = base_catalog(&[("runtime", "slim")])?;
    let context = context_dir(&[("main.py", "print('hi')\n")])?;
    let cache = tempfile::tempdir()?;
    let out_parent = tempfile::tempdir()?;

    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::new(store.clone(), test_config(catalog.path(), cache.path()));
    let recipe = parse_recipe(recipe_text)?;
    let report = pipeline
        .build(&recipe, &BuildContext::new(context.path()))
        .await?;

    export_image(&report.image, store.as_ref(), &out_parent.path().join("image")).await?;
    Ok(out_parent)
}

#[tokio::test]
async fn exit_code_passes_through_unchanged() -> anyhow::Result<()> {
    let exported = build_and_export(
        "FROM runtime:slim\nWORKDIR /app\nCOPY main.py .\nCMD [\"/bin/sh\", \"-c\", \"exit 7\"]\n",
    )
    .await?;

    let code = instantiate_image(&exported.path().join("image")).await?;
    assert_eq!(code, 7);
    Ok(())
}

#[tokio::test]
async fn startup_runs_in_image_workdir() -> anyhow::Result<()> {
    // The copied file is visible from the process's working directory, which
    // is the image workdir inside the exported rootfs.
    let exported = build_and_export(
        "FROM runtime:slim\nWORKDIR /app\nCOPY main.py .\nCMD [\"/bin/sh\", \"-c\", \"test -f main.py\"]\n",
    )
    .await?;

    let code = instantiate_image(&exported.path().join("image")).await?;
    assert_eq!(code, 0);
    Ok(())
}

#[tokio::test]
async fn argv_is_not_shell_interpreted() -> anyhow::Result<()> {
    // A metacharacter-laden argument reaches the process verbatim: /bin/echo
    // would expand nothing, so `test` sees the literal string.
    let exported = build_and_export(
        "FROM runtime:slim\nWORKDIR /app\nCOPY main.py .\nCMD [\"/bin/sh\", \"-c\", \"test \\\"$1\\\" = '$(whoami)'\", \"sh\", \"$(whoami)\"]\n",
    )
    .await?;

    let code = instantiate_image(&exported.path().join("image")).await?;
    assert_eq!(code, 0);
    Ok(())
}
