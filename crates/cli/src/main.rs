use clap::{Parser, Subcommand};
use kiln_builder::{export_image, instantiate_image, load_recipe, BuildContext, Pipeline};
use kiln_models::{BuildError, BuilderConfig};
use kiln_store::FsStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "kiln", version, about = "A minimal layered container image builder")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an image from a recipe and an invocation context
    Build {
        /// Path to the recipe file
        #[arg(long)]
        recipe: PathBuf,
        /// Source tree that COPY sources resolve against
        #[arg(long, default_value = ".")]
        context: PathBuf,
        /// Export the built image to this directory
        #[arg(long)]
        output: Option<PathBuf>,
        /// Optional TOML configuration file
        #[arg(long)]
        config: Option<String>,
        /// Snapshot cache root (overrides config)
        #[arg(long)]
        cache_dir: Option<PathBuf>,
        /// Base image catalog root (overrides config)
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Upper bound for a single RUN step, in seconds (overrides config)
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Instantiate an exported image and pass its exit code through
    Run {
        /// Directory produced by `kiln build --output`
        #[arg(long)]
        image: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Build {
            recipe,
            context,
            output,
            config,
            cache_dir,
            catalog,
            timeout_secs,
        } => {
            let mut builder_config = match config {
                Some(path) => BuilderConfig::load(&path)?,
                None => BuilderConfig::default(),
            };
            if let Some(dir) = cache_dir {
                builder_config.cache_dir = dir;
            }
            if let Some(dir) = catalog {
                builder_config.base_catalog = dir;
            }
            if let Some(secs) = timeout_secs {
                builder_config.run_timeout_secs = secs;
            }

            match build(&recipe, &context, output.as_deref(), builder_config).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    error!(kind = e.kind(), "build failed: {}", e);
                    eprintln!("{}: {}", e.kind(), e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Run { image } => {
            let code = match instantiate_image(&image).await {
                Ok(code) => code,
                Err(e) => {
                    error!(kind = e.kind(), "run failed: {}", e);
                    eprintln!("{}: {}", e.kind(), e);
                    std::process::exit(1);
                }
            };
            std::process::exit(code);
        }
    }
}

async fn build(
    recipe_path: &std::path::Path,
    context_dir: &std::path::Path,
    output: Option<&std::path::Path>,
    config: BuilderConfig,
) -> Result<(), BuildError> {
    let recipe = load_recipe(recipe_path)?;
    let context = BuildContext::new(context_dir);
    let store = Arc::new(FsStore::open(&config.cache_dir)?);

    info!(recipe = %recipe_path.display(), context = %context_dir.display(), "starting build");
    let pipeline = Pipeline::new(store.clone(), config);
    let report = pipeline.build(&recipe, &context).await?;

    for record in &report.steps {
        let source = if record.cache_hit { "cached" } else { "built" };
        println!(
            "step {:>2} {:<8} {}  {}",
            record.index,
            record.kind,
            record.key.short(),
            source
        );
    }
    println!("image {} snapshot {}", report.image.image_id, report.image.snapshot.short());

    if let Some(output) = output {
        export_image(&report.image, store.as_ref(), output).await?;
        println!("exported to {}", output.display());
    }
    Ok(())
}
