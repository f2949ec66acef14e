pub mod context;
pub mod export;
pub mod keys;
pub mod pipeline;
pub mod recipe;
pub mod resolver;

pub use context::{BuildContext, ResolvedSource, SourcePayload};
pub use export::{export_image, instantiate_image, load_manifest};
pub use pipeline::Pipeline;
pub use recipe::{load_recipe, parse_recipe};
pub use resolver::BaseResolver;
