pub mod config;
pub mod error;
pub mod image;
pub mod recipe;
pub mod snapshot;

pub use config::*;
pub use error::*;
pub use image::*;
pub use recipe::*;
pub use snapshot::*;
