pub mod cast;
pub mod engine;
pub mod error;

pub use engine::{apply_transforms, resolve_spec_literals};
pub use error::TransformError;
