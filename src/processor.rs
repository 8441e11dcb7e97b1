pub mod encoder;
pub mod params;
pub mod resizer;
mod transformer;

pub use params::RawImageParams;
pub use resizer::ResizeFilter;
pub use transformer::{ImageTransformer, TransformSettings, TransformedImage};
