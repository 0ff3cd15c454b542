pub mod normalize;
pub mod services;

pub use normalize::{normalize_base64, ImageDecodeError, NormalizedImage};
