pub mod handlers;
pub mod service;
pub mod validation;

pub use service::{ImagePolicy, ImageService, Upload};
