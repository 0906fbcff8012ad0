//! Image handling for todo attachments.
//!
//! Uploaded images are re-encoded to JPEG under a byte ceiling by
//! [`ImageOptimizer`] before being handed to the upload store.

pub mod optimizer;

use thiserror::Error;

pub use optimizer::{
    encode_at, search_quality, Dimensions, ImageOptimizer, OptimizedImage, OptimizerPolicy,
    QualityFit,
};

/// Failures raised while probing, decoding or encoding an image.
#[derive(Debug, Error)]
pub enum ImageError {
    /// The buffer is not an image we can read.
    #[error("Invalid image: {0}")]
    InvalidImage(String),
    /// The codec failed while producing output.
    #[error("Image processing failed: {0}")]
    Processing(String),
}

impl ImageError {
    pub fn invalid<T: Into<String>>(msg: T) -> Self {
        Self::InvalidImage(msg.into())
    }

    pub fn processing<T: Into<String>>(msg: T) -> Self {
        Self::Processing(msg.into())
    }
}
