// error.rs - Error taxonomy for a generation run
//
// Validation, NotFound and Conflict are raised before any model work and
// map to exit status -1. Everything else is fatal except Texture, which the
// pipeline recovers from locally.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for img2mesh operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A CLI parameter is out of range
    #[error("{0}")]
    Validation(String),

    /// The input image does not exist
    #[error("input file {} not found", .0.display())]
    NotFound(PathBuf),

    /// An output file would be overwritten
    #[error("output file {} already exists, exiting....", .0.display())]
    Conflict(PathBuf),

    /// A pretrained model could not be loaded or failed during inference
    #[error("model error: {0}")]
    Model(String),

    /// The optional texture stage failed
    #[error("texture generation failed: {0}")]
    Texture(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub fn model(msg: impl Into<String>) -> Self {
        Error::Model(msg.into())
    }

    pub fn texture(msg: impl Into<String>) -> Self {
        Error::Texture(msg.into())
    }

    /// True for failures detected before any model is loaded
    pub fn is_usage(&self) -> bool {
        matches!(self, Error::Validation(_) | Error::NotFound(_) | Error::Conflict(_))
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        if self.is_usage() { -1 } else { 1 }
    }
}

impl From<ort::Error> for Error {
    fn from(e: ort::Error) -> Self {
        Error::Model(e.to_string())
    }
}

impl From<ndarray::ShapeError> for Error {
    fn from(e: ndarray::ShapeError) -> Self {
        Error::Model(format!("tensor shape: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_errors_exit_minus_one() {
        assert_eq!(Error::Validation("x".into()).exit_code(), -1);
        assert_eq!(Error::NotFound("a.png".into()).exit_code(), -1);
        assert_eq!(Error::Conflict("a.glb".into()).exit_code(), -1);
        assert_eq!(Error::model("boom").exit_code(), 1);
        assert_eq!(Error::texture("boom").exit_code(), 1);
    }

    #[test]
    fn not_found_names_path() {
        let msg = Error::NotFound("missing/cat.png".into()).to_string();
        assert!(msg.contains("missing/cat.png"));
    }
}
