//! Errors from reading and validating assets.

use std::path::PathBuf;

use thiserror::Error;
use toybox_core::FatalError;

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("reading asset: {0}")]
    Io(#[from] std::io::Error),

    #[error("decoding image: {0}")]
    Image(#[from] image::ImageError),

    #[error("no such asset: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Asset data that breaks a layout contract (pixel count, index range).
    #[error(transparent)]
    Fatal(#[from] FatalError),
}

impl ResourceError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ResourceError::Fatal(_))
    }
}

pub type ResourceResult<T> = Result<T, ResourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_not_found_display() {
        let err = ResourceError::FileNotFound(PathBuf::from("missing.png"));
        assert_eq!(err.to_string(), "no such asset: missing.png");
        assert!(!err.is_fatal());
    }
}
