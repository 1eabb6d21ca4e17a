// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Error types for the pose estimation library.

use thiserror::Error;

/// Result type alias for pose estimation operations.
pub type Result<T> = std::result::Result<T, InferenceError>;

/// Main error type for the pose estimation library.
///
/// Start-time errors (`ConfigLoadError`, `ModelLoadError`) abort pipeline
/// construction. Every other variant fails a single call and leaves the
/// pipeline usable for the next frame.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Malformed or missing joint configuration.
    #[error("Config load error: {0}")]
    ConfigLoadError(String),
    /// Unparseable or missing model graph.
    #[error("Model load error: {0}")]
    ModelLoadError(String),
    /// A frame batch with no frames was submitted.
    #[error("Empty batch: frame batch must have at least one frame")]
    EmptyBatchError,
    /// Frames or tensors with inconsistent shapes.
    #[error("Shape mismatch: {0}")]
    ShapeMismatchError(String),
    /// The inference engine reported an execution failure.
    #[error("Inference error: {0}")]
    InferenceError(String),
    /// Invalid frame data or unsupported pixel layout.
    #[error("Image error: {0}")]
    ImageError(String),
    /// Two body parts with the same name were added to one pose.
    #[error("Duplicate body part: {0}")]
    DuplicateBodyPart(String),
    /// A body part name that the pose does not contain.
    #[error("Unknown body part: {0}")]
    UnknownBodyPart(String),
    /// Wrapped `std::io::Error`.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<image::ImageError> for InferenceError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = InferenceError::ModelLoadError("test".to_string());
        assert_eq!(err.to_string(), "Model load error: test");

        let err = InferenceError::InferenceError("test".to_string());
        assert_eq!(err.to_string(), "Inference error: test");

        let err = InferenceError::EmptyBatchError;
        assert!(err.to_string().contains("at least one frame"));
    }

    #[test]
    fn test_io_error_source() {
        use std::error::Error;

        let err: InferenceError = std::io::Error::other("disk").into();
        assert!(err.source().is_some());
        assert!(matches!(err, InferenceError::Io(_)));
    }
}
