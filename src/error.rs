//! Error types for photo editing operations

use thiserror::Error;

/// Result type alias for editing operations
pub type Result<T> = std::result::Result<T, PurikuraError>;

/// Error types for the editing pipeline
#[derive(Error, Debug)]
pub enum PurikuraError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image encoding or decoding errors reported by the image crate
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Configuration files that fail to parse
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Segmentation model failed to load or was never loaded
    #[error("Segmentation model unavailable: {0}")]
    ModelUnavailable(String),

    /// The model is loaded but a single segmentation call failed
    #[error("Segmentation failed: {0}")]
    Segmentation(String),

    /// Source image bytes could not be decoded into a raster
    #[error("Image decode failed: {0}")]
    ImageDecode(String),

    /// Backend inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Model loading or initialization errors
    #[error("Model error: {0}")]
    Model(String),

    /// Raster processing errors
    #[error("Processing error: {0}")]
    Processing(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid operation arguments (unknown catalog name, malformed filter, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A background operation was requested while another one is still running
    #[error("A background operation is already in progress")]
    OperationInProgress,

    /// The operation needs an acquired photo
    #[error("No photo has been acquired in this session")]
    NoPhoto,
}

impl PurikuraError {
    /// Create a new model unavailable error
    pub fn model_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::ModelUnavailable(msg.into())
    }

    /// Create a new segmentation failure error
    pub fn segmentation<S: Into<String>>(msg: S) -> Self {
        Self::Segmentation(msg.into())
    }

    /// Create a new image decode error
    pub fn image_decode<S: Into<String>>(msg: S) -> Self {
        Self::ImageDecode(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Create model error with troubleshooting context
    pub fn model_error_with_context<P: AsRef<std::path::Path>>(
        operation: &str,
        model_path: P,
        error: &str,
        suggestions: &[&str],
    ) -> Self {
        let path_display = model_path.as_ref().display();
        let suggestion_text = if suggestions.is_empty() {
            String::new()
        } else {
            format!(" Suggestions: {}", suggestions.join(", "))
        };

        Self::Model(format!(
            "Failed to {} model '{}': {}.{}",
            operation, path_display, error, suggestion_text
        ))
    }

    /// Whether the error belongs to the segmentation fallback family
    ///
    /// These are contained by the background compositor and degrade the
    /// operation instead of reaching the caller.
    #[must_use]
    pub fn is_recoverable_segmentation_error(&self) -> bool {
        matches!(
            self,
            Self::ModelUnavailable(_)
                | Self::Segmentation(_)
                | Self::ImageDecode(_)
                | Self::Inference(_)
                | Self::Image(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_creation() {
        let err = PurikuraError::invalid_config("test config error");
        assert!(matches!(err, PurikuraError::InvalidConfig(_)));

        let err = PurikuraError::segmentation("bad tensor");
        assert!(matches!(err, PurikuraError::Segmentation(_)));
    }

    #[test]
    fn test_error_display() {
        let err = PurikuraError::model_unavailable("no model path configured");
        assert_eq!(
            err.to_string(),
            "Segmentation model unavailable: no model path configured"
        );
        assert_eq!(
            PurikuraError::OperationInProgress.to_string(),
            "A background operation is already in progress"
        );
    }

    #[test]
    fn test_enhanced_error_context() {
        let err = PurikuraError::config_value_error("segmentation threshold", 1.5, "0.0-1.0", Some(0.7));
        let error_string = err.to_string();
        assert!(error_string.contains("segmentation threshold"));
        assert!(error_string.contains("1.5"));
        assert!(error_string.contains("Recommended: 0.7"));

        let err = PurikuraError::model_error_with_context(
            "load",
            Path::new("/models/person.onnx"),
            "file not found",
            &["check file path"],
        );
        let error_string = err.to_string();
        assert!(error_string.contains("/models/person.onnx"));
        assert!(error_string.contains("Suggestions: check file path"));
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(PurikuraError::model_unavailable("x").is_recoverable_segmentation_error());
        assert!(PurikuraError::segmentation("x").is_recoverable_segmentation_error());
        assert!(PurikuraError::image_decode("x").is_recoverable_segmentation_error());
        assert!(!PurikuraError::OperationInProgress.is_recoverable_segmentation_error());
        assert!(!PurikuraError::NoPhoto.is_recoverable_segmentation_error());
    }
}
