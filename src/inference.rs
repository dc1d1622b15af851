//! Inference backend abstraction and factory

use crate::config::{BackendType, SegmentationConfig};
use crate::error::{PurikuraError, Result};
use ndarray::Array4;

// Use instant crate for cross-platform time compatibility
use instant::Duration;

/// Trait for inference backends
///
/// A backend owns one loaded model and maps an NCHW input tensor to the
/// model's first output.
pub trait InferenceBackend: Send {
    /// Load the model described by `config`
    ///
    /// Returns the load time, or `None` if the backend was already initialized.
    ///
    /// # Errors
    /// - Missing or unreadable model file
    /// - Model parse or optimization failures
    fn initialize(&mut self, config: &SegmentationConfig) -> Result<Option<Duration>>;

    /// Run inference on the input tensor
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Model inference failures
    /// - Output that is not a 4D tensor
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}

/// Factory trait for creating inference backends
pub trait BackendFactory: Send + Sync {
    /// Create an uninitialized backend of the given type
    ///
    /// # Errors
    /// - Backend type not compiled into this build
    fn create_backend(&self, backend_type: BackendType) -> Result<Box<dyn InferenceBackend>>;

    /// List backend types this factory can create
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Factory for the backends enabled by cargo features
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(&self, backend_type: BackendType) -> Result<Box<dyn InferenceBackend>> {
        match backend_type {
            #[cfg(feature = "onnx")]
            BackendType::Onnx => Ok(Box::new(crate::backends::OnnxBackend::new())),
            #[cfg(feature = "tract")]
            BackendType::Tract => Ok(Box::new(crate::backends::TractBackend::new())),
            #[allow(unreachable_patterns)]
            other => Err(PurikuraError::model_unavailable(format!(
                "{} backend is not compiled into this build",
                other
            ))),
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        [
            cfg!(feature = "onnx").then_some(BackendType::Onnx),
            cfg!(feature = "tract").then_some(BackendType::Tract),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}
