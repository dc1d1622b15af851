//! ONNX Runtime backend for person segmentation models
//!
//! Supports the CPU, CUDA and `CoreML` execution providers. Providers that
//! are requested but unavailable fall back to CPU with a warning.

use crate::config::{ExecutionProvider, SegmentationConfig};
use crate::error::{PurikuraError, Result};
use crate::inference::InferenceBackend;
use instant::{Duration, Instant};
use log;
use ndarray::Array4;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::{self, value::Value};

/// ONNX Runtime backend
#[derive(Debug, Default)]
pub struct OnnxBackend {
    session: Option<Session>,
}

impl OnnxBackend {
    #[must_use]
    pub fn new() -> Self {
        Self { session: None }
    }

    /// List ONNX Runtime execution providers with availability and a description
    pub fn list_providers() -> Vec<(String, bool, String)> {
        let cuda_available =
            OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available =
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false);
        log::debug!("CUDA available: {cuda_available}, CoreML available: {coreml_available}");

        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, uses CPU for inference".to_string(),
            ),
            (
                "CUDA".to_string(),
                cuda_available,
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
            ),
            (
                "CoreML".to_string(),
                coreml_available,
                "Apple Silicon GPU acceleration (macOS only)".to_string(),
            ),
        ]
    }

    /// Execution providers to register for the requested option, in priority order
    fn providers_for(requested: ExecutionProvider) -> Vec<ExecutionProviderDispatch> {
        let cuda = CUDAExecutionProvider::default();
        let cuda_available = OrtExecutionProvider::is_available(&cuda).unwrap_or(false);
        let coreml = CoreMLExecutionProvider::default().with_subgraphs(true);
        let coreml_available = OrtExecutionProvider::is_available(&coreml).unwrap_or(false);

        let mut providers = Vec::new();
        match requested {
            ExecutionProvider::Auto => {
                if cuda_available {
                    log::info!("CUDA execution provider is available and will be used");
                    providers.push(cuda.build());
                }
                if coreml_available {
                    log::info!("CoreML execution provider is available and will be used");
                    providers.push(coreml.build());
                }
                if providers.is_empty() {
                    log::debug!("No hardware acceleration available, using CPU");
                }
            },
            ExecutionProvider::Cpu => log::info!("Using CPU execution provider"),
            ExecutionProvider::Cuda => {
                if cuda_available {
                    log::info!("Using CUDA execution provider");
                    providers.push(cuda.build());
                } else {
                    log::warn!("CUDA execution provider requested but not available, falling back to CPU");
                }
            },
            ExecutionProvider::CoreMl => {
                if coreml_available {
                    log::info!("Using CoreML execution provider");
                    providers.push(coreml.build());
                } else {
                    log::warn!("CoreML execution provider requested but not available, falling back to CPU");
                }
            },
        }
        providers
    }

    fn load_model(config: &SegmentationConfig) -> Result<Session> {
        let model_path = config
            .model_path
            .as_ref()
            .ok_or_else(|| PurikuraError::model_unavailable("No segmentation model path configured"))?;

        let model_data = std::fs::read(model_path).map_err(|e| {
            PurikuraError::model_error_with_context(
                "read",
                model_path,
                &e.to_string(),
                &["check the model path", "check file permissions"],
            )
        })?;

        let mut session_builder = Session::builder()
            .map_err(|e| PurikuraError::inference(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| PurikuraError::inference(format!("Failed to set optimization level: {e}")))?;

        let providers = Self::providers_for(config.execution_provider);
        if !providers.is_empty() {
            session_builder = session_builder
                .with_execution_providers(providers)
                .map_err(|e| {
                    PurikuraError::inference(format!("Failed to set execution providers: {e}"))
                })?;
        }

        let intra_threads = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            std::thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(4)
        };

        let session = session_builder
            .with_intra_threads(intra_threads)
            .map_err(|e| PurikuraError::inference(format!("Failed to set intra threads: {e}")))?
            .commit_from_memory(&model_data)
            .map_err(|e| {
                PurikuraError::model_error_with_context(
                    "load",
                    model_path,
                    &e.to_string(),
                    &["verify the file is an ONNX segmentation model"],
                )
            })?;

        log::debug!(
            "ONNX Runtime session created ({} intra-op threads, provider {})",
            intra_threads,
            config.execution_provider
        );
        Ok(session)
    }
}

impl InferenceBackend for OnnxBackend {
    fn initialize(&mut self, config: &SegmentationConfig) -> Result<Option<Duration>> {
        if self.session.is_some() {
            return Ok(None);
        }

        let load_start = Instant::now();
        self.session = Some(Self::load_model(config)?);
        let load_time = load_start.elapsed();
        log::info!(
            "ONNX model loaded in {:.0}ms",
            load_time.as_secs_f64() * 1000.0
        );
        Ok(Some(load_time))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| PurikuraError::inference("ONNX session not initialized"))?;

        let inference_start = Instant::now();
        log::debug!("Starting inference with input shape: {:?}", input.dim());

        let input_value = Value::from_array(input.clone())
            .map_err(|e| PurikuraError::inference(format!("Failed to convert input tensor: {e}")))?;

        // Positional inputs avoid depending on the model's tensor names
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| PurikuraError::inference(format!("ONNX inference failed: {e}")))?;

        let output_tensor = {
            let keys: Vec<_> = outputs.keys().collect();
            let first_key = keys
                .first()
                .ok_or_else(|| PurikuraError::inference("No output tensors found"))?;
            outputs
                .get(first_key)
                .ok_or_else(|| PurikuraError::inference("First output tensor not found"))?
                .try_extract_array::<f32>()
                .map_err(|e| PurikuraError::inference(format!("Failed to extract output tensor: {e}")))?
        };

        let output_shape = output_tensor.shape().to_vec();
        if output_shape.len() != 4 {
            return Err(PurikuraError::inference(format!(
                "Expected 4D output tensor, got {}D",
                output_shape.len()
            )));
        }

        let output_data = output_tensor.view().to_owned();
        let output_array = Array4::from_shape_vec(
            (
                output_shape.first().copied().unwrap_or(1),
                output_shape.get(1).copied().unwrap_or(1),
                output_shape.get(2).copied().unwrap_or(1),
                output_shape.get(3).copied().unwrap_or(1),
            ),
            output_data.into_raw_vec_and_offset().0,
        )
        .map_err(|e| PurikuraError::inference(format!("Failed to reshape output tensor: {e}")))?;

        log::debug!(
            "Inference complete: {:.2}ms",
            inference_start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(output_array)
    }

    fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    fn name(&self) -> &'static str {
        "onnx"
    }
}
