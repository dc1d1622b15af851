//! Tract backend for person segmentation models
//!
//! Pure Rust inference with no native dependencies; always runs on CPU.

use crate::config::SegmentationConfig;
use crate::error::{PurikuraError, Result};
use crate::inference::InferenceBackend;
use instant::{Duration, Instant};
use log;
use ndarray::Array4;
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Tract backend
#[derive(Debug, Default)]
pub struct TractBackend {
    model: Option<TractModel>,
}

impl TractBackend {
    #[must_use]
    pub fn new() -> Self {
        Self { model: None }
    }

    fn load_model(config: &SegmentationConfig) -> Result<TractModel> {
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

        let size = config.internal_resolution.tensor_size() as usize;
        log::debug!("Creating Tract model for a {size}x{size} input");

        onnx()
            .model_for_read(&mut std::io::Cursor::new(model_data))
            .map_err(|e| PurikuraError::model(format!("Failed to load ONNX model: {e}")))?
            .with_input_fact(0, f32::fact([1, 3, size, size]).into())
            .map_err(|e| PurikuraError::model(format!("Failed to set input shape: {e}")))?
            .into_optimized()
            .map_err(|e| PurikuraError::model(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| PurikuraError::model(format!("Failed to create runnable model: {e}")))
    }
}

impl InferenceBackend for TractBackend {
    fn initialize(&mut self, config: &SegmentationConfig) -> Result<Option<Duration>> {
        if self.model.is_some() {
            return Ok(None);
        }

        let load_start = Instant::now();
        self.model = Some(Self::load_model(config)?);
        let load_time = load_start.elapsed();
        log::info!("Tract backend initialized in {}ms", load_time.as_millis());
        Ok(Some(load_time))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| PurikuraError::inference("Tract model not initialized"))?;

        log::debug!("Running Tract inference on {:?}", input.shape());
        let inference_start = Instant::now();

        let input_tensor = Tensor::from(input.clone());
        let outputs = model
            .run(tvec![input_tensor.into()])
            .map_err(|e| PurikuraError::inference(format!("Tract inference failed: {e}")))?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| PurikuraError::inference("No output tensor found"))?
            .into_arc_tensor();

        let output_data = output_tensor
            .to_array_view::<f32>()
            .map_err(|e| PurikuraError::inference(format!("Failed to convert output tensor: {e}")))?;

        let output_shape = output_data.shape();
        if output_shape.len() != 4 {
            return Err(PurikuraError::inference(format!(
                "Expected 4D output tensor, got {}D",
                output_shape.len()
            )));
        }

        let output_array = Array4::from_shape_vec(
            (
                output_shape.first().copied().unwrap_or(1),
                output_shape.get(1).copied().unwrap_or(1),
                output_shape.get(2).copied().unwrap_or(1),
                output_shape.get(3).copied().unwrap_or(1),
            ),
            output_data.to_owned().into_raw_vec_and_offset().0,
        )
        .map_err(|e| PurikuraError::inference(format!("Failed to reshape output tensor: {e}")))?;

        log::debug!(
            "Tract inference completed in {}ms",
            inference_start.elapsed().as_millis()
        );
        Ok(output_array)
    }

    fn is_initialized(&self) -> bool {
        self.model.is_some()
    }

    fn name(&self) -> &'static str {
        "tract"
    }
}
