//! Test utilities: mock inference backends and segmenters
//!
//! These let the segmentation pipeline be exercised without model files or
//! ONNX Runtime / Tract.

use crate::{
    config::SegmentationConfig,
    error::{PurikuraError, Result},
    inference::InferenceBackend,
    segmentation::Segmenter,
    types::SegmentationMask,
};
use image::RgbaImage;
use instant::Duration;
use ndarray::Array4;
use std::sync::{Arc, Mutex};

/// Which tensor pixels the mock model reports as person: `(x, y, size)`
pub type MockPattern = fn(usize, usize, usize) -> bool;

fn centred_disc(x: usize, y: usize, size: usize) -> bool {
    let centre = size as f32 / 2.0;
    let radius = size as f32 / 3.0;
    let dx = x as f32 + 0.5 - centre;
    let dy = y as f32 + 0.5 - centre;
    dx * dx + dy * dy < radius * radius
}

/// Mock backend emitting a fixed person map of `output_size` squared
#[derive(Debug, Clone)]
pub struct MockSegmentationBackend {
    initialized: bool,
    output_size: usize,
    pattern: MockPattern,
    /// Call history for verification in tests
    call_history: Arc<Mutex<Vec<String>>>,
    should_fail_init: bool,
    should_fail_inference: bool,
}

impl MockSegmentationBackend {
    /// Mock whose person map is a centred disc
    #[must_use]
    pub fn new(output_size: usize) -> Self {
        Self {
            initialized: false,
            output_size,
            pattern: centred_disc,
            call_history: Arc::new(Mutex::new(Vec::new())),
            should_fail_init: false,
            should_fail_inference: false,
        }
    }

    #[must_use]
    pub fn with_pattern(mut self, pattern: MockPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Create a mock backend that will fail during initialization
    #[must_use]
    pub fn new_failing_init() -> Self {
        let mut backend = Self::new(32);
        backend.should_fail_init = true;
        backend
    }

    /// Create a mock backend that will fail during inference
    #[must_use]
    pub fn new_failing_inference() -> Self {
        let mut backend = Self::new(32);
        backend.should_fail_inference = true;
        backend
    }

    /// Shared handle to the call history
    #[must_use]
    pub fn call_history(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.call_history)
    }

    fn record_call(&self, method: &str) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(method.to_string());
        }
    }
}

impl InferenceBackend for MockSegmentationBackend {
    fn initialize(&mut self, _config: &SegmentationConfig) -> Result<Option<Duration>> {
        self.record_call("initialize");

        if self.should_fail_init {
            return Err(PurikuraError::model("Mock backend initialization failed"));
        }

        self.initialized = true;
        Ok(Some(Duration::from_millis(5)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.record_call("infer");

        if !self.initialized {
            return Err(PurikuraError::inference("Mock backend not initialized"));
        }
        if self.should_fail_inference {
            return Err(PurikuraError::inference("Mock backend inference failed"));
        }
        if input.shape().get(1) != Some(&3) {
            return Err(PurikuraError::inference(
                "Input tensor must be 3-channel NCHW",
            ));
        }

        let size = self.output_size;
        let pattern = self.pattern;
        Ok(Array4::from_shape_fn((1, 1, size, size), |(_, _, y, x)| {
            if pattern(x, y, size) {
                0.95
            } else {
                0.02
            }
        }))
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Mock segmenter with a programmable result
pub struct MockSegmenter {
    behaviour: Box<dyn FnMut(&RgbaImage) -> Result<SegmentationMask> + Send>,
    calls: Arc<Mutex<usize>>,
}

impl MockSegmenter {
    pub fn new<F>(behaviour: F) -> Self
    where
        F: FnMut(&RgbaImage) -> Result<SegmentationMask> + Send + 'static,
    {
        Self {
            behaviour: Box::new(behaviour),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Every pixel is person
    #[must_use]
    pub fn full() -> Self {
        Self::new(|image| Ok(SegmentationMask::from_fn(image.width(), image.height(), |_, _| true)))
    }

    /// Left half of the image is person
    #[must_use]
    pub fn left_half() -> Self {
        Self::new(|image| {
            let half = image.width() / 2;
            Ok(SegmentationMask::from_fn(image.width(), image.height(), |x, _| x < half))
        })
    }

    /// Every call fails
    #[must_use]
    pub fn failing() -> Self {
        Self::new(|_| Err(PurikuraError::inference("mock inference failure")))
    }

    /// Always returns a mask of the given size, whatever the image
    #[must_use]
    pub fn fixed_size(width: u32, height: u32) -> Self {
        Self::new(move |_| Ok(SegmentationMask::empty(width, height)))
    }

    /// Shared call counter
    #[must_use]
    pub fn calls(&self) -> Arc<Mutex<usize>> {
        Arc::clone(&self.calls)
    }
}

impl Segmenter for MockSegmenter {
    fn segment(&mut self, image: &RgbaImage) -> Result<SegmentationMask> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls += 1;
        }
        (self.behaviour)(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_backend_lifecycle() {
        let mut backend = MockSegmentationBackend::new(16);
        let input = Array4::<f32>::zeros((1, 3, 16, 16));
        assert!(backend.infer(&input).is_err());

        backend.initialize(&SegmentationConfig::default()).unwrap();
        let output = backend.infer(&input).unwrap();
        assert_eq!(output.shape(), &[1, 1, 16, 16]);
        assert!(output[[0, 0, 8, 8]] > 0.9);
        assert!(output[[0, 0, 0, 0]] < 0.1);
        assert_eq!(
            *backend.call_history().lock().unwrap(),
            vec!["infer", "initialize", "infer"]
        );
    }

    #[test]
    fn test_failing_mocks() {
        let mut backend = MockSegmentationBackend::new_failing_init();
        assert!(backend.initialize(&SegmentationConfig::default()).is_err());

        let mut backend = MockSegmentationBackend::new_failing_inference();
        backend.initialize(&SegmentationConfig::default()).unwrap();
        assert!(backend.infer(&Array4::zeros((1, 3, 4, 4))).is_err());
    }

    #[test]
    fn test_mock_segmenter_counts_calls() {
        let mut segmenter = MockSegmenter::left_half();
        let calls = segmenter.calls();
        let mask = segmenter.segment(&RgbaImage::new(4, 2)).unwrap();
        assert!(mask.is_person(1, 0));
        assert!(!mask.is_person(2, 0));
        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
