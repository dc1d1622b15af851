//! Shared fixtures and mocks for integration tests

#![allow(dead_code)]

use image::{ImageFormat, Rgba, RgbaImage};
use ndarray::Array4;
use purikura::{
    BackendFactory, BackendType, InferenceBackend, ProcessingIndicator, ProcessingStage,
    PurikuraError, Result, SegmentationConfig, SegmentationMask, Segmenter,
};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Deterministic, non-uniform test photo
pub fn test_photo(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let intensity = ((x + y) % 100) as u8;
        Rgba([intensity, 128, 255 - intensity, 255])
    })
}

/// Encode a raster as PNG bytes
pub fn png_bytes(image: &RgbaImage) -> Vec<u8> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .expect("PNG encoding of a test image");
    buffer
}

/// Segmenter whose person region is decided by a closure over `(x, y, width, height)`
pub struct PatternSegmenter {
    pattern: fn(u32, u32, u32, u32) -> bool,
    delay: Duration,
    fail: bool,
}

impl PatternSegmenter {
    pub fn new(pattern: fn(u32, u32, u32, u32) -> bool) -> Self {
        Self {
            pattern,
            delay: Duration::ZERO,
            fail: false,
        }
    }

    /// Centre rectangle covering the middle third of the photo
    pub fn centre() -> Self {
        Self::new(|x, y, w, h| x >= w / 3 && x < 2 * w / 3 && y >= h / 3 && y < 2 * h / 3)
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::centre()
        }
    }

    /// Sleep inside the blocking worker before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Segmenter for PatternSegmenter {
    fn segment(&mut self, image: &RgbaImage) -> Result<SegmentationMask> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.fail {
            return Err(PurikuraError::inference("simulated inference failure"));
        }
        let (w, h) = image.dimensions();
        let pattern = self.pattern;
        Ok(SegmentationMask::from_fn(w, h, |x, y| pattern(x, y, w, h)))
    }
}

/// Indicator that records every call
#[derive(Default, Clone)]
pub struct RecordingIndicator {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl RecordingIndicator {
    pub fn shows(&self) -> usize {
        self.count(|e| e.starts_with("show:"))
    }

    pub fn hides(&self) -> usize {
        self.count(|e| e == "hide")
    }

    fn count(&self, predicate: impl Fn(&str) -> bool) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| predicate(e))
            .count()
    }
}

impl ProcessingIndicator for RecordingIndicator {
    fn show(&self, stage: ProcessingStage) {
        self.events.lock().unwrap().push(format!("show:{:?}", stage));
    }

    fn hide(&self) {
        self.events.lock().unwrap().push("hide".to_string());
    }
}

/// Inference backend reporting the left half of the tensor as person
pub struct LeftHalfBackend {
    initialized: bool,
}

impl InferenceBackend for LeftHalfBackend {
    fn initialize(&mut self, _config: &SegmentationConfig) -> Result<Option<Duration>> {
        self.initialized = true;
        Ok(Some(Duration::from_millis(1)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        if !self.initialized {
            return Err(PurikuraError::inference("not initialized"));
        }
        let size = input.shape()[2];
        Ok(Array4::from_shape_fn((1, 1, size, size), |(_, _, _, x)| {
            if x < size / 2 {
                0.97
            } else {
                0.01
            }
        }))
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn name(&self) -> &'static str {
        "left-half"
    }
}

/// Factory handing out [`LeftHalfBackend`]s, or failing if asked to
pub struct MockFactory {
    pub fail: bool,
}

impl BackendFactory for MockFactory {
    fn create_backend(&self, _backend_type: BackendType) -> Result<Box<dyn InferenceBackend>> {
        if self.fail {
            return Err(PurikuraError::model("mock factory failure"));
        }
        Ok(Box::new(LeftHalfBackend { initialized: false }))
    }

    fn available_backends(&self) -> Vec<BackendType> {
        vec![BackendType::Onnx, BackendType::Tract]
    }
}
