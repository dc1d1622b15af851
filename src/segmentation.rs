//! Person segmentation adapter
//!
//! The adapter owns the session's segmentation model. It is loaded once,
//! asynchronously, and the outcome is kept for the rest of the session: a
//! failed load leaves the model [`ModelStatus::Unavailable`] and is never
//! retried. Segmentation itself runs on a blocking worker.

use crate::config::{OutputActivation, SegmentationConfig};
use crate::error::{PurikuraError, Result};
use crate::inference::{BackendFactory, InferenceBackend};
use crate::types::SegmentationMask;
use crate::utils::{ImagePreprocessor, Letterbox, PreprocessingOptions};
use async_trait::async_trait;
use image::RgbaImage;
use instant::Instant;
use ndarray::Array4;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, span, warn, Level};

/// Produces a person mask for an image at its native resolution
pub trait Segmenter: Send {
    /// Classify every pixel of `image`
    ///
    /// # Errors
    /// - Inference failures
    /// - Model output that cannot be mapped back to the image
    fn segment(&mut self, image: &RgbaImage) -> Result<SegmentationMask>;
}

/// Loads a segmenter; implementations decide where the model comes from
#[async_trait]
pub trait SegmenterLoader: Send + Sync {
    async fn load(&self) -> Result<Box<dyn Segmenter>>;
}

/// Outcome of the one-time model load
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelStatus {
    Loaded,
    Unavailable(String),
}

impl ModelStatus {
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded)
    }
}

impl std::fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loaded => write!(f, "loaded"),
            Self::Unavailable(reason) => write!(f, "unavailable ({})", reason),
        }
    }
}

/// Segmenter running a person segmentation model through an inference backend
pub struct ModelSegmenter {
    backend: Box<dyn InferenceBackend>,
    config: SegmentationConfig,
}

impl ModelSegmenter {
    #[must_use]
    pub fn new(backend: Box<dyn InferenceBackend>, config: SegmentationConfig) -> Self {
        Self { backend, config }
    }

    /// Initialize the backend's model
    pub fn initialize(&mut self) -> Result<Option<instant::Duration>> {
        self.backend.initialize(&self.config)
    }

    #[must_use]
    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    fn preprocessing_options(&self) -> PreprocessingOptions {
        PreprocessingOptions {
            target_size: self.config.internal_resolution.tensor_size(),
            normalization_mean: self.config.normalization_mean,
            normalization_std: self.config.normalization_std,
            ..PreprocessingOptions::default()
        }
    }
}

impl std::fmt::Debug for ModelSegmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSegmenter")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .finish()
    }
}

impl Segmenter for ModelSegmenter {
    fn segment(&mut self, image: &RgbaImage) -> Result<SegmentationMask> {
        let start = Instant::now();
        let dimensions = image.dimensions();

        let (tensor, _) = {
            let _span = span!(Level::DEBUG, "preprocess").entered();
            ImagePreprocessor::preprocess_image(image, &self.preprocessing_options())
                .map_err(|e| PurikuraError::segmentation(e.to_string()))?
        };

        let output = {
            let _span = span!(Level::DEBUG, "inference", backend = self.backend.name()).entered();
            self.backend.infer(&tensor)?
        };

        let mask = {
            let _span = span!(Level::DEBUG, "postprocess").entered();
            let scores = ScoreMap::from_tensor(&output, self.config.output_activation)?;
            let person = filter_detections(&scores, &self.config);
            let mask = map_to_original(&person, scores.size, dimensions)?;
            if self.config.flip_horizontal {
                mask.flipped_horizontal()
            } else {
                mask
            }
        };

        debug!(
            width = dimensions.0,
            height = dimensions.1,
            coverage = mask.coverage(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Segmentation complete"
        );
        Ok(mask)
    }
}

/// Square map of person probabilities in tensor space
struct ScoreMap {
    size: u32,
    values: Vec<f32>,
}

impl ScoreMap {
    fn from_tensor(tensor: &Array4<f32>, activation: OutputActivation) -> Result<Self> {
        let shape = tensor.shape();
        let (batch, channels, height, width) = match *shape {
            [b, c, h, w] => (b, c, h, w),
            _ => {
                return Err(PurikuraError::segmentation(format!(
                    "Expected 4D output tensor, got {:?}",
                    shape
                )))
            },
        };
        if batch != 1 || channels != 1 || height != width || width == 0 {
            return Err(PurikuraError::segmentation(format!(
                "Expected a [1, 1, S, S] person map, got {:?}",
                shape
            )));
        }

        let values = tensor
            .iter()
            .map(|value| match activation {
                OutputActivation::Probability => value.clamp(0.0, 1.0),
                OutputActivation::Logits => 1.0 / (1.0 + (-value).exp()),
            })
            .collect();

        Ok(Self {
            size: width as u32,
            values,
        })
    }
}

/// A 4-connected group of person pixels
#[derive(Debug)]
struct Region {
    pixels: Vec<usize>,
    score: f32,
    centroid: (f32, f32),
}

/// Threshold the score map and keep the best-scoring, well-separated person regions
fn filter_detections(scores: &ScoreMap, config: &SegmentationConfig) -> Vec<bool> {
    let size = scores.size as usize;
    let above: Vec<bool> = scores
        .values
        .iter()
        .map(|p| *p >= config.segmentation_threshold)
        .collect();

    let mut regions = collect_regions(&above, &scores.values, size);
    regions.retain(|region| region.score >= config.score_threshold);
    regions.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.pixels.len().cmp(&a.pixels.len()))
    });

    let radius_sq = (config.nms_radius as f32).powi(2);
    let mut kept: Vec<&Region> = Vec::new();
    for region in &regions {
        if kept.len() >= config.max_detections {
            break;
        }
        let suppressed = kept.iter().any(|other| {
            let dx = other.centroid.0 - region.centroid.0;
            let dy = other.centroid.1 - region.centroid.1;
            dx * dx + dy * dy <= radius_sq
        });
        if !suppressed {
            kept.push(region);
        }
    }

    debug!(
        regions = regions.len(),
        kept = kept.len(),
        "Filtered person detections"
    );

    let mut person = vec![false; above.len()];
    for region in kept {
        for &index in &region.pixels {
            if let Some(flag) = person.get_mut(index) {
                *flag = true;
            }
        }
    }
    person
}

fn collect_regions(above: &[bool], values: &[f32], size: usize) -> Vec<Region> {
    let mut visited = vec![false; above.len()];
    let mut regions = Vec::new();
    let mut queue = VecDeque::new();

    for start in 0..above.len() {
        if !above.get(start).copied().unwrap_or(false) || visited.get(start).copied().unwrap_or(true) {
            continue;
        }

        let mut pixels = Vec::new();
        let (mut sum, mut sum_x, mut sum_y) = (0.0_f32, 0.0_f32, 0.0_f32);
        if let Some(flag) = visited.get_mut(start) {
            *flag = true;
        }
        queue.push_back(start);

        while let Some(index) = queue.pop_front() {
            let (x, y) = (index % size, index / size);
            pixels.push(index);
            sum += values.get(index).copied().unwrap_or(0.0);
            sum_x += x as f32;
            sum_y += y as f32;

            let neighbours = [
                (x > 0).then(|| index - 1),
                (x + 1 < size).then(|| index + 1),
                (y > 0).then(|| index - size),
                (y + 1 < size).then(|| index + size),
            ];
            for next in neighbours.into_iter().flatten() {
                let is_person = above.get(next).copied().unwrap_or(false);
                if let Some(seen) = visited.get_mut(next) {
                    if is_person && !*seen {
                        *seen = true;
                        queue.push_back(next);
                    }
                }
            }
        }

        let count = pixels.len() as f32;
        regions.push(Region {
            score: sum / count,
            centroid: (sum_x / count, sum_y / count),
            pixels,
        });
    }

    regions
}

/// Sample the tensor-space mask at every original pixel through the inverse letterbox
fn map_to_original(person: &[bool], tensor_size: u32, dimensions: (u32, u32)) -> Result<SegmentationMask> {
    let letterbox = Letterbox::new(dimensions, tensor_size)
        .map_err(|e| PurikuraError::segmentation(e.to_string()))?;
    let stride = tensor_size as usize;
    Ok(SegmentationMask::from_fn(dimensions.0, dimensions.1, |x, y| {
        let (tx, ty) = letterbox.to_tensor(x, y);
        person
            .get(ty as usize * stride + tx as usize)
            .copied()
            .unwrap_or(false)
    }))
}

/// Loader creating a [`ModelSegmenter`] from a backend factory
pub struct BackendLoader {
    factory: Arc<dyn BackendFactory>,
    config: SegmentationConfig,
}

impl BackendLoader {
    #[must_use]
    pub fn new(factory: Arc<dyn BackendFactory>, config: SegmentationConfig) -> Self {
        Self { factory, config }
    }
}

#[async_trait]
impl SegmenterLoader for BackendLoader {
    async fn load(&self) -> Result<Box<dyn Segmenter>> {
        if self.config.model_path.is_none() {
            return Err(PurikuraError::model_unavailable(
                "No segmentation model path configured",
            ));
        }

        let backend = self.factory.create_backend(self.config.backend_type)?;
        let mut segmenter = ModelSegmenter::new(backend, self.config.clone());

        let task = tokio::task::spawn_blocking(move || {
            segmenter.initialize()?;
            Ok::<_, PurikuraError>(segmenter)
        });

        let joined = if self.config.load_timeout_secs > 0 {
            let timeout = std::time::Duration::from_secs(self.config.load_timeout_secs);
            tokio::time::timeout(timeout, task).await.map_err(|_| {
                PurikuraError::model_unavailable(format!(
                    "Model load timed out after {}s",
                    self.config.load_timeout_secs
                ))
            })?
        } else {
            task.await
        };

        let segmenter = joined
            .map_err(|e| PurikuraError::model(format!("Model load task failed: {}", e)))??;
        Ok(Box::new(segmenter))
    }
}

struct LoadedModel {
    status: ModelStatus,
    segmenter: Option<Arc<Mutex<Box<dyn Segmenter>>>>,
}

/// Session-wide handle to the segmentation model
#[derive(Default)]
pub struct SegmentationAdapter {
    model: OnceCell<LoadedModel>,
}

impl std::fmt::Debug for SegmentationAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentationAdapter")
            .field("status", &self.status())
            .finish()
    }
}

impl SegmentationAdapter {
    /// An adapter whose model has not been loaded yet
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An adapter with an already-available segmenter
    #[must_use]
    pub fn with_segmenter(segmenter: Box<dyn Segmenter>) -> Self {
        Self {
            model: OnceCell::new_with(Some(LoadedModel {
                status: ModelStatus::Loaded,
                segmenter: Some(Arc::new(Mutex::new(segmenter))),
            })),
        }
    }

    /// An adapter whose model is known to be unavailable
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            model: OnceCell::new_with(Some(LoadedModel {
                status: ModelStatus::Unavailable(reason.into()),
                segmenter: None,
            })),
        }
    }

    /// Load the model once; later calls return the recorded status
    #[instrument(skip_all)]
    pub async fn load<L: SegmenterLoader + ?Sized>(&self, loader: &L) -> ModelStatus {
        let loaded = self
            .model
            .get_or_init(|| async {
                let start = Instant::now();
                match loader.load().await {
                    Ok(segmenter) => {
                        info!(
                            elapsed_ms = start.elapsed().as_millis() as u64,
                            "Segmentation model loaded"
                        );
                        LoadedModel {
                            status: ModelStatus::Loaded,
                            segmenter: Some(Arc::new(Mutex::new(segmenter))),
                        }
                    },
                    Err(e) => {
                        warn!(error = %e, "Segmentation model unavailable, using simple background mode");
                        LoadedModel {
                            status: ModelStatus::Unavailable(e.to_string()),
                            segmenter: None,
                        }
                    },
                }
            })
            .await;
        loaded.status.clone()
    }

    /// Load status; `None` before `load` has completed
    #[must_use]
    pub fn status(&self) -> Option<&ModelStatus> {
        self.model.get().map(|loaded| &loaded.status)
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.status().is_some_and(ModelStatus::is_loaded)
    }

    /// Segment `image` on a blocking worker
    ///
    /// # Errors
    /// - `ModelUnavailable` when the model is not loaded
    /// - `Segmentation` when inference fails or the mask does not match the image
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub async fn segment(&self, image: Arc<RgbaImage>) -> Result<SegmentationMask> {
        let segmenter = self
            .model
            .get()
            .and_then(|loaded| loaded.segmenter.clone())
            .ok_or_else(|| {
                let reason = match self.status() {
                    Some(ModelStatus::Unavailable(reason)) => reason.clone(),
                    _ => "model has not been loaded".to_string(),
                };
                PurikuraError::model_unavailable(reason)
            })?;

        let expected = image.dimensions();
        let mask = tokio::task::spawn_blocking(move || {
            let mut segmenter = segmenter
                .lock()
                .map_err(|_| PurikuraError::segmentation("Segmenter lock poisoned"))?;
            segmenter.segment(&image)
        })
        .await
        .map_err(|e| PurikuraError::segmentation(format!("Segmentation task failed: {}", e)))?
        .map_err(|e| match e {
            PurikuraError::Segmentation(_) => e,
            other => PurikuraError::segmentation(other.to_string()),
        })?;

        if mask.dimensions != expected {
            return Err(PurikuraError::segmentation(format!(
                "Mask is {}x{} but the image is {}x{}",
                mask.dimensions.0, mask.dimensions.1, expected.0, expected.1
            )));
        }
        Ok(mask)
    }
}
