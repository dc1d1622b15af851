//! Configuration types for the editing engine

use crate::error::{PurikuraError, Result};
use crate::types::Color;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon GPU acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl std::str::FromStr for ExecutionProvider {
    type Err = PurikuraError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(PurikuraError::invalid_config(format!(
                "Unknown execution provider '{}' (expected auto, cpu, cuda or coreml)",
                other
            ))),
        }
    }
}

/// Inference backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// ONNX Runtime backend (supports GPU acceleration)
    Onnx,
    /// Tract backend (pure Rust, no external dependencies)
    Tract,
}

impl Default for BackendType {
    fn default() -> Self {
        if cfg!(feature = "onnx") {
            Self::Onnx
        } else {
            Self::Tract
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
        }
    }
}

impl std::str::FromStr for BackendType {
    type Err = PurikuraError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "onnx" => Ok(Self::Onnx),
            "tract" => Ok(Self::Tract),
            other => Err(PurikuraError::invalid_config(format!(
                "Unknown backend '{}' (expected onnx or tract)",
                other
            ))),
        }
    }
}

/// Internal resolution the model runs at
///
/// Larger tiers give finer mask edges at a higher inference cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionTier {
    Low,
    #[default]
    Medium,
    High,
    Full,
}

impl ResolutionTier {
    /// Side length of the square model input
    #[must_use]
    pub fn tensor_size(self) -> u32 {
        match self {
            Self::Low => 256,
            Self::Medium => 512,
            Self::High => 768,
            Self::Full => 1024,
        }
    }
}

impl std::fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Full => write!(f, "full"),
        }
    }
}

impl std::str::FromStr for ResolutionTier {
    type Err = PurikuraError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "full" => Ok(Self::Full),
            other => Err(PurikuraError::invalid_config(format!(
                "Unknown resolution tier '{}' (expected low, medium, high or full)",
                other
            ))),
        }
    }
}

/// How the model's output channel should be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputActivation {
    /// Values are already probabilities in `[0, 1]`
    #[default]
    Probability,
    /// Raw logits, passed through a sigmoid
    Logits,
}

/// Resampling filter used when scaling the photo for export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeFilter {
    Nearest,
    #[default]
    Triangle,
    CatmullRom,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Person segmentation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Inference backend
    pub backend_type: BackendType,
    /// Execution provider (ONNX Runtime only)
    pub execution_provider: ExecutionProvider,
    /// Path to the ONNX person segmentation model; `None` leaves the model unavailable
    pub model_path: Option<PathBuf>,
    /// Square input resolution of the model
    pub internal_resolution: ResolutionTier,
    /// Probability above which a tensor pixel counts as person
    pub segmentation_threshold: f32,
    /// Minimum mean probability for a detected region to be kept
    pub score_threshold: f32,
    /// Regions whose centroids are closer than this (tensor pixels) are suppressed
    pub nms_radius: u32,
    /// Maximum number of person regions kept
    pub max_detections: usize,
    /// Mirror the resulting mask horizontally
    pub flip_horizontal: bool,
    /// Per-channel normalization mean (RGB)
    pub normalization_mean: [f32; 3],
    /// Per-channel normalization standard deviation (RGB)
    pub normalization_std: [f32; 3],
    /// Interpretation of the model's output
    pub output_activation: OutputActivation,
    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,
    /// Model load timeout in seconds (0 = no timeout)
    pub load_timeout_secs: u64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            backend_type: BackendType::default(),
            execution_provider: ExecutionProvider::default(),
            model_path: None,
            internal_resolution: ResolutionTier::Medium,
            segmentation_threshold: 0.7,
            score_threshold: 0.2,
            nms_radius: 20,
            max_detections: 1,
            flip_horizontal: false,
            normalization_mean: [0.5, 0.5, 0.5],
            normalization_std: [0.5, 0.5, 0.5],
            output_activation: OutputActivation::Probability,
            intra_threads: 0,
            load_timeout_secs: 60,
        }
    }
}

impl SegmentationConfig {
    /// Validate thresholds and normalization parameters
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.segmentation_threshold) {
            return Err(PurikuraError::config_value_error(
                "segmentation threshold",
                self.segmentation_threshold,
                "0.0-1.0",
                Some(0.7),
            ));
        }

        if !(0.0..=1.0).contains(&self.score_threshold) {
            return Err(PurikuraError::config_value_error(
                "score threshold",
                self.score_threshold,
                "0.0-1.0",
                Some(0.2),
            ));
        }

        if self.max_detections == 0 {
            return Err(PurikuraError::config_value_error(
                "max detections",
                self.max_detections,
                ">= 1",
                Some(1),
            ));
        }

        if self.normalization_std.iter().any(|std| *std <= 0.0) {
            return Err(PurikuraError::invalid_config(format!(
                "Normalization std must be positive, got {:?}",
                self.normalization_std
            )));
        }

        Ok(())
    }
}

/// Freehand drawing defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawingConfig {
    /// Initial stroke colour
    pub color: Color,
    /// Initial stroke width in layer pixels
    pub brush_size: f32,
}

impl Default for DrawingConfig {
    fn default() -> Self {
        Self {
            color: Color::rgb(0xff, 0x6b, 0x9d),
            brush_size: 5.0,
        }
    }
}

/// Final composition and export settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Sticker glyph size as a fraction of the smaller output side
    pub sticker_scale: f32,
    /// Fill colour for monochrome sticker glyphs
    pub sticker_color: Color,
    /// Font used to rasterize sticker glyphs; system fonts are searched when unset
    pub font_path: Option<PathBuf>,
    /// Photo opacity in the simple (non-segmented) background mode
    pub approximate_opacity: f32,
    /// Resampling filter for scaling the photo
    pub resize_filter: ResizeFilter,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            sticker_scale: 0.08,
            sticker_color: Color::BLACK,
            font_path: None,
            approximate_opacity: 0.85,
            resize_filter: ResizeFilter::Triangle,
        }
    }
}

impl ExportConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.sticker_scale > 0.0 && self.sticker_scale <= 1.0) {
            return Err(PurikuraError::config_value_error(
                "sticker scale",
                self.sticker_scale,
                "0.0 (exclusive)-1.0",
                Some(0.08),
            ));
        }

        if !(0.0..=1.0).contains(&self.approximate_opacity) {
            return Err(PurikuraError::config_value_error(
                "approximate opacity",
                self.approximate_opacity,
                "0.0-1.0",
                Some(0.85),
            ));
        }

        Ok(())
    }
}

/// Top-level editor configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub segmentation: SegmentationConfig,
    pub drawing: DrawingConfig,
    pub export: ExportConfig,
}

impl EditorConfig {
    /// Create a new configuration builder
    ///
    /// ```rust
    /// use purikura::{EditorConfig, ResolutionTier};
    ///
    /// let config = EditorConfig::builder()
    ///     .internal_resolution(ResolutionTier::High)
    ///     .brush_size(8.0)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.segmentation.internal_resolution.tensor_size(), 768);
    /// ```
    #[must_use]
    pub fn builder() -> EditorConfigBuilder {
        EditorConfigBuilder::default()
    }

    /// Load a configuration from a JSON file
    ///
    /// Missing fields take their default values.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Thresholds or opacities outside `0.0-1.0`
    /// - Zero `max_detections`
    /// - Non-positive brush size, normalization std or sticker scale
    pub fn validate(&self) -> Result<()> {
        self.segmentation.validate()?;
        self.export.validate()?;

        if !(self.drawing.brush_size > 0.0) {
            return Err(PurikuraError::config_value_error(
                "brush size",
                self.drawing.brush_size,
                "> 0",
                Some(5.0),
            ));
        }

        Ok(())
    }
}

/// Builder for `EditorConfig`
#[derive(Debug, Default)]
pub struct EditorConfigBuilder {
    config: EditorConfig,
}

impl EditorConfigBuilder {
    #[must_use]
    pub fn backend_type(mut self, backend_type: BackendType) -> Self {
        self.config.segmentation.backend_type = backend_type;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.segmentation.execution_provider = provider;
        self
    }

    /// Set the segmentation model file
    #[must_use]
    pub fn model_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.segmentation.model_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn internal_resolution(mut self, tier: ResolutionTier) -> Self {
        self.config.segmentation.internal_resolution = tier;
        self
    }

    #[must_use]
    pub fn segmentation_threshold(mut self, threshold: f32) -> Self {
        self.config.segmentation.segmentation_threshold = threshold;
        self
    }

    #[must_use]
    pub fn score_threshold(mut self, threshold: f32) -> Self {
        self.config.segmentation.score_threshold = threshold;
        self
    }

    #[must_use]
    pub fn nms_radius(mut self, radius: u32) -> Self {
        self.config.segmentation.nms_radius = radius;
        self
    }

    #[must_use]
    pub fn max_detections(mut self, max_detections: usize) -> Self {
        self.config.segmentation.max_detections = max_detections;
        self
    }

    #[must_use]
    pub fn flip_horizontal(mut self, flip: bool) -> Self {
        self.config.segmentation.flip_horizontal = flip;
        self
    }

    #[must_use]
    pub fn output_activation(mut self, activation: OutputActivation) -> Self {
        self.config.segmentation.output_activation = activation;
        self
    }

    /// Set number of intra-op threads (0 = auto)
    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.segmentation.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn load_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.segmentation.load_timeout_secs = seconds;
        self
    }

    /// Set the default stroke colour
    #[must_use]
    pub fn brush_color(mut self, color: Color) -> Self {
        self.config.drawing.color = color;
        self
    }

    #[must_use]
    pub fn brush_size(mut self, size: f32) -> Self {
        self.config.drawing.brush_size = size;
        self
    }

    #[must_use]
    pub fn sticker_scale(mut self, scale: f32) -> Self {
        self.config.export.sticker_scale = scale;
        self
    }

    #[must_use]
    pub fn sticker_color(mut self, color: Color) -> Self {
        self.config.export.sticker_color = color;
        self
    }

    #[must_use]
    pub fn font_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.export.font_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn approximate_opacity(mut self, opacity: f32) -> Self {
        self.config.export.approximate_opacity = opacity;
        self
    }

    #[must_use]
    pub fn resize_filter(mut self, filter: ResizeFilter) -> Self {
        self.config.export.resize_filter = filter;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<EditorConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}
