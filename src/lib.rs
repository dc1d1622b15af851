#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Purikura Photo Editing Engine
//!
//! The rendering and segmentation core of a sticker-booth style photo editor:
//! acquire a photo, apply a filter, replace or remove its background using a
//! person-segmentation model, draw freehand strokes with undo/redo, place
//! emoji stickers, and export one flattened PNG.
//!
//! ## Features
//!
//! - **Person Segmentation**: ONNX models through ONNX Runtime or Tract, loaded once per session
//! - **Graceful Degradation**: without a model, gradients are approximated with a multiply blend
//! - **Edit History**: linear undo/redo of drawing-layer snapshots
//! - **CSS Filters**: the catalog presets rendered with W3C filter-effect math
//! - **Final Compositing**: backdrop, photo, strokes and stickers scaled into one raster
//! - **CLI Integration**: optional command-line host (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use purikura::{
//!     load_segmentation, EditorConfig, EditorSession, FilterPreset, GradientId, Point, Size,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = EditorConfig::builder()
//!     .model_path("models/selfie_segmentation.onnx")
//!     .build()?;
//!
//! // A missing or broken model leaves the adapter unavailable, not an error
//! let adapter = load_segmentation(&config.segmentation).await;
//!
//! let mut session = EditorSession::new(config, adapter, Size::new(800, 600))?;
//! session.acquire_file("selfie.jpg").await?;
//! session.apply_filter(FilterPreset::Kawaii)?;
//! session.replace_background(GradientId::Gradient1).await?;
//! session.draw_stroke(&[Point::new(10.0, 10.0), Point::new(120.0, 80.0)]);
//! session.add_sticker("⭐");
//! session.save(Size::new(1080, 1080), std::path::Path::new("."))?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with GPU execution providers
//! - `tract` (default): Pure Rust backend
//! - `cli` (default): Command-line host, spinner and tracing subscriber setup
//! - `tracing-json`: JSON log output for the CLI

pub mod background;
pub mod backends;
pub mod catalog;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod error;
pub mod filters;
pub mod geometry;
pub mod glyph;
pub mod gradient;
pub mod history;
pub mod inference;
pub mod segmentation;
pub mod services;
pub mod session;
pub mod stickers;
pub mod surface;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

use std::sync::Arc;

// Public API exports
pub use background::{composite_person, BackgroundCompositor, BackgroundOutcome, OutcomeKind};
pub use backends::*;
pub use catalog::{FilterPreset, GradientId};
pub use compositor::{CompositionInput, FinalCompositor};
pub use config::{
    BackendType, DrawingConfig, EditorConfig, EditorConfigBuilder, ExecutionProvider,
    ExportConfig, OutputActivation, ResizeFilter, ResolutionTier, SegmentationConfig,
};
pub use error::{PurikuraError, Result};
pub use filters::{FilterChain, FilterOp};
pub use geometry::{fit_within, map_client_point, NormalizedPoint, Point, Rect, Size};
pub use glyph::{FontGlyphRasterizer, GlyphRasterizer, RenderedGlyph};
pub use history::EditHistory;
pub use inference::{BackendFactory, DefaultBackendFactory, InferenceBackend};
pub use segmentation::{
    BackendLoader, ModelSegmenter, ModelStatus, SegmentationAdapter, Segmenter, SegmenterLoader,
};
pub use services::{
    ExportService, LogIndicator, NoOpIndicator, ProcessingGuard, ProcessingIndicator,
    ProcessingStage, EXPORT_PREFIX,
};
pub use session::EditorSession;
pub use stickers::{StickerBoard, StickerPlacement};
pub use surface::{DrawingLayer, LayerSnapshot, StrokeStyle};
pub use types::{
    ActiveBackground, BlendMode, Color, PhotoPresentation, PhotoState, SegmentationMask,
    SourcePhoto,
};
pub use utils::{ImagePreprocessor, Letterbox, PreprocessingOptions};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};

/// Load the segmentation model described by `config` with the default backends
///
/// The returned adapter is always usable: when no model path is set, or the
/// model fails to load, it reports [`ModelStatus::Unavailable`] and background
/// operations fall back to their simple modes.
///
/// # Examples
///
/// ```rust,no_run
/// use purikura::{load_segmentation, SegmentationConfig};
///
/// # async fn example() {
/// let adapter = load_segmentation(&SegmentationConfig::default()).await;
/// assert!(!adapter.is_available());
/// # }
/// ```
pub async fn load_segmentation(config: &SegmentationConfig) -> Arc<SegmentationAdapter> {
    let adapter = Arc::new(SegmentationAdapter::new());
    let loader = BackendLoader::new(Arc::new(DefaultBackendFactory), config.clone());
    adapter.load(&loader).await;
    adapter
}
