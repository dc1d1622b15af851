//! Editing session: the single owner of all per-photo state
//!
//! An [`EditorSession`] holds the photo state, the drawing layer with its
//! history, and the sticker board. Operations that mutate state take
//! `&mut self`, so one session never runs two of them at once.

use crate::background::{BackgroundCompositor, OutcomeKind};
use crate::catalog::{FilterPreset, GradientId};
use crate::compositor::{CompositionInput, FinalCompositor};
use crate::config::EditorConfig;
use crate::error::{PurikuraError, Result};
use crate::geometry::{fit_within, map_client_point, NormalizedPoint, Point, Rect, Size};
use crate::history::EditHistory;
use crate::segmentation::{ModelStatus, SegmentationAdapter, SegmenterLoader};
use crate::services::export::ExportService;
use crate::services::progress::{
    NoOpIndicator, ProcessingGuard, ProcessingIndicator, ProcessingStage,
};
use crate::stickers::{StickerBoard, StickerPlacement};
use crate::surface::{DrawingLayer, LayerSnapshot, StrokeStyle};
use crate::types::{Color, PhotoState, SourcePhoto};
use image::RgbaImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// One photo being edited
pub struct EditorSession {
    config: EditorConfig,
    background: Arc<BackgroundCompositor>,
    compositor: FinalCompositor,
    indicator: Arc<dyn ProcessingIndicator>,
    photo: Option<PhotoState>,
    container: Size,
    drawing: DrawingLayer,
    history: EditHistory<LayerSnapshot>,
    stickers: StickerBoard,
    stroke: StrokeStyle,
    last_point: Option<Point>,
}

impl std::fmt::Debug for EditorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorSession")
            .field("has_photo", &self.photo.is_some())
            .field("container", &self.container)
            .field("history_len", &self.history.len())
            .field("stickers", &self.stickers.len())
            .finish_non_exhaustive()
    }
}

impl EditorSession {
    /// Create a session with a silent indicator
    ///
    /// `container` is the size of the editing viewport the drawing layer and
    /// stickers are laid out in.
    pub fn new(
        config: EditorConfig,
        adapter: Arc<SegmentationAdapter>,
        container: Size,
    ) -> Result<Self> {
        let background = Arc::new(
            BackgroundCompositor::new(adapter)
                .with_approximate_opacity(config.export.approximate_opacity),
        );
        let compositor = FinalCompositor::new(config.export.clone())?;
        Self::with_parts(config, background, compositor, Arc::new(NoOpIndicator), container)
    }

    /// Create a session from explicitly constructed collaborators
    pub fn with_parts(
        config: EditorConfig,
        background: Arc<BackgroundCompositor>,
        compositor: FinalCompositor,
        indicator: Arc<dyn ProcessingIndicator>,
        container: Size,
    ) -> Result<Self> {
        config.validate()?;
        let stroke = StrokeStyle {
            color: config.drawing.color,
            width: config.drawing.brush_size,
        };
        let drawing = DrawingLayer::new(container)?;
        let mut history = EditHistory::new();
        history.record(drawing.snapshot());

        Ok(Self {
            config,
            background,
            compositor,
            indicator,
            photo: None,
            container,
            drawing,
            history,
            stickers: StickerBoard::new(),
            stroke,
            last_point: None,
        })
    }

    #[must_use]
    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    #[must_use]
    pub fn photo(&self) -> Option<&PhotoState> {
        self.photo.as_ref()
    }

    #[must_use]
    pub fn drawing(&self) -> &DrawingLayer {
        &self.drawing
    }

    #[must_use]
    pub fn history(&self) -> &EditHistory<LayerSnapshot> {
        &self.history
    }

    #[must_use]
    pub fn container(&self) -> Size {
        self.container
    }

    #[must_use]
    pub fn stroke_style(&self) -> StrokeStyle {
        self.stroke
    }

    /// Segmentation model status; `None` until a load has completed
    #[must_use]
    pub fn model_status(&self) -> Option<&ModelStatus> {
        self.background.adapter().status()
    }

    /// Load the segmentation model once for this session's adapter
    pub async fn load_model<L: SegmenterLoader + ?Sized>(&self, loader: &L) -> ModelStatus {
        let _guard = ProcessingGuard::show(self.indicator.as_ref(), ProcessingStage::ModelLoading);
        self.background.adapter().load(loader).await
    }

    // ---- photo acquisition -------------------------------------------------

    /// Start editing a new photo from encoded bytes
    ///
    /// Any previous photo, drawing and stickers are discarded.
    ///
    /// # Errors
    /// `ImageDecode` when the bytes are not a supported image.
    #[instrument(skip_all, fields(bytes = bytes.len()))]
    pub async fn acquire_photo(&mut self, bytes: Vec<u8>) -> Result<()> {
        let (original, decoded) = {
            let _guard =
                ProcessingGuard::show(self.indicator.as_ref(), ProcessingStage::PhotoDecoding);
            tokio::task::spawn_blocking(move || SourcePhoto::from_encoded(bytes))
                .await
                .map_err(|e| PurikuraError::image_decode(format!("Decode task failed: {}", e)))??
        };

        let (width, height) = original.dimensions();
        self.photo = Some(PhotoState::new(original, decoded));
        self.stickers.clear();
        self.last_point = None;
        self.setup_layer()?;
        info!(width, height, "Photo acquired");
        Ok(())
    }

    /// Start editing a photo read from disk
    pub async fn acquire_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        self.acquire_photo(bytes).await
    }

    /// Size the drawing layer to the photo's aspect within the container
    fn setup_layer(&mut self) -> Result<()> {
        let size = self.layer_size();
        self.drawing.resize(size)?;
        self.history.clear();
        self.history.record(self.drawing.snapshot());
        debug!(layer = %size, "Drawing layer set up");
        Ok(())
    }

    fn layer_size(&self) -> Size {
        match &self.photo {
            Some(photo) => fit_within(Size::from(photo.dimensions()), self.container),
            None => self.container,
        }
    }

    fn photo_state(&self) -> Result<&PhotoState> {
        self.photo.as_ref().ok_or(PurikuraError::NoPhoto)
    }

    fn photo_state_mut(&mut self) -> Result<&mut PhotoState> {
        self.photo.as_mut().ok_or(PurikuraError::NoPhoto)
    }

    // ---- filter and background ---------------------------------------------

    /// Select the active filter preset
    pub fn apply_filter(&mut self, preset: FilterPreset) -> Result<()> {
        self.photo_state_mut()?.active_filter = preset;
        debug!(filter = %preset, "Filter applied");
        Ok(())
    }

    /// Replace the photo background with a catalog gradient
    ///
    /// # Errors
    /// `NoPhoto`, or `OperationInProgress` when the shared compositor is busy.
    pub async fn replace_background(&mut self, gradient: GradientId) -> Result<OutcomeKind> {
        let original = self.photo_state()?.original().clone();
        let outcome = self
            .background
            .replace_background(&original, gradient)
            .await?;
        let kind = outcome.kind();
        outcome.apply_to(self.photo_state_mut()?);
        Ok(kind)
    }

    /// Replace the photo background with white
    pub async fn remove_background(&mut self) -> Result<OutcomeKind> {
        let original = self.photo_state()?.original().clone();
        let outcome = self.background.remove_background(&original).await?;
        let kind = outcome.kind();
        outcome.apply_to(self.photo_state_mut()?);
        Ok(kind)
    }

    /// Restore the original photo
    pub async fn reset_background(&mut self) -> Result<OutcomeKind> {
        let original = self.photo_state()?.original().clone();
        let outcome = self.background.reset_background(&original).await?;
        let kind = outcome.kind();
        outcome.apply_to(self.photo_state_mut()?);
        Ok(kind)
    }

    // ---- drawing -----------------------------------------------------------

    pub fn set_color(&mut self, color: Color) {
        self.stroke.color = color;
    }

    /// Set the brush width in layer pixels
    pub fn set_brush_size(&mut self, size: f32) -> Result<()> {
        if !(size > 0.0) || !size.is_finite() {
            return Err(PurikuraError::invalid_input(format!(
                "Brush size must be positive, got {}",
                size
            )));
        }
        self.stroke.width = size;
        Ok(())
    }

    /// Convert a pointer position on the displayed layer to layer pixels
    #[must_use]
    pub fn map_client_point(&self, client: Point, display: Rect) -> Point {
        map_client_point(client, display, self.drawing.size())
    }

    pub fn begin_stroke(&mut self, point: Point) {
        self.last_point = Some(point);
    }

    /// Draw from the previous stroke point to `point`
    ///
    /// Ignored when no stroke is active.
    pub fn extend_stroke(&mut self, point: Point) {
        if let Some(last) = self.last_point {
            self.drawing.stroke_segment(last, point, &self.stroke);
            self.last_point = Some(point);
        }
    }

    /// Finish the active stroke and record it; returns whether one was active
    pub fn end_stroke(&mut self) -> bool {
        if self.last_point.take().is_none() {
            return false;
        }
        self.history.record(self.drawing.snapshot());
        true
    }

    /// Draw a polyline as one recorded stroke
    pub fn draw_stroke(&mut self, points: &[Point]) {
        let Some((first, rest)) = points.split_first() else {
            return;
        };
        self.begin_stroke(*first);
        for point in rest {
            self.extend_stroke(*point);
        }
        self.end_stroke();
    }

    /// Erase the drawing layer (recorded, so it can be undone)
    pub fn clear_drawing(&mut self) {
        self.drawing.clear();
        self.history.record(self.drawing.snapshot());
    }

    /// Step back one drawing snapshot; returns whether anything changed
    pub fn undo(&mut self) -> bool {
        match self.history.undo() {
            Some(snapshot) => {
                self.drawing.restore(snapshot);
                true
            },
            None => false,
        }
    }

    /// Step forward one drawing snapshot; returns whether anything changed
    pub fn redo(&mut self) -> bool {
        match self.history.redo() {
            Some(snapshot) => {
                self.drawing.restore(snapshot);
                true
            },
            None => false,
        }
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Re-fit the drawing layer to a new container, keeping its strokes
    ///
    /// The current strokes are redrawn at the origin without scaling.
    pub fn resize_viewport(&mut self, container: Size) -> Result<()> {
        if container.width == 0 || container.height == 0 {
            return Err(PurikuraError::invalid_input(format!(
                "Container must be non-empty, got {}",
                container
            )));
        }
        self.container = container;
        let snapshot = self.drawing.snapshot();
        self.drawing.resize(self.layer_size())?;
        self.drawing.restore(&snapshot);
        self.history.record(self.drawing.snapshot());
        debug!(container = %container, layer = %self.drawing.size(), "Viewport resized");
        Ok(())
    }

    // ---- stickers ----------------------------------------------------------

    /// Place a sticker at a random position
    pub fn add_sticker(&mut self, glyph: impl Into<String>) -> Uuid {
        self.stickers.add(glyph)
    }

    pub fn add_sticker_at(&mut self, glyph: impl Into<String>, position: NormalizedPoint) -> Uuid {
        self.stickers.add_at(glyph, position)
    }

    /// Move a sticker to follow a pointer over the displayed container
    pub fn drag_sticker(&mut self, id: Uuid, pointer: Point, container: Rect) -> Option<NormalizedPoint> {
        self.stickers.drag_to(id, pointer, container)
    }

    pub fn remove_sticker(&mut self, id: Uuid) -> bool {
        self.stickers.remove(id)
    }

    #[must_use]
    pub fn stickers(&self) -> &[StickerPlacement] {
        self.stickers.stickers()
    }

    // ---- output ------------------------------------------------------------

    /// Flatten the session into one raster fitting `bounds`
    pub fn compose(&self, bounds: Size) -> Result<RgbaImage> {
        let photo = self.photo_state()?;
        let _guard = ProcessingGuard::show(self.indicator.as_ref(), ProcessingStage::Composing);
        let input = CompositionInput {
            photo: &photo.current,
            filter: photo.active_filter,
            presentation: photo.presentation,
            drawing: &self.drawing,
            container: self.container,
            stickers: self.stickers.stickers(),
        };
        self.compositor.compose(&input, bounds)
    }

    /// Compose and encode as PNG
    pub fn export_png(&self, bounds: Size) -> Result<Vec<u8>> {
        let composite = self.compose(bounds)?;
        let _guard = ProcessingGuard::show(self.indicator.as_ref(), ProcessingStage::Exporting);
        ExportService::encode_png(&composite)
    }

    /// Compose and write a PNG to `target` (a file path, or a directory that
    /// receives a timestamped file)
    pub fn save(&self, bounds: Size, target: &Path) -> Result<PathBuf> {
        let composite = self.compose(bounds)?;
        let _guard = ProcessingGuard::show(self.indicator.as_ref(), ProcessingStage::Exporting);
        ExportService::save(&composite, target)
    }

    /// Discard the photo, drawing, stickers and history, and restore the
    /// configured brush
    pub fn reset(&mut self) -> Result<()> {
        self.photo = None;
        self.stickers.clear();
        self.last_point = None;
        self.stroke = StrokeStyle {
            color: self.config.drawing.color,
            width: self.config.drawing.brush_size,
        };
        self.drawing.clear();
        self.setup_layer()?;
        info!("Session reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::MockSegmenter;
    use crate::types::ActiveBackground;
    use image::{ImageFormat, Rgba};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 200, 255])
        });
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn session(adapter: SegmentationAdapter) -> EditorSession {
        let config = EditorConfig::default();
        let background = Arc::new(BackgroundCompositor::new(Arc::new(adapter)));
        let compositor = FinalCompositor::without_glyphs(config.export.clone());
        EditorSession::with_parts(
            config,
            background,
            compositor,
            Arc::new(NoOpIndicator),
            Size::new(200, 200),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_operations_need_a_photo() {
        let mut session = session(SegmentationAdapter::unavailable("none"));
        assert!(matches!(
            session.apply_filter(FilterPreset::Kawaii),
            Err(PurikuraError::NoPhoto)
        ));
        assert!(matches!(
            session.remove_background().await,
            Err(PurikuraError::NoPhoto)
        ));
        assert!(matches!(
            session.compose(Size::new(10, 10)),
            Err(PurikuraError::NoPhoto)
        ));
    }

    #[tokio::test]
    async fn test_acquire_sizes_layer_to_photo_aspect() {
        let mut session = session(SegmentationAdapter::unavailable("none"));
        session.acquire_photo(png_bytes(400, 300)).await.unwrap();

        assert_eq!(session.drawing().size(), Size::new(200, 150));
        assert_eq!(session.history().len(), 1);
        assert!(!session.can_undo());
    }

    #[tokio::test]
    async fn test_acquire_rejects_garbage() {
        let mut session = session(SegmentationAdapter::unavailable("none"));
        let result = session.acquire_photo(vec![1, 2, 3, 4]).await;
        assert!(matches!(result, Err(PurikuraError::ImageDecode(_))));
        assert!(session.photo().is_none());
    }

    #[tokio::test]
    async fn test_stroke_undo_redo() {
        let mut session = session(SegmentationAdapter::unavailable("none"));
        session.acquire_photo(png_bytes(100, 100)).await.unwrap();

        session.draw_stroke(&[Point::new(10.0, 10.0), Point::new(100.0, 100.0)]);
        assert!(!session.drawing().is_blank());
        assert!(session.can_undo());

        assert!(session.undo());
        assert!(session.drawing().is_blank());
        assert!(!session.undo());

        assert!(session.redo());
        assert!(!session.drawing().is_blank());
        assert!(!session.redo());
    }

    #[tokio::test]
    async fn test_end_stroke_without_begin_records_nothing() {
        let mut session = session(SegmentationAdapter::unavailable("none"));
        session.extend_stroke(Point::new(5.0, 5.0));
        assert!(!session.end_stroke());
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn test_background_fallback_updates_presentation() {
        let mut session = session(SegmentationAdapter::unavailable("none"));
        session.acquire_photo(png_bytes(40, 30)).await.unwrap();

        let kind = session.replace_background(GradientId::Gradient4).await.unwrap();
        assert_eq!(kind, OutcomeKind::Approximated);
        let photo = session.photo().unwrap();
        assert_eq!(
            photo.active_background,
            ActiveBackground::Gradient(GradientId::Gradient4)
        );
        assert_eq!(photo.presentation.backdrop, Some(GradientId::Gradient4));
    }

    #[tokio::test]
    async fn test_segmented_background_then_reset() {
        let adapter = SegmentationAdapter::with_segmenter(Box::new(MockSegmenter::left_half()));
        let mut session = session(adapter);
        session.acquire_photo(png_bytes(16, 8)).await.unwrap();
        let original = session.photo().unwrap().current.as_ref().clone();

        assert_eq!(session.remove_background().await.unwrap(), OutcomeKind::Segmented);
        assert_ne!(*session.photo().unwrap().current, original);

        assert_eq!(session.reset_background().await.unwrap(), OutcomeKind::Reverted);
        assert_eq!(*session.photo().unwrap().current, original);
    }

    #[tokio::test]
    async fn test_resize_viewport_keeps_strokes() {
        let mut session = session(SegmentationAdapter::unavailable("none"));
        session.acquire_photo(png_bytes(100, 100)).await.unwrap();
        session.draw_stroke(&[Point::new(2.0, 2.0), Point::new(20.0, 2.0)]);

        session.resize_viewport(Size::new(400, 300)).unwrap();
        assert_eq!(session.drawing().size(), Size::new(300, 300));
        assert!(!session.drawing().is_blank());
        assert_eq!(session.history().len(), 3);
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let mut session = session(SegmentationAdapter::unavailable("none"));
        session.acquire_photo(png_bytes(50, 50)).await.unwrap();
        session.add_sticker("⭐");
        session.draw_stroke(&[Point::new(0.0, 0.0), Point::new(50.0, 50.0)]);

        session.reset().unwrap();
        assert!(session.photo().is_none());
        assert!(session.stickers().is_empty());
        assert!(session.drawing().is_blank());
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.drawing().size(), Size::new(200, 200));
    }

    #[tokio::test]
    async fn test_reset_restores_configured_brush() {
        let mut session = session(SegmentationAdapter::unavailable("none"));
        let configured = session.stroke_style();
        session.set_color(Color::rgb(0, 255, 0));
        session.set_brush_size(30.0).unwrap();

        session.reset().unwrap();
        let restored = session.stroke_style();
        assert_eq!(restored.color, Color::rgb(0xff, 0x6b, 0x9d));
        assert_eq!(restored.color, configured.color);
        assert!((restored.width - 5.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_background_ops_leave_original_capture() {
        let adapter = SegmentationAdapter::with_segmenter(Box::new(MockSegmenter::left_half()));
        let mut session = session(adapter);
        let bytes = png_bytes(16, 8);
        session.acquire_photo(bytes.clone()).await.unwrap();

        session.replace_background(GradientId::Gradient2).await.unwrap();
        session.remove_background().await.unwrap();
        assert_eq!(session.photo().unwrap().original().encoded(), bytes.as_slice());
    }

    #[test]
    fn test_brush_size_validation() {
        let mut session = session(SegmentationAdapter::unavailable("none"));
        assert!(session.set_brush_size(0.0).is_err());
        assert!(session.set_brush_size(f32::NAN).is_err());
        session.set_brush_size(12.0).unwrap();
        assert!((session.stroke_style().width - 12.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_export_png_round_trips_dimensions() {
        let mut session = session(SegmentationAdapter::unavailable("none"));
        session.acquire_photo(png_bytes(40, 20)).await.unwrap();
        let bytes = session.export_png(Size::new(80, 80)).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (80, 40));
    }
}
