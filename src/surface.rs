//! Drawing layer: the freehand annotation raster
//!
//! The layer is a premultiplied `tiny_skia::Pixmap` sized to the editing
//! viewport, not to the photo. Snapshots are cheap shared copies used by the
//! edit history.

use crate::error::{PurikuraError, Result};
use crate::geometry::{Point, Size};
use crate::types::Color;
use image::{Rgba, RgbaImage};
use std::sync::Arc;
use tiny_skia::{
    FilterQuality, LineCap, LineJoin, Paint, PathBuilder, Pixmap, PixmapPaint, Stroke, Transform,
};

/// Brush settings for freehand strokes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeStyle {
    pub color: Color,
    pub width: f32,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            color: Color::rgb(0xff, 0x6b, 0x9d),
            width: 5.0,
        }
    }
}

/// Immutable copy of the layer pixels
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSnapshot {
    pixmap: Arc<Pixmap>,
}

impl LayerSnapshot {
    #[must_use]
    pub fn size(&self) -> Size {
        Size::new(self.pixmap.width(), self.pixmap.height())
    }

    /// Straight-alpha copy of the snapshot
    #[must_use]
    pub fn to_rgba_image(&self) -> RgbaImage {
        pixmap_to_rgba(&self.pixmap)
    }
}

/// The freehand drawing raster
#[derive(Debug, Clone)]
pub struct DrawingLayer {
    pixmap: Pixmap,
}

impl DrawingLayer {
    /// Create a transparent layer
    pub fn new(size: Size) -> Result<Self> {
        Ok(Self {
            pixmap: new_pixmap(size)?,
        })
    }

    #[must_use]
    pub fn size(&self) -> Size {
        Size::new(self.pixmap.width(), self.pixmap.height())
    }

    /// Draw one round-capped line segment
    ///
    /// Zero-length segments draw nothing.
    pub fn stroke_segment(&mut self, from: Point, to: Point, style: &StrokeStyle) {
        let mut builder = PathBuilder::new();
        builder.move_to(from.x, from.y);
        builder.line_to(to.x, to.y);
        let Some(path) = builder.finish() else {
            return;
        };

        let mut paint = Paint::default();
        paint.set_color_rgba8(style.color.r, style.color.g, style.color.b, style.color.a);
        paint.anti_alias = true;

        let stroke = Stroke {
            width: style.width,
            line_cap: LineCap::Round,
            line_join: LineJoin::Round,
            ..Stroke::default()
        };

        self.pixmap
            .stroke_path(&path, &paint, &stroke, Transform::identity(), None);
    }

    /// Erase every pixel
    pub fn clear(&mut self) {
        self.pixmap.fill(tiny_skia::Color::TRANSPARENT);
    }

    /// Replace the layer with a blank one of a new size
    pub fn resize(&mut self, size: Size) -> Result<()> {
        self.pixmap = new_pixmap(size)?;
        Ok(())
    }

    #[must_use]
    pub fn snapshot(&self) -> LayerSnapshot {
        LayerSnapshot {
            pixmap: Arc::new(self.pixmap.clone()),
        }
    }

    /// Overwrite the layer with a snapshot drawn at the origin
    ///
    /// A snapshot of a different size is clipped to the layer; uncovered
    /// pixels end up transparent.
    pub fn restore(&mut self, snapshot: &LayerSnapshot) {
        if snapshot.size() == self.size() {
            self.pixmap.data_mut().copy_from_slice(snapshot.pixmap.data());
            return;
        }

        self.clear();
        let paint = PixmapPaint {
            blend_mode: tiny_skia::BlendMode::Source,
            ..PixmapPaint::default()
        };
        self.pixmap
            .draw_pixmap(0, 0, (*snapshot.pixmap).as_ref(), &paint, Transform::identity(), None);
    }

    /// Whether no pixel has been drawn
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.pixmap.pixels().iter().all(|pixel| pixel.alpha() == 0)
    }

    /// Straight-alpha copy of the layer
    #[must_use]
    pub fn to_rgba_image(&self) -> RgbaImage {
        pixmap_to_rgba(&self.pixmap)
    }

    /// Render the layer stretched to `target` with independent x/y factors
    pub fn render_scaled(&self, target: Size) -> Result<RgbaImage> {
        if target == self.size() {
            return Ok(self.to_rgba_image());
        }

        let mut scaled = new_pixmap(target)?;
        let scale_x = target.width as f32 / self.pixmap.width() as f32;
        let scale_y = target.height as f32 / self.pixmap.height() as f32;
        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        scaled.draw_pixmap(
            0,
            0,
            self.pixmap.as_ref(),
            &paint,
            Transform::from_scale(scale_x, scale_y),
            None,
        );
        Ok(pixmap_to_rgba(&scaled))
    }
}

fn new_pixmap(size: Size) -> Result<Pixmap> {
    Pixmap::new(size.width, size.height).ok_or_else(|| {
        PurikuraError::invalid_input(format!("Cannot create a {} drawing layer", size))
    })
}

fn pixmap_to_rgba(pixmap: &Pixmap) -> RgbaImage {
    let mut image = RgbaImage::new(pixmap.width(), pixmap.height());
    for (out, pixel) in image.pixels_mut().zip(pixmap.pixels()) {
        let color = pixel.demultiply();
        *out = Rgba([color.red(), color.green(), color.blue(), color.alpha()]);
    }
    image
}
