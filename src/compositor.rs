//! Final compositor: flattens every layer into the export raster
//!
//! Layers, bottom to top:
//! 1. the simple-mode gradient backdrop, if the presentation carries one
//! 2. the current photo, filtered and blended per the presentation
//! 3. the drawing layer, stretched from container space to output space
//! 4. stickers, centred on their normalized positions
//!
//! Filters and blend settings only ever affect the photo draw.

use crate::catalog::FilterPreset;
use crate::config::ExportConfig;
use crate::error::{PurikuraError, Result};
use crate::filters::FilterChain;
use crate::geometry::{fit_within, Size};
use crate::glyph::{FontGlyphRasterizer, GlyphRasterizer};
use crate::gradient;
use crate::stickers::StickerPlacement;
use crate::surface::DrawingLayer;
use crate::types::{BlendMode, PhotoPresentation};
use image::imageops::FilterType;
use image::{Rgba, RgbaImage};
use std::sync::Arc;
use tracing::{debug, instrument, span, warn, Level};

/// Everything the compositor reads
#[derive(Debug, Clone, Copy)]
pub struct CompositionInput<'a> {
    /// Current photo raster at native resolution
    pub photo: &'a RgbaImage,
    pub filter: FilterPreset,
    pub presentation: PhotoPresentation,
    pub drawing: &'a DrawingLayer,
    /// Size of the editing container the drawing layer and stickers live in
    pub container: Size,
    pub stickers: &'a [StickerPlacement],
}

/// Assembles the export raster
pub struct FinalCompositor {
    config: ExportConfig,
    rasterizer: Option<Arc<dyn GlyphRasterizer>>,
}

impl std::fmt::Debug for FinalCompositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinalCompositor")
            .field("config", &self.config)
            .field("has_rasterizer", &self.rasterizer.is_some())
            .finish()
    }
}

impl FinalCompositor {
    /// Create a compositor, loading the sticker font
    ///
    /// A configured `font_path` must load. Without one, the first usable
    /// system font is taken; if there is none, stickers are skipped.
    pub fn new(config: ExportConfig) -> Result<Self> {
        let rasterizer: Option<Arc<dyn GlyphRasterizer>> = match &config.font_path {
            Some(path) => Some(Arc::new(FontGlyphRasterizer::from_file(path).map_err(|e| {
                PurikuraError::invalid_config(format!(
                    "Failed to load sticker font {}: {}",
                    path.display(),
                    e
                ))
            })?)),
            None => FontGlyphRasterizer::system().map(|r| Arc::new(r) as Arc<dyn GlyphRasterizer>),
        };
        if rasterizer.is_none() {
            warn!("No sticker font found; stickers will not be rendered");
        }
        Ok(Self { config, rasterizer })
    }

    /// Create a compositor with an explicit glyph rasterizer
    #[must_use]
    pub fn with_rasterizer(config: ExportConfig, rasterizer: Arc<dyn GlyphRasterizer>) -> Self {
        Self {
            config,
            rasterizer: Some(rasterizer),
        }
    }

    /// Create a compositor that draws no stickers
    #[must_use]
    pub fn without_glyphs(config: ExportConfig) -> Self {
        Self {
            config,
            rasterizer: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Output size for a photo fitted into `bounds`
    #[must_use]
    pub fn output_size(photo: &RgbaImage, bounds: Size) -> Size {
        fit_within(Size::from(photo.dimensions()), bounds)
    }

    /// Flatten all layers into a raster that fits `bounds`
    #[instrument(skip_all, fields(bounds = %bounds, stickers = input.stickers.len()))]
    pub fn compose(&self, input: &CompositionInput<'_>, bounds: Size) -> Result<RgbaImage> {
        if bounds.width == 0 || bounds.height == 0 {
            return Err(PurikuraError::invalid_input(format!(
                "Output bounds must be non-empty, got {}",
                bounds
            )));
        }
        if input.container.width == 0 || input.container.height == 0 {
            return Err(PurikuraError::invalid_input(format!(
                "Container must be non-empty, got {}",
                input.container
            )));
        }

        let out = Self::output_size(input.photo, bounds);
        debug!(width = out.width, height = out.height, "Composing final image");

        let mut canvas = match input.presentation.backdrop {
            Some(backdrop) => gradient::render(backdrop, out.width, out.height),
            None => RgbaImage::new(out.width, out.height),
        };

        {
            let _span = span!(Level::DEBUG, "photo_layer", filter = %input.filter).entered();
            let photo = self.prepare_photo(input.photo, input.filter, out)?;
            draw_blended(
                &mut canvas,
                &photo,
                input.presentation.opacity,
                input.presentation.blend_mode,
            );
        }

        {
            let _span = span!(Level::DEBUG, "drawing_layer").entered();
            let layer = input.drawing.size();
            let scaled = Size::new(
                scale_dimension(layer.width, out.width, input.container.width),
                scale_dimension(layer.height, out.height, input.container.height),
            );
            let strokes = input.drawing.render_scaled(scaled)?;
            draw_over(&mut canvas, &strokes, 0, 0);
        }

        if !input.stickers.is_empty() {
            let _span = span!(Level::DEBUG, "stickers").entered();
            self.draw_stickers(&mut canvas, input.stickers, out);
        }

        Ok(canvas)
    }

    fn prepare_photo(&self, photo: &RgbaImage, filter: FilterPreset, out: Size) -> Result<RgbaImage> {
        let mut resized = if photo.dimensions() == (out.width, out.height) {
            photo.clone()
        } else {
            image::imageops::resize(
                photo,
                out.width,
                out.height,
                FilterType::from(self.config.resize_filter),
            )
        };

        let chain = FilterChain::for_preset(filter)?;
        if !chain.is_identity() {
            chain.apply(&mut resized);
        }
        Ok(resized)
    }

    fn draw_stickers(&self, canvas: &mut RgbaImage, stickers: &[StickerPlacement], out: Size) {
        let Some(rasterizer) = &self.rasterizer else {
            warn!(count = stickers.len(), "Skipping stickers: no font available");
            return;
        };

        let font_size = self.config.sticker_scale * out.min_side() as f32;
        for sticker in stickers {
            let Some(glyph) =
                rasterizer.rasterize(&sticker.glyph, font_size, self.config.sticker_color)
            else {
                warn!(glyph = %sticker.glyph, "Sticker glyph could not be rendered");
                continue;
            };
            let centre = sticker.position.to_pixels(out);
            let left = (centre.x - glyph.anchor.0).round() as i64;
            let top = (centre.y - glyph.anchor.1).round() as i64;
            draw_over(canvas, &glyph.image, left, top);
        }
    }
}

fn scale_dimension(layer: u32, out: u32, container: u32) -> u32 {
    let scaled = f64::from(layer) * f64::from(out) / f64::from(container.max(1));
    (scaled.round() as u32).max(1)
}

/// Source-over `top` onto `canvas` with its top-left at `(left, top_y)`, clipped
fn draw_over(canvas: &mut RgbaImage, top: &RgbaImage, left: i64, top_y: i64) {
    for (x, y, pixel) in top.enumerate_pixels() {
        let cx = left + i64::from(x);
        let cy = top_y + i64::from(y);
        if cx < 0 || cy < 0 || cx >= i64::from(canvas.width()) || cy >= i64::from(canvas.height()) {
            continue;
        }
        let dst = canvas.get_pixel_mut(cx as u32, cy as u32);
        *dst = source_over(*dst, *pixel, 1.0);
    }
}

/// Draw a same-sized photo over the canvas with opacity and blend mode
fn draw_blended(canvas: &mut RgbaImage, photo: &RgbaImage, opacity: f32, mode: BlendMode) {
    for (x, y, pixel) in photo.enumerate_pixels() {
        if x >= canvas.width() || y >= canvas.height() {
            continue;
        }
        let dst = canvas.get_pixel_mut(x, y);
        let src = match mode {
            BlendMode::Normal => *pixel,
            BlendMode::Multiply => multiplied(*dst, *pixel),
        };
        *dst = source_over(*dst, src, opacity);
    }
}

/// Mix the multiply result into the source colour, weighted by backdrop alpha
fn multiplied(backdrop: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let backdrop_alpha = f32::from(backdrop[3]) / 255.0;
    let mut out = src;
    for channel in 0..3 {
        let cs = f32::from(src[channel]) / 255.0;
        let cb = f32::from(backdrop[channel]) / 255.0;
        let mixed = (1.0 - backdrop_alpha) * cs + backdrop_alpha * cs * cb;
        out[channel] = to_u8(mixed);
    }
    out
}

/// Straight-alpha source-over with an extra opacity on the source
fn source_over(dst: Rgba<u8>, src: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    let sa = f32::from(src[3]) / 255.0 * opacity.clamp(0.0, 1.0);
    if sa <= 0.0 {
        return dst;
    }
    let da = f32::from(dst[3]) / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let mut out = [0u8; 4];
    for channel in 0..3 {
        let cs = f32::from(src[channel]) / 255.0;
        let cd = f32::from(dst[channel]) / 255.0;
        out[channel] = to_u8((cs * sa + cd * da * (1.0 - sa)) / out_a);
    }
    out[3] = to_u8(out_a);
    Rgba(out)
}

fn to_u8(value: f32) -> u8 {
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}
