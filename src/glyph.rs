//! Sticker glyph rasterization

use crate::error::{PurikuraError, Result};
use crate::types::Color;
use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::{Rgba, RgbaImage};
use log::debug;
use std::path::Path;

/// Fonts tried, in order, when no font path is configured
const SYSTEM_FONT_PATHS: [&str; 8] = [
    "/usr/share/fonts/truetype/ancient-scripts/Symbola_hint.ttf",
    "/usr/share/fonts/TTF/Symbola.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Apple Symbols.ttf",
    "C:\\Windows\\Fonts\\seguisym.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// A rasterized line of text
#[derive(Debug, Clone)]
pub struct RenderedGlyph {
    /// Straight-alpha coverage image
    pub image: RgbaImage,
    /// Centre of the text's line box, relative to the image's top-left
    pub anchor: (f32, f32),
}

/// Turns sticker text into pixels
pub trait GlyphRasterizer: Send + Sync {
    /// Render `text` at `font_size` pixels; `None` when nothing is drawable
    fn rasterize(&self, text: &str, font_size: f32, color: Color) -> Option<RenderedGlyph>;
}

/// Outline-font rasterizer backed by `ab_glyph`
///
/// Colour bitmap emoji fonts carry no outlines, so glyphs are filled with a
/// single colour.
#[derive(Clone)]
pub struct FontGlyphRasterizer {
    font: FontArc,
}

impl std::fmt::Debug for FontGlyphRasterizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontGlyphRasterizer").finish_non_exhaustive()
    }
}

impl FontGlyphRasterizer {
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let font = FontArc::try_from_vec(data)
            .map_err(|e| PurikuraError::invalid_config(format!("Invalid font data: {}", e)))?;
        Ok(Self { font })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Self::from_bytes(data)
    }

    /// First loadable font from the well-known system locations
    #[must_use]
    pub fn system() -> Option<Self> {
        SYSTEM_FONT_PATHS.iter().find_map(|path| {
            let rasterizer = Self::from_file(path).ok()?;
            debug!("Using sticker font {}", path);
            Some(rasterizer)
        })
    }
}

impl GlyphRasterizer for FontGlyphRasterizer {
    fn rasterize(&self, text: &str, font_size: f32, color: Color) -> Option<RenderedGlyph> {
        if text.is_empty() || !(font_size > 0.0) {
            return None;
        }

        let scale = PxScale::from(font_size);
        let scaled_font = self.font.as_scaled(scale);
        let ascent = scaled_font.ascent();
        let line_height = ascent - scaled_font.descent();

        // Lay out on a baseline at `ascent`, so the line box spans y in [0, line_height]
        let mut cursor_x = 0.0;
        let mut outlines = Vec::new();
        for ch in text.chars() {
            let glyph_id = scaled_font.glyph_id(ch);
            let glyph = glyph_id.with_scale_and_position(scale, ab_glyph::point(cursor_x, ascent));
            if let Some(outlined) = self.font.outline_glyph(glyph) {
                outlines.push(outlined);
            }
            cursor_x += scaled_font.h_advance(glyph_id);
        }
        if outlines.is_empty() {
            return None;
        }

        let (mut min_x, mut min_y) = (0.0_f32, 0.0_f32);
        let (mut max_x, mut max_y) = (cursor_x, line_height);
        for outlined in &outlines {
            let bounds = outlined.px_bounds();
            min_x = min_x.min(bounds.min.x);
            min_y = min_y.min(bounds.min.y);
            max_x = max_x.max(bounds.max.x);
            max_y = max_y.max(bounds.max.y);
        }
        let (min_x, min_y) = (min_x.floor(), min_y.floor());
        let width = (max_x.ceil() - min_x).max(1.0) as u32;
        let height = (max_y.ceil() - min_y).max(1.0) as u32;

        let mut image = RgbaImage::from_pixel(width, height, Rgba([color.r, color.g, color.b, 0]));
        for outlined in &outlines {
            let bounds = outlined.px_bounds();
            let left = (bounds.min.x - min_x) as i64;
            let top = (bounds.min.y - min_y) as i64;
            outlined.draw(|px, py, coverage| {
                let x = left + i64::from(px);
                let y = top + i64::from(py);
                if x < 0 || y < 0 || x >= i64::from(width) || y >= i64::from(height) {
                    return;
                }
                let pixel = image.get_pixel_mut(x as u32, y as u32);
                let alpha = (coverage.clamp(0.0, 1.0) * f32::from(color.a)).round() as u8;
                pixel[3] = pixel[3].max(alpha);
            });
        }

        Some(RenderedGlyph {
            image,
            anchor: (cursor_x / 2.0 - min_x, line_height / 2.0 - min_y),
        })
    }
}
