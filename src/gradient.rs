//! Linear gradient rendering
//!
//! Gradients run corner to corner, from `(0, 0)` to `(w, h)`, with the colour
//! at each pixel centre given by its projection onto that diagonal.

use crate::catalog::GradientId;
use crate::types::Color;
use image::{Rgba, RgbaImage};

/// Render a catalog gradient at the given size
#[must_use]
pub fn render(gradient: GradientId, width: u32, height: u32) -> RgbaImage {
    let (start, end) = gradient.stops();
    render_stops(start, end, width, height)
}

/// Render a two-stop diagonal gradient
#[must_use]
pub fn render_stops(start: Color, end: Color, width: u32, height: u32) -> RgbaImage {
    let w = width as f32;
    let h = height as f32;
    let length_sq = (w * w + h * h).max(f32::EPSILON);

    RgbaImage::from_fn(width, height, |x, y| {
        let px = x as f32 + 0.5;
        let py = y as f32 + 0.5;
        let t = ((px * w + py * h) / length_sq).clamp(0.0, 1.0);
        lerp(start, end, t)
    })
}

fn lerp(start: Color, end: Color, t: f32) -> Rgba<u8> {
    let mix = |a: u8, b: u8| -> u8 {
        let value = f32::from(a) + (f32::from(b) - f32::from(a)) * t;
        value.round().clamp(0.0, 255.0) as u8
    };
    Rgba([
        mix(start.r, end.r),
        mix(start.g, end.g),
        mix(start.b, end.b),
        mix(start.a, end.a),
    ])
}
