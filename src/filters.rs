//! CSS-style filter expressions and their pixel equivalents
//!
//! Filter presets are stored as CSS filter expressions. This module parses an
//! expression into a [`FilterChain`] and applies it to an RGBA raster using the
//! colour matrices and transfer functions of the W3C Filter Effects module.
//! Every function is applied in order and channel values are clamped after
//! each step, as browsers do.

use crate::catalog::FilterPreset;
use crate::error::{PurikuraError, Result};
use image::{Rgba, RgbaImage};

/// One filter function
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterOp {
    /// `sepia(amount)`, amount in `[0, 1]`
    Sepia(f32),
    /// `saturate(amount)`, 1 = unchanged
    Saturate(f32),
    /// `contrast(amount)`, 1 = unchanged
    Contrast(f32),
    /// `brightness(amount)`, 1 = unchanged
    Brightness(f32),
    /// `hue-rotate(angle)` in degrees
    HueRotate(f32),
    /// `grayscale(amount)`, amount in `[0, 1]`
    Grayscale(f32),
    /// `invert(amount)`, amount in `[0, 1]`
    Invert(f32),
    /// `opacity(amount)`, amount in `[0, 1]`
    Opacity(f32),
    /// `blur(radius)` in pixels, applied as a gaussian with sigma = radius
    Blur(f32),
}

type Matrix = [[f32; 3]; 3];

impl FilterOp {
    fn parse(name: &str, argument: &str) -> Result<Self> {
        let op = match name {
            "sepia" => Self::Sepia(parse_amount(name, argument)?.min(1.0)),
            "saturate" => Self::Saturate(parse_amount(name, argument)?),
            "contrast" => Self::Contrast(parse_amount(name, argument)?),
            "brightness" => Self::Brightness(parse_amount(name, argument)?),
            "grayscale" => Self::Grayscale(parse_amount(name, argument)?.min(1.0)),
            "invert" => Self::Invert(parse_amount(name, argument)?.min(1.0)),
            "opacity" => Self::Opacity(parse_amount(name, argument)?.min(1.0)),
            "hue-rotate" => Self::HueRotate(parse_angle(argument)?),
            "blur" => Self::Blur(parse_length(argument)?),
            other => {
                return Err(PurikuraError::invalid_input(format!(
                    "Unsupported filter function '{}'",
                    other
                )))
            },
        };
        Ok(op)
    }

    /// Colour matrix for the matrix-based functions
    fn matrix(self) -> Option<Matrix> {
        match self {
            Self::Sepia(amount) => {
                let a = 1.0 - amount;
                Some([
                    [0.393 + 0.607 * a, 0.769 - 0.769 * a, 0.189 - 0.189 * a],
                    [0.349 - 0.349 * a, 0.686 + 0.314 * a, 0.168 - 0.168 * a],
                    [0.272 - 0.272 * a, 0.534 - 0.534 * a, 0.131 + 0.869 * a],
                ])
            },
            Self::Saturate(s) => Some([
                [0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s],
                [0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s],
                [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s],
            ]),
            Self::Grayscale(amount) => {
                let a = 1.0 - amount;
                Some([
                    [0.2126 + 0.7874 * a, 0.7152 - 0.7152 * a, 0.0722 - 0.0722 * a],
                    [0.2126 - 0.2126 * a, 0.7152 + 0.2848 * a, 0.0722 - 0.0722 * a],
                    [0.2126 - 0.2126 * a, 0.7152 - 0.7152 * a, 0.0722 + 0.9278 * a],
                ])
            },
            Self::HueRotate(degrees) => {
                let (sin, cos) = degrees.to_radians().sin_cos();
                Some([
                    [
                        0.213 + cos * 0.787 - sin * 0.213,
                        0.715 - cos * 0.715 - sin * 0.715,
                        0.072 - cos * 0.072 + sin * 0.928,
                    ],
                    [
                        0.213 - cos * 0.213 + sin * 0.143,
                        0.715 + cos * 0.285 + sin * 0.140,
                        0.072 - cos * 0.072 - sin * 0.283,
                    ],
                    [
                        0.213 - cos * 0.213 - sin * 0.787,
                        0.715 - cos * 0.715 + sin * 0.715,
                        0.072 + cos * 0.928 + sin * 0.072,
                    ],
                ])
            },
            _ => None,
        }
    }

    /// Linear transfer `slope * v + intercept` for the component-wise functions
    fn transfer(self) -> Option<(f32, f32)> {
        match self {
            Self::Brightness(b) => Some((b, 0.0)),
            Self::Contrast(c) => Some((c, 0.5 - 0.5 * c)),
            Self::Invert(a) => Some((1.0 - 2.0 * a, a)),
            _ => None,
        }
    }

    /// Whether this function leaves every pixel unchanged
    #[must_use]
    pub fn is_identity(self) -> bool {
        match self {
            Self::Sepia(a) | Self::Grayscale(a) | Self::Invert(a) | Self::HueRotate(a) | Self::Blur(a) => {
                a.abs() < f32::EPSILON
            },
            Self::Saturate(a) | Self::Contrast(a) | Self::Brightness(a) | Self::Opacity(a) => {
                (a - 1.0).abs() < f32::EPSILON
            },
        }
    }

    fn apply(self, image: &mut RgbaImage) {
        if self.is_identity() {
            return;
        }

        if let Self::Blur(radius) = self {
            *image = image::imageops::blur(image, radius);
            return;
        }

        if let Self::Opacity(amount) = self {
            for pixel in image.pixels_mut() {
                pixel[3] = to_channel(f32::from(pixel[3]) / 255.0 * amount);
            }
            return;
        }

        if let Some(matrix) = self.matrix() {
            for pixel in image.pixels_mut() {
                apply_matrix(pixel, &matrix);
            }
        } else if let Some((slope, intercept)) = self.transfer() {
            for pixel in image.pixels_mut() {
                for channel in pixel.0.iter_mut().take(3) {
                    *channel = to_channel(f32::from(*channel) / 255.0 * slope + intercept);
                }
            }
        }
    }
}

fn apply_matrix(pixel: &mut Rgba<u8>, matrix: &Matrix) {
    let [r, g, b, _] = pixel.0;
    let rgb = [
        f32::from(r) / 255.0,
        f32::from(g) / 255.0,
        f32::from(b) / 255.0,
    ];
    for (channel, row) in pixel.0.iter_mut().zip(matrix.iter()) {
        let value = row[0] * rgb[0] + row[1] * rgb[1] + row[2] * rgb[2];
        *channel = to_channel(value);
    }
}

fn to_channel(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn parse_amount(name: &str, argument: &str) -> Result<f32> {
    let argument = argument.trim();
    if argument.is_empty() {
        return Ok(1.0);
    }
    let value = if let Some(percent) = argument.strip_suffix('%') {
        parse_number(percent)? / 100.0
    } else {
        parse_number(argument)?
    };
    if value < 0.0 {
        return Err(PurikuraError::invalid_input(format!(
            "Negative amount for {}(): {}",
            name, argument
        )));
    }
    Ok(value)
}

fn parse_angle(argument: &str) -> Result<f32> {
    let argument = argument.trim();
    if argument.is_empty() {
        return Ok(0.0);
    }
    if let Some(deg) = argument.strip_suffix("deg") {
        parse_number(deg)
    } else if let Some(grad) = argument.strip_suffix("grad") {
        Ok(parse_number(grad)? * 0.9)
    } else if let Some(rad) = argument.strip_suffix("rad") {
        Ok(parse_number(rad)?.to_degrees())
    } else if let Some(turn) = argument.strip_suffix("turn") {
        Ok(parse_number(turn)? * 360.0)
    } else {
        // Only a bare zero is a valid unitless angle
        let value = parse_number(argument)?;
        if value == 0.0 {
            Ok(0.0)
        } else {
            Err(PurikuraError::invalid_input(format!(
                "hue-rotate() needs an angle unit: {}",
                argument
            )))
        }
    }
}

fn parse_length(argument: &str) -> Result<f32> {
    let argument = argument.trim();
    if argument.is_empty() {
        return Ok(0.0);
    }
    let value = match argument.strip_suffix("px") {
        Some(px) => parse_number(px)?,
        None => parse_number(argument)?,
    };
    if value < 0.0 {
        return Err(PurikuraError::invalid_input(format!(
            "Negative blur radius: {}",
            argument
        )));
    }
    Ok(value)
}

fn parse_number(text: &str) -> Result<f32> {
    text.trim()
        .parse::<f32>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| PurikuraError::invalid_input(format!("Invalid number '{}'", text)))
}

/// An ordered list of filter functions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterChain {
    ops: Vec<FilterOp>,
}

impl FilterChain {
    /// Parse a CSS filter expression such as `sepia(80%) contrast(110%)`
    ///
    /// `none` and the empty string yield an empty chain.
    pub fn parse(expression: &str) -> Result<Self> {
        let expression = expression.trim();
        if expression.is_empty() || expression.eq_ignore_ascii_case("none") {
            return Ok(Self::default());
        }

        let mut ops = Vec::new();
        let mut rest = expression;
        while !rest.is_empty() {
            let open = rest.find('(').ok_or_else(|| {
                PurikuraError::invalid_input(format!("Expected '(' in filter expression: {}", rest))
            })?;
            let close = rest.find(')').ok_or_else(|| {
                PurikuraError::invalid_input(format!("Unclosed '(' in filter expression: {}", rest))
            })?;
            if close < open {
                return Err(PurikuraError::invalid_input(format!(
                    "Unbalanced parentheses in filter expression: {}",
                    expression
                )));
            }

            let name = rest[..open].trim().to_ascii_lowercase();
            if name.is_empty() {
                return Err(PurikuraError::invalid_input(format!(
                    "Missing function name in filter expression: {}",
                    expression
                )));
            }
            let argument = &rest[open + 1..close];
            ops.push(FilterOp::parse(&name, argument)?);

            rest = rest[close + 1..].trim_start();
        }

        Ok(Self { ops })
    }

    /// The chain for a catalog preset
    pub fn for_preset(preset: FilterPreset) -> Result<Self> {
        Self::parse(preset.css())
    }

    #[must_use]
    pub fn ops(&self) -> &[FilterOp] {
        &self.ops
    }

    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.ops.iter().all(|op| op.is_identity())
    }

    /// Apply every function in order, in place
    pub fn apply(&self, image: &mut RgbaImage) {
        for op in &self.ops {
            op.apply(image);
        }
    }

    /// Apply to a copy, leaving the input untouched
    #[must_use]
    pub fn applied_to(&self, image: &RgbaImage) -> RgbaImage {
        let mut output = image.clone();
        self.apply(&mut output);
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(r: u8, g: u8, b: u8) -> RgbaImage {
        RgbaImage::from_pixel(4, 4, Rgba([r, g, b, 255]))
    }

    #[test]
    fn test_parse_every_preset() {
        for preset in FilterPreset::ALL {
            let chain = FilterChain::for_preset(preset).unwrap();
            assert_eq!(chain.is_identity(), preset == FilterPreset::None, "{}", preset);
        }
        let vintage = FilterChain::for_preset(FilterPreset::Vintage).unwrap();
        assert_eq!(
            vintage.ops(),
            &[
                FilterOp::Sepia(0.8),
                FilterOp::Saturate(1.2),
                FilterOp::Contrast(1.1)
            ]
        );
        let neon = FilterChain::for_preset(FilterPreset::Neon).unwrap();
        assert_eq!(neon.ops().last(), Some(&FilterOp::HueRotate(90.0)));
        let soft = FilterChain::for_preset(FilterPreset::Soft).unwrap();
        assert_eq!(soft.ops().last(), Some(&FilterOp::Blur(0.5)));
    }

    #[test]
    fn test_parse_units_and_errors() {
        let chain = FilterChain::parse("hue-rotate(0.5turn) brightness(2) invert()").unwrap();
        assert_eq!(
            chain.ops(),
            &[
                FilterOp::HueRotate(180.0),
                FilterOp::Brightness(2.0),
                FilterOp::Invert(1.0)
            ]
        );
        assert!(FilterChain::parse("sparkle(10%)").is_err());
        assert!(FilterChain::parse("sepia(80%").is_err());
        assert!(FilterChain::parse("hue-rotate(10)").is_err());
        assert!(FilterChain::parse("brightness(-1)").is_err());
        assert!(FilterChain::parse("none").unwrap().ops().is_empty());
    }

    #[test]
    fn test_identity_chain_leaves_pixels() {
        let image = solid(12, 200, 99);
        let chain = FilterChain::parse("saturate(100%) brightness(1) hue-rotate(0deg)").unwrap();
        assert!(chain.is_identity());
        assert_eq!(chain.applied_to(&image), image);
    }

    #[test]
    fn test_brightness_and_contrast_transfer() {
        let mut image = solid(100, 100, 100);
        FilterChain::parse("brightness(200%)").unwrap().apply(&mut image);
        assert_eq!(image.get_pixel(0, 0).0, [200, 200, 200, 255]);

        let mut image = solid(200, 128, 50);
        FilterChain::parse("contrast(0)").unwrap().apply(&mut image);
        // contrast(0) collapses every channel to mid grey
        assert_eq!(image.get_pixel(1, 1).0, [128, 128, 128, 255]);
    }

    #[test]
    fn test_full_grayscale_equalizes_channels() {
        let mut image = solid(255, 0, 0);
        FilterChain::parse("grayscale(1)").unwrap().apply(&mut image);
        let [r, g, b, a] = image.get_pixel(2, 2).0;
        assert_eq!(r, g);
        assert_eq!(g, b);
        assert_eq!(a, 255);
    }

    #[test]
    fn test_saturate_zero_on_grey_is_stable() {
        let image = solid(90, 90, 90);
        let out = FilterChain::parse("saturate(0)").unwrap().applied_to(&image);
        assert_eq!(out.get_pixel(0, 0).0, [90, 90, 90, 255]);
    }

    #[test]
    fn test_opacity_scales_alpha_only() {
        let mut image = solid(10, 20, 30);
        FilterChain::parse("opacity(50%)").unwrap().apply(&mut image);
        assert_eq!(image.get_pixel(0, 0).0, [10, 20, 30, 128]);
    }

    #[test]
    fn test_blur_keeps_dimensions_and_solid_colour() {
        let image = solid(40, 80, 120);
        let out = FilterChain::parse("blur(1px)").unwrap().applied_to(&image);
        assert_eq!(out.dimensions(), image.dimensions());
        let [r, g, b, _] = out.get_pixel(2, 2).0;
        assert!((i32::from(r) - 40).abs() <= 1);
        assert!((i32::from(g) - 80).abs() <= 1);
        assert!((i32::from(b) - 120).abs() <= 1);
    }
}
