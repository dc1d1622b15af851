//! Core types shared by the editing pipeline

use crate::error::{PurikuraError, Result};
use crate::catalog::{FilterPreset, GradientId};
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

/// Straight-alpha RGBA colour parsed from `#rrggbb` / `#rrggbbaa` notation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Self = Self::rgb(255, 255, 255);
    pub const BLACK: Self = Self::rgb(0, 0, 0);

    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa` (the leading `#` is optional)
    pub fn from_hex(hex: &str) -> Result<Self> {
        let digits = hex.trim().trim_start_matches('#');
        let parse = |s: &str| {
            u8::from_str_radix(s, 16)
                .map_err(|_| PurikuraError::invalid_input(format!("Invalid hex colour '{}'", hex)))
        };
        let expand = |s: &str| parse(&format!("{s}{s}"));

        if !digits.is_ascii() {
            return Err(PurikuraError::invalid_input(format!("Invalid hex colour '{}'", hex)));
        }

        match digits.len() {
            3 => Ok(Self::rgb(
                expand(&digits[0..1])?,
                expand(&digits[1..2])?,
                expand(&digits[2..3])?,
            )),
            6 => Ok(Self::rgb(
                parse(&digits[0..2])?,
                parse(&digits[2..4])?,
                parse(&digits[4..6])?,
            )),
            8 => Ok(Self {
                r: parse(&digits[0..2])?,
                g: parse(&digits[2..4])?,
                b: parse(&digits[4..6])?,
                a: parse(&digits[6..8])?,
            }),
            _ => Err(PurikuraError::invalid_input(format!(
                "Invalid hex colour '{}' (expected #rgb, #rrggbb or #rrggbbaa)",
                hex
            ))),
        }
    }

    #[must_use]
    pub fn to_hex(self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }

    #[must_use]
    pub fn to_rgba(self) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, self.a])
    }
}

impl TryFrom<String> for Color {
    type Error = PurikuraError;

    fn try_from(value: String) -> Result<Self> {
        Self::from_hex(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Per-pixel person classification at the source image's native resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationMask {
    /// Row-major person flags (`true` = person)
    pub data: Vec<bool>,
    /// Mask dimensions (width, height)
    pub dimensions: (u32, u32),
}

impl SegmentationMask {
    /// Create a mask, checking that the data covers every pixel exactly once
    pub fn new(data: Vec<bool>, dimensions: (u32, u32)) -> Result<Self> {
        let expected = dimensions.0 as usize * dimensions.1 as usize;
        if data.len() != expected {
            return Err(PurikuraError::segmentation(format!(
                "Mask has {} values but {}x{} needs {}",
                data.len(),
                dimensions.0,
                dimensions.1,
                expected
            )));
        }
        Ok(Self { data, dimensions })
    }

    /// Build a mask by classifying every coordinate
    pub fn from_fn<F: FnMut(u32, u32) -> bool>(width: u32, height: u32, mut classify: F) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(classify(x, y));
            }
        }
        Self {
            data,
            dimensions: (width, height),
        }
    }

    /// A mask with no person pixels
    #[must_use]
    pub fn empty(width: u32, height: u32) -> Self {
        Self::from_fn(width, height, |_, _| false)
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.dimensions.0
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.dimensions.1
    }

    /// Whether `(x, y)` is classified as person; out-of-bounds is background
    #[must_use]
    pub fn is_person(&self, x: u32, y: u32) -> bool {
        if x >= self.dimensions.0 || y >= self.dimensions.1 {
            return false;
        }
        let index = y as usize * self.dimensions.0 as usize + x as usize;
        self.data.get(index).copied().unwrap_or(false)
    }

    /// Number of pixels classified as person
    #[must_use]
    pub fn person_pixel_count(&self) -> usize {
        self.data.iter().filter(|flag| **flag).count()
    }

    /// Fraction of the image covered by the person
    #[must_use]
    pub fn coverage(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.person_pixel_count() as f32 / self.data.len() as f32
    }

    /// Mirror the mask along the vertical axis
    #[must_use]
    pub fn flipped_horizontal(&self) -> Self {
        let (width, _) = self.dimensions;
        let mut data = Vec::with_capacity(self.data.len());
        for row in self.data.chunks(width.max(1) as usize) {
            data.extend(row.iter().rev().copied());
        }
        Self {
            data,
            dimensions: self.dimensions,
        }
    }
}

/// Which background the current photo raster carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveBackground {
    /// The photo's own background
    #[default]
    None,
    /// A catalog gradient (baked in, or approximated via the presentation)
    Gradient(GradientId),
    /// Background replaced by solid white
    Removed,
}

/// Blend mode used when drawing the photo over its backdrop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// Source-over
    #[default]
    Normal,
    /// Multiply the photo into the backdrop
    Multiply,
}

/// How the photo is presented over its container backdrop
///
/// This is the non-raster part of the simple background mode: the photo keeps
/// its pixels and is blended over a gradient backdrop instead.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhotoPresentation {
    /// Photo opacity in `[0, 1]`
    pub opacity: f32,
    /// Blend mode against the backdrop
    pub blend_mode: BlendMode,
    /// Gradient painted behind the photo, if any
    pub backdrop: Option<GradientId>,
}

impl PhotoPresentation {
    /// Plain presentation: opaque, source-over, no backdrop
    #[must_use]
    pub fn normal() -> Self {
        Self {
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            backdrop: None,
        }
    }

    /// Gradient backdrop with the photo multiplied over it
    #[must_use]
    pub fn approximated(gradient: GradientId, opacity: f32) -> Self {
        Self {
            opacity,
            blend_mode: BlendMode::Multiply,
            backdrop: Some(gradient),
        }
    }

    #[must_use]
    pub fn is_normal(&self) -> bool {
        self.backdrop.is_none()
            && self.blend_mode == BlendMode::Normal
            && (self.opacity - 1.0).abs() < f32::EPSILON
    }
}

impl Default for PhotoPresentation {
    fn default() -> Self {
        Self::normal()
    }
}

/// The immutable photo capture, kept in encoded form as it was acquired
#[derive(Debug, Clone)]
pub struct SourcePhoto {
    encoded: Arc<[u8]>,
    format: Option<ImageFormat>,
    dimensions: (u32, u32),
}

impl SourcePhoto {
    /// Validate and wrap encoded image bytes; returns the decoded raster too
    pub fn from_encoded(bytes: Vec<u8>) -> Result<(Self, RgbaImage)> {
        let format = image::guess_format(&bytes).ok();
        let decoded = decode_rgba(&bytes)?;
        let photo = Self {
            encoded: Arc::from(bytes),
            format,
            dimensions: decoded.dimensions(),
        };
        Ok((photo, decoded))
    }

    /// Wrap an in-memory raster, storing it as lossless PNG
    pub fn from_raster(raster: &RgbaImage) -> Result<Self> {
        let mut buffer = Vec::new();
        raster.write_to(&mut std::io::Cursor::new(&mut buffer), ImageFormat::Png)?;
        Ok(Self {
            encoded: Arc::from(buffer),
            format: Some(ImageFormat::Png),
            dimensions: raster.dimensions(),
        })
    }

    /// Decode the capture afresh
    pub fn decode(&self) -> Result<RgbaImage> {
        decode_rgba(&self.encoded)
    }

    /// Decode the capture on a blocking worker
    pub async fn decode_async(&self) -> Result<RgbaImage> {
        let encoded = Arc::clone(&self.encoded);
        tokio::task::spawn_blocking(move || decode_rgba(&encoded))
            .await
            .map_err(|e| PurikuraError::image_decode(format!("Decode task failed: {}", e)))?
    }

    #[must_use]
    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }

    #[must_use]
    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    /// Width divided by height
    #[must_use]
    pub fn aspect_ratio(&self) -> f32 {
        self.dimensions.0 as f32 / self.dimensions.1.max(1) as f32
    }
}

/// Decode to RGBA with the EXIF orientation applied, so camera captures come
/// out upright
fn decode_rgba(bytes: &[u8]) -> Result<RgbaImage> {
    let decode_error =
        |e: image::ImageError| PurikuraError::image_decode(format!("Failed to decode image bytes: {}", e));

    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| PurikuraError::image_decode(format!("Failed to sniff image format: {}", e)))?
        .into_decoder()
        .map_err(decode_error)?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);

    let mut image = DynamicImage::from_decoder(decoder).map_err(decode_error)?;
    if image.width() == 0 || image.height() == 0 {
        return Err(PurikuraError::image_decode("Image has zero width or height"));
    }
    if orientation != Orientation::NoTransforms {
        debug!("Applying EXIF orientation {:?}", orientation);
        image.apply_orientation(orientation);
    }
    Ok(image.to_rgba8())
}

/// Everything the session knows about the photo being edited
#[derive(Debug, Clone)]
pub struct PhotoState {
    /// Raw capture, set once per session and never overwritten
    original: SourcePhoto,
    /// Latest applied transform of the photo
    pub current: Arc<RgbaImage>,
    /// Active filter preset
    pub active_filter: FilterPreset,
    /// Active background
    pub active_background: ActiveBackground,
    /// Simple-mode presentation state
    pub presentation: PhotoPresentation,
}

impl PhotoState {
    /// Create a state whose current raster is the unmodified capture
    #[must_use]
    pub fn new(original: SourcePhoto, decoded: RgbaImage) -> Self {
        Self {
            original,
            current: Arc::new(decoded),
            active_filter: FilterPreset::None,
            active_background: ActiveBackground::None,
            presentation: PhotoPresentation::normal(),
        }
    }

    /// The capture every background transform starts from
    #[must_use]
    pub fn original(&self) -> &SourcePhoto {
        &self.original
    }

    /// Native dimensions of the current raster
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.current.dimensions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_parsing() {
        assert_eq!(Color::from_hex("#ff9a9e").unwrap(), Color::rgb(0xff, 0x9a, 0x9e));
        assert_eq!(Color::from_hex("fff").unwrap(), Color::WHITE);
        assert_eq!(
            Color::from_hex("#11223344").unwrap(),
            Color { r: 0x11, g: 0x22, b: 0x33, a: 0x44 }
        );
        assert!(Color::from_hex("#12345").is_err());
        assert!(Color::from_hex("#gggggg").is_err());
        assert_eq!(Color::rgb(255, 107, 157).to_hex(), "#ff6b9d");
    }

    #[test]
    fn test_color_serde_roundtrip_as_string() {
        let json = serde_json::to_string(&Color::rgb(0x22, 0xc1, 0xc3)).unwrap();
        assert_eq!(json, "\"#22c1c3\"");
        let parsed: Color = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, Color::rgb(0x22, 0xc1, 0xc3));
    }

    #[test]
    fn test_mask_length_validation() {
        assert!(SegmentationMask::new(vec![true; 6], (3, 2)).is_ok());
        let err = SegmentationMask::new(vec![true; 5], (3, 2)).unwrap_err();
        assert!(matches!(err, PurikuraError::Segmentation(_)));
    }

    #[test]
    fn test_mask_queries() {
        let mask = SegmentationMask::from_fn(4, 2, |x, _| x < 1);
        assert!(mask.is_person(0, 1));
        assert!(!mask.is_person(1, 1));
        assert!(!mask.is_person(10, 10));
        assert_eq!(mask.person_pixel_count(), 2);
        assert!((mask.coverage() - 0.25).abs() < f32::EPSILON);

        let flipped = mask.flipped_horizontal();
        assert!(flipped.is_person(3, 0));
        assert!(!flipped.is_person(0, 0));
    }

    #[test]
    fn test_source_photo_roundtrip_is_lossless() {
        let raster = RgbaImage::from_fn(5, 3, |x, y| Rgba([x as u8 * 40, y as u8 * 60, 7, 255]));
        let source = SourcePhoto::from_raster(&raster).unwrap();
        assert_eq!(source.dimensions(), (5, 3));
        assert_eq!(source.format(), Some(ImageFormat::Png));
        assert_eq!(source.decode().unwrap(), raster);
    }

    /// JPEG whose left half is red and right half blue, tagged with an
    /// APP1 Exif segment carrying `orientation`
    fn oriented_jpeg(width: u32, height: u32, orientation: u8) -> Vec<u8> {
        let raster = image::RgbImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                image::Rgb([255, 0, 0])
            } else {
                image::Rgb([0, 0, 255])
            }
        });
        let mut jpeg = Vec::new();
        raster
            .write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)
            .unwrap();

        // Big-endian TIFF header, one IFD entry: Orientation (0x0112), SHORT, count 1
        let mut exif = b"Exif\0\0MM\0\x2a\0\0\0\x08\0\x01\x01\x12\0\x03\0\0\0\x01".to_vec();
        exif.extend_from_slice(&[0, orientation, 0, 0, 0, 0, 0, 0]);
        let mut segment = vec![0xff, 0xe1];
        segment.extend_from_slice(&((exif.len() + 2) as u16).to_be_bytes());
        segment.extend_from_slice(&exif);

        // Right after SOI
        jpeg.splice(2..2, segment);
        jpeg
    }

    #[test]
    fn test_exif_orientation_is_applied() {
        let (source, decoded) = SourcePhoto::from_encoded(oriented_jpeg(40, 20, 6)).unwrap();
        assert_eq!(source.format(), Some(ImageFormat::Jpeg));
        assert_eq!(source.dimensions(), (20, 40));
        assert_eq!(decoded.dimensions(), (20, 40));

        // Rotated 90 degrees clockwise: the left (red) half ends up on top
        let top = decoded.get_pixel(10, 5);
        let bottom = decoded.get_pixel(10, 35);
        assert!(top[0] > 200 && top[2] < 60, "{:?}", top);
        assert!(bottom[2] > 200 && bottom[0] < 60, "{:?}", bottom);

        assert_eq!(source.decode().unwrap(), decoded);
    }

    #[test]
    fn test_untagged_jpeg_keeps_orientation() {
        let (source, _) = SourcePhoto::from_encoded(oriented_jpeg(40, 20, 1)).unwrap();
        assert_eq!(source.dimensions(), (40, 20));
    }

    #[test]
    fn test_photo_state_keeps_original() {
        let raster = RgbaImage::from_pixel(4, 4, Rgba([9, 9, 9, 255]));
        let source = SourcePhoto::from_raster(&raster).unwrap();
        let encoded = source.encoded().to_vec();

        let mut state = PhotoState::new(source, raster);
        state.current = Arc::new(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])));
        assert_eq!(state.original().encoded(), encoded.as_slice());
        assert_eq!(state.original().decode().unwrap().get_pixel(0, 0), &Rgba([9, 9, 9, 255]));
    }

    #[test]
    fn test_source_photo_rejects_garbage() {
        let err = SourcePhoto::from_encoded(vec![1, 2, 3, 4]).unwrap_err();
        assert!(matches!(err, PurikuraError::ImageDecode(_)));
    }

    #[test]
    fn test_presentation_states() {
        assert!(PhotoPresentation::normal().is_normal());
        let simple = PhotoPresentation::approximated(GradientId::Gradient1, 0.85);
        assert!(!simple.is_normal());
        assert_eq!(simple.blend_mode, BlendMode::Multiply);
    }
}
