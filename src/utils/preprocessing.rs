//! Image preprocessing for segmentation inference
//!
//! Photos are letterboxed into a square canvas (aspect preserved, centred,
//! padded) and converted to a normalized NCHW tensor. The [`Letterbox`]
//! records the transform so model output can be mapped back to the photo.

use crate::error::{PurikuraError, Result};
use image::{ImageBuffer, Rgb, RgbImage, RgbaImage};
use ndarray::Array4;

/// Options controlling preprocessing
#[derive(Debug, Clone)]
pub struct PreprocessingOptions {
    /// Side length of the square model input
    pub target_size: u32,
    /// Per-channel normalization mean (RGB, 0-1 range)
    pub normalization_mean: [f32; 3],
    /// Per-channel normalization std (RGB)
    pub normalization_std: [f32; 3],
    /// Padding color for aspect ratio preservation (RGB)
    pub padding_color: [u8; 3],
}

impl Default for PreprocessingOptions {
    fn default() -> Self {
        Self {
            target_size: 512,
            normalization_mean: [0.5, 0.5, 0.5],
            normalization_std: [0.5, 0.5, 0.5],
            padding_color: [0, 0, 0],
        }
    }
}

/// Placement of the resized photo inside the square tensor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// Scale factor from photo pixels to tensor pixels
    pub scale: f32,
    pub offset_x: u32,
    pub offset_y: u32,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub target_size: u32,
}

impl Letterbox {
    /// Compute the letterbox for a photo of `dimensions` in a `target_size` square
    pub fn new(dimensions: (u32, u32), target_size: u32) -> Result<Self> {
        let (width, height) = dimensions;
        if width == 0 || height == 0 || target_size == 0 {
            return Err(PurikuraError::processing(format!(
                "Cannot letterbox {}x{} into {}",
                width, height, target_size
            )));
        }

        let target = target_size as f32;
        let scale = (target / width as f32).min(target / height as f32);
        let scaled_width = ((width as f32 * scale).round() as u32).clamp(1, target_size);
        let scaled_height = ((height as f32 * scale).round() as u32).clamp(1, target_size);

        Ok(Self {
            scale,
            offset_x: (target_size - scaled_width) / 2,
            offset_y: (target_size - scaled_height) / 2,
            scaled_width,
            scaled_height,
            target_size,
        })
    }

    /// Tensor pixel that photo pixel `(x, y)` maps to (pixel centres, clamped)
    #[must_use]
    pub fn to_tensor(&self, x: u32, y: u32) -> (u32, u32) {
        let tx = ((x as f32 + 0.5) * self.scale).floor() as u32;
        let ty = ((y as f32 + 0.5) * self.scale).floor() as u32;
        (
            (tx + self.offset_x).min(self.target_size - 1),
            (ty + self.offset_y).min(self.target_size - 1),
        )
    }
}

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Letterbox and normalize a photo into a `[1, 3, S, S]` tensor
    pub fn preprocess_image(
        image: &RgbaImage,
        options: &PreprocessingOptions,
    ) -> Result<(Array4<f32>, Letterbox)> {
        let letterbox = Letterbox::new(image.dimensions(), options.target_size)?;

        let rgb: RgbImage = ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
            let pixel = image.get_pixel(x, y);
            Rgb([pixel[0], pixel[1], pixel[2]])
        });
        let resized = image::imageops::resize(
            &rgb,
            letterbox.scaled_width,
            letterbox.scaled_height,
            image::imageops::FilterType::Triangle,
        );

        let mut canvas = ImageBuffer::from_pixel(
            letterbox.target_size,
            letterbox.target_size,
            Rgb(options.padding_color),
        );
        image::imageops::replace(
            &mut canvas,
            &resized,
            i64::from(letterbox.offset_x),
            i64::from(letterbox.offset_y),
        );

        Ok((Self::canvas_to_tensor(&canvas, options), letterbox))
    }

    /// Convert canvas to normalized tensor
    fn canvas_to_tensor(canvas: &RgbImage, options: &PreprocessingOptions) -> Array4<f32> {
        let size = canvas.width() as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

        #[allow(clippy::indexing_slicing)]
        // Safe: tensor dimensions pre-allocated to match canvas size
        for (y, row) in canvas.rows().enumerate() {
            for (x, pixel) in row.enumerate() {
                for channel in 0..3 {
                    tensor[[0, channel, y, x]] = (f32::from(pixel[channel]) / 255.0
                        - options.normalization_mean[channel])
                        / options.normalization_std[channel];
                }
            }
        }

        tensor
    }
}
