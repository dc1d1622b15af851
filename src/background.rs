//! Background replacement, removal and reset
//!
//! Every operation starts from the immutable original capture, never from the
//! current raster, so switching between backgrounds never compounds
//! artifacts. When the segmentation model is missing or a call fails, the
//! operation degrades to a simpler result instead of surfacing the error:
//!
//! | Operation | Model available | Model missing / failure |
//! |-----------|-----------------|-------------------------|
//! | replace   | person over gradient | gradient backdrop, photo multiplied at 0.85 |
//! | remove    | person over white    | original photo restored |
//! | reset     | original photo       | original photo |

use crate::catalog::GradientId;
use crate::error::{PurikuraError, Result};
use crate::gradient;
use crate::segmentation::SegmentationAdapter;
use crate::services::progress::{
    NoOpIndicator, ProcessingGuard, ProcessingIndicator, ProcessingStage,
};
use crate::types::{ActiveBackground, PhotoPresentation, PhotoState, SegmentationMask, SourcePhoto};
use image::{Rgba, RgbaImage};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, span, warn, Level};

/// Result of a background operation, applied to the photo state by the caller
#[derive(Debug, Clone)]
pub enum BackgroundOutcome {
    /// Person pixels from the original over a synthetic background
    Segmented {
        image: RgbaImage,
        background: ActiveBackground,
    },
    /// Simple mode: keep the current raster, show it over a gradient backdrop
    Approximated {
        gradient: GradientId,
        presentation: PhotoPresentation,
    },
    /// The original capture, freshly decoded
    Reverted { image: RgbaImage },
}

/// Which path a background operation took
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Segmented,
    Approximated,
    Reverted,
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Segmented => "segmented",
            Self::Approximated => "approximated",
            Self::Reverted => "reverted",
        };
        f.write_str(name)
    }
}

impl BackgroundOutcome {
    #[must_use]
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Segmented { .. } => OutcomeKind::Segmented,
            Self::Approximated { .. } => OutcomeKind::Approximated,
            Self::Reverted { .. } => OutcomeKind::Reverted,
        }
    }

    /// Whether pixel-level separation happened
    #[must_use]
    pub fn is_segmented(&self) -> bool {
        matches!(self, Self::Segmented { .. })
    }

    /// Write the outcome into `state`
    pub fn apply_to(self, state: &mut PhotoState) {
        match self {
            Self::Segmented { image, background } => {
                state.current = Arc::new(image);
                state.active_background = background;
                state.presentation = PhotoPresentation::normal();
            },
            Self::Approximated {
                gradient,
                presentation,
            } => {
                state.active_background = ActiveBackground::Gradient(gradient);
                state.presentation = presentation;
            },
            Self::Reverted { image } => {
                state.current = Arc::new(image);
                state.active_background = ActiveBackground::None;
                state.presentation = PhotoPresentation::normal();
            },
        }
    }
}

/// Copy `photo` pixels where `mask` marks a person and `background` elsewhere
///
/// All three inputs must share the same dimensions.
pub fn composite_person(
    photo: &RgbaImage,
    mask: &SegmentationMask,
    background: &RgbaImage,
) -> Result<RgbaImage> {
    let dimensions = photo.dimensions();
    if mask.dimensions != dimensions || background.dimensions() != dimensions {
        return Err(PurikuraError::processing(format!(
            "Cannot composite: photo {:?}, mask {:?}, background {:?}",
            dimensions,
            mask.dimensions,
            background.dimensions()
        )));
    }

    let mut result = background.clone();
    for (x, y, pixel) in photo.enumerate_pixels() {
        if mask.is_person(x, y) {
            result.put_pixel(x, y, *pixel);
        }
    }
    Ok(result)
}

/// Clears the in-flight flag when the operation ends
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PurikuraError::OperationInProgress)?;
        Ok(Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs background operations against a shared segmentation adapter
pub struct BackgroundCompositor {
    adapter: Arc<SegmentationAdapter>,
    indicator: Arc<dyn ProcessingIndicator>,
    approximate_opacity: f32,
    in_flight: AtomicBool,
}

impl std::fmt::Debug for BackgroundCompositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundCompositor")
            .field("adapter", &self.adapter)
            .field("approximate_opacity", &self.approximate_opacity)
            .field("in_flight", &self.in_flight.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl BackgroundCompositor {
    /// Simple-mode photo opacity used when no other value is configured
    pub const DEFAULT_APPROXIMATE_OPACITY: f32 = 0.85;

    #[must_use]
    pub fn new(adapter: Arc<SegmentationAdapter>) -> Self {
        Self {
            adapter,
            indicator: Arc::new(NoOpIndicator),
            approximate_opacity: Self::DEFAULT_APPROXIMATE_OPACITY,
            in_flight: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_indicator(mut self, indicator: Arc<dyn ProcessingIndicator>) -> Self {
        self.indicator = indicator;
        self
    }

    #[must_use]
    pub fn with_approximate_opacity(mut self, opacity: f32) -> Self {
        self.approximate_opacity = opacity.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn adapter(&self) -> &Arc<SegmentationAdapter> {
        &self.adapter
    }

    /// Whether a background operation is currently running
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Put the person from `original` over a catalog gradient
    ///
    /// # Errors
    /// Only `OperationInProgress`; segmentation problems fall back to the
    /// simple multiply presentation.
    #[instrument(skip(self, original), fields(gradient = %gradient))]
    pub async fn replace_background(
        &self,
        original: &SourcePhoto,
        gradient: GradientId,
    ) -> Result<BackgroundOutcome> {
        let _in_flight = InFlight::acquire(&self.in_flight)?;
        let _guard = ProcessingGuard::show(self.indicator.as_ref(), ProcessingStage::ReplacingBackground);

        match self
            .segment_over(original, |width, height| gradient::render(gradient, width, height))
            .await
        {
            Ok(image) => {
                info!("Background replaced with {}", gradient);
                Ok(BackgroundOutcome::Segmented {
                    image,
                    background: ActiveBackground::Gradient(gradient),
                })
            },
            Err(e) if e.is_recoverable_segmentation_error() => {
                warn!(error = %e, "Falling back to simple background mode");
                Ok(BackgroundOutcome::Approximated {
                    gradient,
                    presentation: PhotoPresentation::approximated(gradient, self.approximate_opacity),
                })
            },
            Err(e) => Err(e),
        }
    }

    /// Put the person from `original` over solid white
    ///
    /// # Errors
    /// `OperationInProgress`, or a decode failure of the original itself
    /// while reverting.
    #[instrument(skip_all)]
    pub async fn remove_background(&self, original: &SourcePhoto) -> Result<BackgroundOutcome> {
        let _in_flight = InFlight::acquire(&self.in_flight)?;
        let _guard = ProcessingGuard::show(self.indicator.as_ref(), ProcessingStage::RemovingBackground);

        match self
            .segment_over(original, |width, height| {
                RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]))
            })
            .await
        {
            Ok(image) => {
                info!("Background removed");
                Ok(BackgroundOutcome::Segmented {
                    image,
                    background: ActiveBackground::Removed,
                })
            },
            Err(e) if e.is_recoverable_segmentation_error() => {
                warn!(error = %e, "Background removal unavailable, restoring original photo");
                Self::revert(original).await
            },
            Err(e) => Err(e),
        }
    }

    /// Restore the original capture
    ///
    /// # Errors
    /// `OperationInProgress`, or a decode failure of the original itself.
    #[instrument(skip_all)]
    pub async fn reset_background(&self, original: &SourcePhoto) -> Result<BackgroundOutcome> {
        let _in_flight = InFlight::acquire(&self.in_flight)?;
        let _guard = ProcessingGuard::show(self.indicator.as_ref(), ProcessingStage::ResettingBackground);
        Self::revert(original).await
    }

    async fn revert(original: &SourcePhoto) -> Result<BackgroundOutcome> {
        let image = original.decode_async().await?;
        debug!("Original photo restored");
        Ok(BackgroundOutcome::Reverted { image })
    }

    async fn segment_over<F>(&self, original: &SourcePhoto, background: F) -> Result<RgbaImage>
    where
        F: FnOnce(u32, u32) -> RgbaImage,
    {
        if !self.adapter.is_available() {
            let reason = match self.adapter.status() {
                Some(status) => status.to_string(),
                None => "model has not been loaded".to_string(),
            };
            return Err(PurikuraError::model_unavailable(reason));
        }

        let photo = Arc::new(original.decode_async().await?);
        let mask = self.adapter.segment(Arc::clone(&photo)).await?;

        let _span = span!(Level::DEBUG, "composite_person", coverage = mask.coverage()).entered();
        let backdrop = background(photo.width(), photo.height());
        composite_person(&photo, &mask, &backdrop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::MockSegmenter;

    fn photo(width: u32, height: u32) -> (SourcePhoto, RgbaImage) {
        let raster = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 7 % 256) as u8, (y * 11 % 256) as u8, 90, 255])
        });
        (SourcePhoto::from_raster(&raster).unwrap(), raster)
    }

    fn compositor_with(segmenter: MockSegmenter) -> BackgroundCompositor {
        BackgroundCompositor::new(Arc::new(SegmentationAdapter::with_segmenter(Box::new(
            segmenter,
        ))))
    }

    #[test]
    fn test_composite_person_selects_per_pixel() {
        let photo = RgbaImage::from_pixel(2, 1, Rgba([1, 2, 3, 255]));
        let background = RgbaImage::from_pixel(2, 1, Rgba([9, 9, 9, 255]));
        let mask = SegmentationMask::from_fn(2, 1, |x, _| x == 0);
        let result = composite_person(&photo, &mask, &background).unwrap();
        assert_eq!(result.get_pixel(0, 0), &Rgba([1, 2, 3, 255]));
        assert_eq!(result.get_pixel(1, 0), &Rgba([9, 9, 9, 255]));
    }

    #[test]
    fn test_composite_person_rejects_mismatch() {
        let photo = RgbaImage::new(2, 2);
        let mask = SegmentationMask::empty(3, 2);
        assert!(composite_person(&photo, &mask, &RgbaImage::new(2, 2)).is_err());
    }

    #[tokio::test]
    async fn test_replace_with_model_masks_person() {
        let (source, raster) = photo(20, 10);
        let compositor = compositor_with(MockSegmenter::left_half());
        let outcome = compositor
            .replace_background(&source, GradientId::Gradient2)
            .await
            .unwrap();

        let BackgroundOutcome::Segmented { image, background } = outcome else {
            panic!("expected segmented outcome");
        };
        let expected_backdrop = gradient::render(GradientId::Gradient2, 20, 10);
        assert_eq!(background, ActiveBackground::Gradient(GradientId::Gradient2));
        assert_eq!(image.get_pixel(3, 4), raster.get_pixel(3, 4));
        assert_eq!(image.get_pixel(15, 4), expected_backdrop.get_pixel(15, 4));
    }

    #[tokio::test]
    async fn test_replace_without_model_approximates() {
        let (source, _) = photo(40, 30);
        let compositor =
            BackgroundCompositor::new(Arc::new(SegmentationAdapter::unavailable("no model")));
        let outcome = compositor
            .replace_background(&source, GradientId::Gradient1)
            .await
            .unwrap();

        match outcome {
            BackgroundOutcome::Approximated {
                gradient,
                presentation,
            } => {
                assert_eq!(gradient, GradientId::Gradient1);
                assert!((presentation.opacity - 0.85).abs() < f32::EPSILON);
                assert_eq!(presentation.blend_mode, crate::types::BlendMode::Multiply);
                assert_eq!(presentation.backdrop, Some(GradientId::Gradient1));
            },
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_inference_failure_is_contained() {
        let (source, raster) = photo(8, 8);
        let compositor = compositor_with(MockSegmenter::failing());

        let outcome = compositor.remove_background(&source).await.unwrap();
        match outcome {
            BackgroundOutcome::Reverted { image } => assert_eq!(image, raster),
            other => panic!("unexpected outcome {:?}", other),
        }

        let outcome = compositor
            .replace_background(&source, GradientId::Gradient3)
            .await
            .unwrap();
        assert!(matches!(outcome, BackgroundOutcome::Approximated { .. }));
    }

    #[tokio::test]
    async fn test_mismatched_mask_is_contained() {
        let (source, _) = photo(8, 8);
        let compositor = compositor_with(MockSegmenter::fixed_size(4, 4));
        let outcome = compositor.remove_background(&source).await.unwrap();
        assert!(matches!(outcome, BackgroundOutcome::Reverted { .. }));
    }

    #[tokio::test]
    async fn test_remove_uses_white() {
        let (source, raster) = photo(6, 6);
        let compositor = compositor_with(MockSegmenter::left_half());
        let BackgroundOutcome::Segmented { image, background } =
            compositor.remove_background(&source).await.unwrap()
        else {
            panic!("expected segmented outcome");
        };
        assert_eq!(background, ActiveBackground::Removed);
        assert_eq!(image.get_pixel(0, 0), raster.get_pixel(0, 0));
        assert_eq!(image.get_pixel(5, 5), &Rgba([255, 255, 255, 255]));
    }

    #[tokio::test]
    async fn test_reset_restores_original_bytes() {
        let (source, raster) = photo(12, 9);
        let compositor = compositor_with(MockSegmenter::full());
        let mut state = PhotoState::new(source.clone(), raster.clone());

        compositor
            .remove_background(&source)
            .await
            .unwrap()
            .apply_to(&mut state);
        assert_eq!(state.active_background, ActiveBackground::Removed);

        compositor
            .reset_background(&source)
            .await
            .unwrap()
            .apply_to(&mut state);
        assert_eq!(*state.current, raster);
        assert_eq!(state.active_background, ActiveBackground::None);
        assert!(state.presentation.is_normal());
    }

    #[tokio::test]
    async fn test_busy_compositor_rejects() {
        let (source, _) = photo(4, 4);
        let compositor = compositor_with(MockSegmenter::full());
        let _held = InFlight::acquire(&compositor.in_flight).unwrap();

        assert!(compositor.is_busy());
        let result = compositor.reset_background(&source).await;
        assert!(matches!(result, Err(PurikuraError::OperationInProgress)));
    }

    #[test]
    fn test_approximated_keeps_current_raster() {
        let (source, raster) = photo(4, 4);
        let mut state = PhotoState::new(source, raster.clone());
        BackgroundOutcome::Approximated {
            gradient: GradientId::Gradient5,
            presentation: PhotoPresentation::approximated(GradientId::Gradient5, 0.85),
        }
        .apply_to(&mut state);
        assert_eq!(*state.current, raster);
        assert_eq!(
            state.active_background,
            ActiveBackground::Gradient(GradientId::Gradient5)
        );
        assert!(!state.presentation.is_normal());
    }
}
