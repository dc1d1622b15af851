//! Processing indicator service
//!
//! Long-running operations show an indicator while they work. Hosts decide
//! how the indicator looks (a spinner in the CLI, nothing in tests) by
//! implementing [`ProcessingIndicator`]. [`ProcessingGuard`] pairs every
//! `show` with a `hide`, whichever way the operation exits.

use instant::Instant;
use tracing::{debug, info};

/// Operations that display the processing indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Loading the segmentation model
    ModelLoading,
    /// Decoding the acquired photo
    PhotoDecoding,
    /// Replacing the background with a gradient
    ReplacingBackground,
    /// Replacing the background with white
    RemovingBackground,
    /// Restoring the original photo
    ResettingBackground,
    /// Flattening all layers
    Composing,
    /// Encoding and writing the export artifact
    Exporting,
}

impl ProcessingStage {
    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::ModelLoading => "Loading segmentation model",
            ProcessingStage::PhotoDecoding => "Decoding photo",
            ProcessingStage::ReplacingBackground => "Replacing background",
            ProcessingStage::RemovingBackground => "Removing background",
            ProcessingStage::ResettingBackground => "Restoring original photo",
            ProcessingStage::Composing => "Creating final image",
            ProcessingStage::Exporting => "Saving photo",
        }
    }
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// Host-provided busy indicator
pub trait ProcessingIndicator: Send + Sync {
    /// Display the indicator for `stage`
    fn show(&self, stage: ProcessingStage);

    /// Remove the indicator
    fn hide(&self);
}

/// Indicator that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpIndicator;

impl ProcessingIndicator for NoOpIndicator {
    fn show(&self, _stage: ProcessingStage) {}

    fn hide(&self) {}
}

/// Indicator that only emits tracing events
#[derive(Debug, Default, Clone, Copy)]
pub struct LogIndicator;

impl ProcessingIndicator for LogIndicator {
    fn show(&self, stage: ProcessingStage) {
        info!("{}...", stage.description());
    }

    fn hide(&self) {
        debug!("Processing indicator hidden");
    }
}

/// Shows the indicator on creation and hides it when dropped
#[must_use = "the indicator is hidden as soon as the guard is dropped"]
pub struct ProcessingGuard<'a> {
    indicator: &'a dyn ProcessingIndicator,
    stage: ProcessingStage,
    start: Instant,
}

impl<'a> ProcessingGuard<'a> {
    pub fn show(indicator: &'a dyn ProcessingIndicator, stage: ProcessingStage) -> Self {
        indicator.show(stage);
        Self {
            indicator,
            stage,
            start: Instant::now(),
        }
    }

    #[must_use]
    pub fn stage(&self) -> ProcessingStage {
        self.stage
    }

    /// Milliseconds since the indicator was shown
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        debug!(stage = ?self.stage, elapsed_ms = self.elapsed_ms(), "Processing finished");
        self.indicator.hide();
    }
}
