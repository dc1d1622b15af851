//! Terminal spinner used as the processing indicator

use crate::services::progress::{ProcessingIndicator, ProcessingStage};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

/// Shows an `indicatif` spinner while an operation runs
pub(crate) struct SpinnerIndicator {
    enabled: bool,
    current: Mutex<Option<ProgressBar>>,
}

impl SpinnerIndicator {
    /// A disabled indicator draws nothing (used with `--json` output)
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            current: Mutex::new(None),
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{spinner:.magenta} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["✿", "❀", "✾", "❁", "✽"])
    }
}

impl ProcessingIndicator for SpinnerIndicator {
    fn show(&self, stage: ProcessingStage) {
        if !self.enabled {
            return;
        }
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(Self::style());
        spinner.set_message(stage.description());
        spinner.enable_steady_tick(Duration::from_millis(120));

        if let Ok(mut current) = self.current.lock() {
            if let Some(previous) = current.replace(spinner) {
                previous.finish_and_clear();
            }
        }
    }

    fn hide(&self) {
        if let Ok(mut current) = self.current.lock() {
            if let Some(spinner) = current.take() {
                spinner.finish_and_clear();
            }
        }
    }
}
