//! Host-facing services
//!
//! Services keep side effects (indicator display, file output) out of the
//! editing pipeline so the pipeline stays testable.

pub mod export;
pub mod progress;

pub use export::{ExportService, EXPORT_PREFIX};
pub use progress::{
    LogIndicator, NoOpIndicator, ProcessingGuard, ProcessingIndicator, ProcessingStage,
};
