//! Utility modules shared by the inference pipeline

pub mod preprocessing;

pub use preprocessing::{ImagePreprocessor, Letterbox, PreprocessingOptions};
