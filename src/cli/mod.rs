//! Command-line host for the editing engine
//!
//! This module is only available when the "cli" feature is enabled.

mod config;
mod indicator;
#[path = "main.rs"]
mod main_impl;

pub use config::{BackgroundChoice, StickerSpec, StrokeSpec};
pub use main_impl::{main, Cli, RunSummary};
