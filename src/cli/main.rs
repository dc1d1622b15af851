//! Purikura CLI
//!
//! Runs one editing session non-interactively: acquire a photo, apply the
//! requested edits in order (filter, background, strokes, stickers) and export
//! the flattened result.

use super::config::{BackgroundChoice, CliConfigBuilder, StickerSpec, StrokeSpec};
use super::indicator::SpinnerIndicator;
use crate::{
    background::{BackgroundCompositor, OutcomeKind},
    catalog::{FilterPreset, GradientId},
    compositor::FinalCompositor,
    config::{BackendType, ExecutionProvider, ResolutionTier},
    geometry::{Rect, Size},
    inference::{BackendFactory, DefaultBackendFactory},
    segmentation::{BackendLoader, ModelStatus, SegmentationAdapter},
    session::EditorSession,
    tracing_config::{init_cli_tracing, TracingFormat},
};
use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Sticker-booth photo editor: filters, backgrounds, doodles and stickers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "purikura")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input photo (JPEG, PNG or TIFF)
    #[arg(value_name = "INPUT", required_unless_present_any = &["list_filters", "list_gradients", "show_backends"])]
    pub input: Option<PathBuf>,

    /// Output file, or a directory that receives purikura-photo-<timestamp>.png
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Filter preset (none, vintage, dreamy, kawaii, neon, soft)
    #[arg(short, long, default_value = "none")]
    pub filter: FilterPreset,

    /// Background: gradient1..gradient6, removed or none
    #[arg(short, long)]
    pub background: Option<BackgroundChoice>,

    /// Sticker glyph, optionally placed with @X,Y (fractions); repeatable
    #[arg(short, long = "sticker", value_name = "GLYPH[@X,Y]")]
    pub stickers: Vec<StickerSpec>,

    /// Freehand stroke in container pixels; repeatable
    #[arg(long = "stroke", value_name = "X1,Y1;X2,Y2;...")]
    pub strokes: Vec<StrokeSpec>,

    /// Brush colour as #rrggbb
    #[arg(long)]
    pub color: Option<String>,

    /// Brush width in pixels
    #[arg(long)]
    pub brush_size: Option<f32>,

    /// Editing container size that strokes and stickers are laid out in
    #[arg(long, default_value = "800x600")]
    pub container: Size,

    /// Output bounding box [default: the photo's own size]
    #[arg(long)]
    pub size: Option<Size>,

    /// Person segmentation ONNX model
    #[arg(short, long, value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// Inference backend (onnx, tract)
    #[arg(long)]
    pub backend: Option<BackendType>,

    /// Execution provider for ONNX Runtime (auto, cpu, cuda, coreml)
    #[arg(short, long)]
    pub execution_provider: Option<ExecutionProvider>,

    /// Internal segmentation resolution (low, medium, high, full)
    #[arg(long)]
    pub resolution: Option<ResolutionTier>,

    /// Inference threads (0 = runtime default)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Font used for sticker glyphs
    #[arg(long, value_name = "PATH")]
    pub font: Option<PathBuf>,

    /// JSON configuration file; command-line flags override it
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (-v: INFO, -vv: DEBUG, -vvv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Plain log output without colours
    #[arg(long)]
    pub compact_logs: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,

    /// List filter presets and exit
    #[arg(long)]
    pub list_filters: bool,

    /// List background gradients and exit
    #[arg(long)]
    pub list_gradients: bool,

    /// Show compiled-in inference backends and exit
    #[arg(long)]
    pub show_backends: bool,
}

/// What a run did, printed at the end
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub input: PathBuf,
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub filter: FilterPreset,
    pub background: Option<OutcomeKind>,
    pub model: String,
    pub strokes: usize,
    pub stickers: usize,
    pub elapsed_ms: u64,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = if cli.compact_logs {
        TracingFormat::Compact
    } else {
        TracingFormat::Console
    };
    let session_id = init_cli_tracing(cli.verbose, format).context("Failed to initialize tracing")?;
    debug!(%session_id, "CLI started");

    if cli.list_filters {
        list_filters();
        return Ok(());
    }
    if cli.list_gradients {
        list_gradients();
        return Ok(());
    }
    if cli.show_backends {
        show_backends();
        return Ok(());
    }

    let summary = run(&cli).await?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

async fn run(cli: &Cli) -> Result<RunSummary> {
    let start = Instant::now();
    let input = cli
        .input
        .clone()
        .context("An input photo is required")?;
    let config = CliConfigBuilder::from_cli(cli)?;

    let indicator = Arc::new(SpinnerIndicator::new(!cli.json));
    let adapter = Arc::new(SegmentationAdapter::new());
    let background = Arc::new(
        BackgroundCompositor::new(Arc::clone(&adapter))
            .with_indicator(indicator.clone())
            .with_approximate_opacity(config.export.approximate_opacity),
    );
    let compositor =
        FinalCompositor::new(config.export.clone()).context("Failed to set up sticker font")?;
    let loader = BackendLoader::new(Arc::new(DefaultBackendFactory), config.segmentation.clone());

    let mut session =
        EditorSession::with_parts(config, background, compositor, indicator, cli.container)
            .context("Failed to create editing session")?;

    // Only background operations need the model
    if matches!(
        cli.background,
        Some(BackgroundChoice::Gradient(_) | BackgroundChoice::Removed)
    ) {
        match session.load_model(&loader).await {
            ModelStatus::Loaded => info!("Segmentation model ready"),
            ModelStatus::Unavailable(reason) => {
                warn!("Segmentation unavailable ({}); using simple background mode", reason);
            },
        }
    }

    session
        .acquire_file(&input)
        .await
        .with_context(|| format!("Failed to open {}", input.display()))?;
    session.apply_filter(cli.filter)?;

    let outcome = match cli.background {
        Some(BackgroundChoice::Gradient(gradient)) => {
            Some(session.replace_background(gradient).await?)
        },
        Some(BackgroundChoice::Removed) => Some(session.remove_background().await?),
        Some(BackgroundChoice::None) => Some(session.reset_background().await?),
        None => None,
    };

    // Strokes are given in container pixels; map them onto the layer
    let display = Rect::from_size(session.container());
    for stroke in &cli.strokes {
        let points: Vec<_> = stroke
            .points
            .iter()
            .map(|point| session.map_client_point(*point, display))
            .collect();
        session.draw_stroke(&points);
    }

    for sticker in &cli.stickers {
        match sticker.position {
            Some(position) => session.add_sticker_at(sticker.glyph.clone(), position),
            None => session.add_sticker(sticker.glyph.clone()),
        };
    }

    let photo_size = session
        .photo()
        .map(|photo| Size::from(photo.dimensions()))
        .context("Photo state missing after acquisition")?;
    let bounds = cli.size.unwrap_or(photo_size);
    let target = cli.output.clone().unwrap_or_else(|| PathBuf::from("."));
    let output = session
        .save(bounds, &target)
        .with_context(|| format!("Failed to export to {}", target.display()))?;

    let (width, height) = image::image_dimensions(&output)
        .with_context(|| format!("Failed to read back {}", output.display()))?;

    Ok(RunSummary {
        input,
        output,
        width,
        height,
        filter: cli.filter,
        background: outcome,
        model: session
            .model_status()
            .map_or_else(|| "not loaded".to_string(), ToString::to_string),
        strokes: cli.strokes.len(),
        stickers: cli.stickers.len(),
        elapsed_ms: start.elapsed().as_millis() as u64,
    })
}

fn print_summary(summary: &RunSummary) {
    println!("✨ Saved {} ({}x{})", summary.output.display(), summary.width, summary.height);
    println!("  • Filter: {}", summary.filter);
    if let Some(outcome) = summary.background {
        println!("  • Background: {}", outcome);
    }
    println!("  • Segmentation: {}", summary.model);
    println!(
        "  • Strokes: {}, stickers: {}",
        summary.strokes, summary.stickers
    );
    println!("  • Took {} ms", summary.elapsed_ms);
}

fn list_filters() {
    println!("Filter presets:");
    for preset in FilterPreset::ALL {
        println!("  • {:<8} {}", preset.name(), preset.css());
    }
}

fn list_gradients() {
    println!("Background gradients:");
    for gradient in GradientId::ALL {
        println!("  • {:<10} {}", gradient.name(), gradient.css());
    }
}

fn show_backends() {
    println!("Inference backends compiled into this build:");
    let factory = DefaultBackendFactory;
    for backend in factory.available_backends() {
        println!("  • {}", backend);
    }
    #[cfg(feature = "onnx")]
    {
        println!("\nONNX Runtime execution providers:");
        for (name, available, description) in crate::backends::OnnxBackend::list_providers() {
            let status = if available { "available" } else { "not available" };
            println!("  • {}: {} - {}", name, status, description);
        }
    }
}
