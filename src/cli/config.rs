//! Conversion of CLI arguments into editor configuration and edit steps

use crate::catalog::GradientId;
use crate::cli::main_impl::Cli;
use crate::config::EditorConfig;
use crate::geometry::{NormalizedPoint, Point};
use crate::types::Color;
use anyhow::{Context, Result};
use std::str::FromStr;

/// Background requested with `--background`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundChoice {
    Gradient(GradientId),
    Removed,
    /// Explicitly keep (or restore) the original background
    None,
}

impl FromStr for BackgroundChoice {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "removed" | "remove" | "white" => Ok(Self::Removed),
            "none" | "original" => Ok(Self::None),
            other => Ok(Self::Gradient(GradientId::from_str(other)?)),
        }
    }
}

/// A sticker given as `GLYPH` or `GLYPH@X,Y` (fractions of the container)
#[derive(Debug, Clone, PartialEq)]
pub struct StickerSpec {
    pub glyph: String,
    pub position: Option<NormalizedPoint>,
}

impl FromStr for StickerSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (glyph, position) = match s.rsplit_once('@') {
            Some((glyph, coords)) => {
                let point = parse_pair(coords)
                    .with_context(|| format!("Invalid sticker position in '{}'", s))?;
                if !(0.0..=1.0).contains(&point.x) || !(0.0..=1.0).contains(&point.y) {
                    anyhow::bail!("Sticker position must be within 0.0-1.0, got '{}'", coords);
                }
                (glyph, Some(NormalizedPoint::new(point.x, point.y)))
            },
            None => (s, None),
        };
        if glyph.is_empty() {
            anyhow::bail!("Sticker glyph must not be empty");
        }
        Ok(Self {
            glyph: glyph.to_string(),
            position,
        })
    }
}

/// A freehand stroke given as `X1,Y1;X2,Y2;...` in container pixels
#[derive(Debug, Clone, PartialEq)]
pub struct StrokeSpec {
    pub points: Vec<Point>,
}

impl FromStr for StrokeSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let points = s
            .split(';')
            .filter(|part| !part.trim().is_empty())
            .map(parse_pair)
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("Invalid stroke '{}'", s))?;
        if points.len() < 2 {
            anyhow::bail!("A stroke needs at least two points, got '{}'", s);
        }
        Ok(Self { points })
    }
}

fn parse_pair(s: &str) -> Result<Point> {
    let (x, y) = s
        .split_once(',')
        .with_context(|| format!("Expected 'X,Y', got '{}'", s))?;
    let x: f32 = x.trim().parse().with_context(|| format!("Invalid number '{}'", x))?;
    let y: f32 = y.trim().parse().with_context(|| format!("Invalid number '{}'", y))?;
    if !x.is_finite() || !y.is_finite() {
        anyhow::bail!("Coordinates must be finite, got '{}'", s);
    }
    Ok(Point::new(x, y))
}

/// Convert CLI arguments to an `EditorConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Start from `--config` (or defaults) and apply command-line overrides
    pub(crate) fn from_cli(cli: &Cli) -> Result<EditorConfig> {
        let mut config = match &cli.config {
            Some(path) => EditorConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => EditorConfig::default(),
        };

        if let Some(model) = &cli.model {
            config.segmentation.model_path = Some(model.clone());
        }
        if let Some(backend) = cli.backend {
            config.segmentation.backend_type = backend;
        }
        if let Some(provider) = cli.execution_provider {
            config.segmentation.execution_provider = provider;
        }
        if let Some(tier) = cli.resolution {
            config.segmentation.internal_resolution = tier;
        }
        if cli.threads > 0 {
            config.segmentation.intra_threads = cli.threads;
        }
        if let Some(color) = &cli.color {
            config.drawing.color = Color::from_hex(color).context("Invalid --color")?;
        }
        if let Some(size) = cli.brush_size {
            config.drawing.brush_size = size;
        }
        if let Some(font) = &cli.font {
            config.export.font_path = Some(font.clone());
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}
