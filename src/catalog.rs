//! Fixed gradient and filter catalogs

use crate::error::{PurikuraError, Result};
use crate::types::Color;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Identifier of one of the six catalog gradients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradientId {
    Gradient1,
    Gradient2,
    Gradient3,
    Gradient4,
    Gradient5,
    Gradient6,
}

impl GradientId {
    /// Every catalog entry in display order
    pub const ALL: [GradientId; 6] = [
        GradientId::Gradient1,
        GradientId::Gradient2,
        GradientId::Gradient3,
        GradientId::Gradient4,
        GradientId::Gradient5,
        GradientId::Gradient6,
    ];

    /// Catalog name (`gradient1` .. `gradient6`)
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Gradient1 => "gradient1",
            Self::Gradient2 => "gradient2",
            Self::Gradient3 => "gradient3",
            Self::Gradient4 => "gradient4",
            Self::Gradient5 => "gradient5",
            Self::Gradient6 => "gradient6",
        }
    }

    /// The two colour stops (start, end)
    #[must_use]
    pub fn stops(self) -> (Color, Color) {
        match self {
            Self::Gradient1 => (Color::rgb(0xff, 0x9a, 0x9e), Color::rgb(0xfe, 0xcf, 0xef)),
            Self::Gradient2 => (Color::rgb(0xa8, 0xe6, 0xcf), Color::rgb(0xdc, 0xed, 0xc1)),
            Self::Gradient3 => (Color::rgb(0xff, 0xd3, 0xa5), Color::rgb(0xfd, 0x98, 0x53)),
            Self::Gradient4 => (Color::rgb(0xa8, 0xca, 0xba), Color::rgb(0x5d, 0x4e, 0x75)),
            Self::Gradient5 => (Color::rgb(0x89, 0xf7, 0xfe), Color::rgb(0x66, 0xa6, 0xff)),
            Self::Gradient6 => (Color::rgb(0xfd, 0xbb, 0x2d), Color::rgb(0x22, 0xc1, 0xc3)),
        }
    }

    /// CSS description used by the simple background mode
    #[must_use]
    pub fn css(self) -> String {
        let (start, end) = self.stops();
        format!("linear-gradient(45deg, {}, {})", start, end)
    }
}

impl std::fmt::Display for GradientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GradientId {
    type Err = PurikuraError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|id| id.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                PurikuraError::invalid_input(format!(
                    "Unknown gradient '{}' (expected gradient1..gradient6)",
                    s
                ))
            })
    }
}

/// Named filter preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterPreset {
    #[default]
    None,
    Vintage,
    Dreamy,
    Kawaii,
    Neon,
    Soft,
}

impl FilterPreset {
    pub const ALL: [FilterPreset; 6] = [
        FilterPreset::None,
        FilterPreset::Vintage,
        FilterPreset::Dreamy,
        FilterPreset::Kawaii,
        FilterPreset::Neon,
        FilterPreset::Soft,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Vintage => "vintage",
            Self::Dreamy => "dreamy",
            Self::Kawaii => "kawaii",
            Self::Neon => "neon",
            Self::Soft => "soft",
        }
    }

    /// The composed CSS filter expression for this preset
    #[must_use]
    pub fn css(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Vintage => "sepia(80%) saturate(120%) contrast(110%)",
            Self::Dreamy => "blur(1px) brightness(110%) saturate(120%) contrast(90%)",
            Self::Kawaii => "saturate(150%) brightness(110%) contrast(120%) hue-rotate(10deg)",
            Self::Neon => "saturate(200%) brightness(120%) contrast(150%) hue-rotate(90deg)",
            Self::Soft => "brightness(110%) saturate(80%) contrast(85%) blur(0.5px)",
        }
    }

    #[must_use]
    pub fn is_identity(self) -> bool {
        self == Self::None
    }
}

impl std::fmt::Display for FilterPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FilterPreset {
    type Err = PurikuraError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|preset| preset.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|p| p.name()).collect();
                PurikuraError::invalid_input(format!(
                    "Unknown filter '{}' (expected one of: {})",
                    s,
                    names.join(", ")
                ))
            })
    }
}
