//! Sizes, aspect-fit and pointer coordinate mapping

use serde::{Deserialize, Serialize};

/// Integer pixel size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub fn aspect_ratio(self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    #[must_use]
    pub fn min_side(self) -> u32 {
        self.width.min(self.height)
    }

    /// Largest size with `aspect` (width / height) that fits inside `self`
    ///
    /// Dimensions are rounded and never drop below one pixel.
    #[must_use]
    pub fn fit_aspect(self, aspect: f32) -> Self {
        let bounds_aspect = self.aspect_ratio();
        let (width, height) = if aspect > bounds_aspect {
            let width = self.width as f32;
            (width, width / aspect)
        } else {
            let height = self.height as f32;
            (height * aspect, height)
        };
        Self {
            width: (width.round() as u32).clamp(1, self.width.max(1)),
            height: (height.round() as u32).clamp(1, self.height.max(1)),
        }
    }
}

impl From<(u32, u32)> for Size {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl std::str::FromStr for Size {
    type Err = crate::error::PurikuraError;

    fn from_str(s: &str) -> crate::Result<Self> {
        let invalid = || crate::error::PurikuraError::invalid_input(format!("Invalid size '{}' (expected WxH)", s));
        let (w, h) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        let width: u32 = w.trim().parse().map_err(|_| invalid())?;
        let height: u32 = h.trim().parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Self { width, height })
    }
}

/// Fit a `content` size into `bounds`, preserving the content's aspect ratio
#[must_use]
pub fn fit_within(content: Size, bounds: Size) -> Size {
    bounds.fit_aspect(content.aspect_ratio())
}

/// A point in floating-point pixel space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in client (display) coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    #[must_use]
    pub const fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Rectangle at the origin covering `size`
    #[must_use]
    pub fn from_size(size: Size) -> Self {
        Self::new(0.0, 0.0, size.width as f32, size.height as f32)
    }
}

/// Position expressed as fractions of a container
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub x: f32,
    pub y: f32,
}

impl NormalizedPoint {
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Scale into a pixel position within `size`
    #[must_use]
    pub fn to_pixels(self, size: Size) -> Point {
        Point::new(self.x * size.width as f32, self.y * size.height as f32)
    }
}

/// Convert a client-space pointer into layer pixels
///
/// `display` is where the layer is shown on screen, which may be scaled
/// relative to its pixel size.
#[must_use]
pub fn map_client_point(client: Point, display: Rect, layer: Size) -> Point {
    let scale_x = layer.width as f32 / display.width.max(f32::EPSILON);
    let scale_y = layer.height as f32 / display.height.max(f32::EPSILON);
    Point::new(
        (client.x - display.left) * scale_x,
        (client.y - display.top) * scale_y,
    )
}
