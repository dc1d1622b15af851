//! Sticker placements (metadata only until export)

use crate::geometry::{NormalizedPoint, Point, Rect};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Lower bound of the random placement band
const PLACEMENT_MIN: f32 = 0.15;
/// Width of the random placement band
const PLACEMENT_SPAN: f32 = 0.70;
/// Dragging may not move a sticker past this fraction of the container
const DRAG_LIMIT: f32 = 0.9;

/// One placed sticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StickerPlacement {
    pub id: Uuid,
    /// Glyph text, usually a single emoji
    pub glyph: String,
    /// Centre position as fractions of the container
    pub position: NormalizedPoint,
}

/// All stickers placed on the current photo
#[derive(Debug, Clone, Default)]
pub struct StickerBoard {
    stickers: Vec<StickerPlacement>,
}

impl StickerBoard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a sticker at a random position in the central band
    pub fn add(&mut self, glyph: impl Into<String>) -> Uuid {
        let id = Uuid::new_v4();
        let position = random_position(id);
        self.push(id, glyph.into(), position)
    }

    /// Place a sticker at an explicit position
    pub fn add_at(&mut self, glyph: impl Into<String>, position: NormalizedPoint) -> Uuid {
        self.push(Uuid::new_v4(), glyph.into(), position)
    }

    fn push(&mut self, id: Uuid, glyph: String, position: NormalizedPoint) -> Uuid {
        debug!(%id, glyph = %glyph, x = position.x, y = position.y, "Sticker added");
        self.stickers.push(StickerPlacement {
            id,
            glyph,
            position,
        });
        id
    }

    /// Move a sticker to follow a pointer in container client space
    ///
    /// Returns the new position, or `None` when the id is unknown.
    pub fn drag_to(&mut self, id: Uuid, pointer: Point, container: Rect) -> Option<NormalizedPoint> {
        let sticker = self.stickers.iter_mut().find(|sticker| sticker.id == id)?;
        let x = (pointer.x - container.left) / container.width.max(f32::EPSILON);
        let y = (pointer.y - container.top) / container.height.max(f32::EPSILON);
        sticker.position = NormalizedPoint::new(x.clamp(0.0, DRAG_LIMIT), y.clamp(0.0, DRAG_LIMIT));
        Some(sticker.position)
    }

    /// Remove one sticker; returns whether it existed
    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.stickers.len();
        self.stickers.retain(|sticker| sticker.id != id);
        before != self.stickers.len()
    }

    pub fn clear(&mut self) {
        self.stickers.clear();
    }

    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<&StickerPlacement> {
        self.stickers.iter().find(|sticker| sticker.id == id)
    }

    /// Stickers in placement order (later ones draw on top)
    #[must_use]
    pub fn stickers(&self) -> &[StickerPlacement] {
        &self.stickers
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stickers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stickers.is_empty()
    }
}

/// Derive a position in the placement band from the random bits of a v4 id
fn random_position(id: Uuid) -> NormalizedPoint {
    let bytes = id.as_bytes();
    let unit = |hi: u8, lo: u8| f32::from(u16::from_be_bytes([hi, lo])) / 65536.0;
    NormalizedPoint::new(
        PLACEMENT_MIN + unit(bytes[0], bytes[1]) * PLACEMENT_SPAN,
        PLACEMENT_MIN + unit(bytes[2], bytes[3]) * PLACEMENT_SPAN,
    )
}
