//! In-memory sprite document
//!
//! The decoder builds a [`Sprite`] chunk by chunk; the encoder reads one back
//! without mutating it (apart from the tileset compression cache).

mod cel;
mod color_space;
mod image;
mod layer;
mod palette;
mod slice;
mod sprite;
mod tag;
mod tileset;
mod user_data;

pub use cel::{Cel, CelData, CelDataId};
pub use color_space::{ColorSpace, ColorSpaceKind};
pub use image::{Image, PixelFormat};
pub use layer::{BlendMode, Layer, LayerFlags, LayerId, LayerKind};
pub use palette::Palette;
pub use slice::{Slice, SliceKey};
pub use sprite::{PixelRatio, Sprite};
pub use tag::{AniDir, Tag, TAG_MAX_REPEAT};
pub use tileset::{ExternalTileset, Tile, Tileset, Tilesets};
pub use user_data::{Properties, PropertiesMaps, UserData};

use serde::Serialize;

/// 128-bit identifier stored as 16 raw bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uuid(pub [u8; 16]);

impl Uuid {
    pub fn is_nil(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl std::fmt::Display for Uuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                write!(f, "-")?;
            }
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Size {
    pub w: i32,
    pub h: i32,
}

impl Size {
    pub fn new(w: i32, h: i32) -> Self {
        Self { w, h }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    pub fn is_empty(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }
}

/// Sub-pixel bounds, used by cels on reference layers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RectF {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}
