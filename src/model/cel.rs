use super::image::Image;
use super::user_data::UserData;
use super::{Point, RectF};

/// Index of a [`CelData`] in the sprite's arena.
///
/// Linked cels hold the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CelDataId(pub(crate) usize);

impl CelDataId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Pixel content shared by a cel and every cel linked to it.
#[derive(Debug, Clone, PartialEq)]
pub struct CelData {
    pub image: Image,
    pub position: Point,
    pub opacity: u8,
    /// Precise bounds of cels on reference layers.
    pub bounds: Option<RectF>,
    pub user_data: UserData,
}

impl CelData {
    pub fn new(image: Image, position: Point, opacity: u8) -> Self {
        Self {
            image,
            position,
            opacity,
            bounds: None,
            user_data: UserData::default(),
        }
    }
}

/// What one layer contributes to one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cel {
    pub data: CelDataId,
    pub z_index: i16,
}
