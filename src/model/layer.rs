//! Layers and the layer tree arena

use bitflags::bitflags;
use serde::Serialize;
use std::collections::BTreeMap;

use super::cel::Cel;
use super::user_data::UserData;
use super::Uuid;

/// Index of a layer in the sprite's arena. `LayerId(0)` is the root group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerId(pub(crate) usize);

impl LayerId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Image,
    Group,
    /// Cels hold tile values indexing into tileset `tileset`.
    Tilemap { tileset: u32 },
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LayerFlags: u16 {
        const VISIBLE = 1;
        const EDITABLE = 2;
        const LOCK_MOVE = 4;
        const BACKGROUND = 8;
        const CONTINUOUS = 16;
        const COLLAPSED = 32;
        const REFERENCE = 64;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Hue,
    Saturation,
    Color,
    Luminosity,
    Addition,
    Subtract,
    Divide,
}

const BLEND_MODES: [BlendMode; 19] = [
    BlendMode::Normal,
    BlendMode::Multiply,
    BlendMode::Screen,
    BlendMode::Overlay,
    BlendMode::Darken,
    BlendMode::Lighten,
    BlendMode::ColorDodge,
    BlendMode::ColorBurn,
    BlendMode::HardLight,
    BlendMode::SoftLight,
    BlendMode::Difference,
    BlendMode::Exclusion,
    BlendMode::Hue,
    BlendMode::Saturation,
    BlendMode::Color,
    BlendMode::Luminosity,
    BlendMode::Addition,
    BlendMode::Subtract,
    BlendMode::Divide,
];

impl BlendMode {
    /// Unknown codes fall back to normal.
    pub fn from_u16(code: u16) -> Self {
        BLEND_MODES.get(code as usize).copied().unwrap_or_default()
    }

    pub fn code(self) -> u16 {
        BLEND_MODES.iter().position(|m| *m == self).unwrap_or(0) as u16
    }
}

#[derive(Debug, Clone)]
pub struct Layer {
    pub name: String,
    pub kind: LayerKind,
    pub flags: LayerFlags,
    pub blend_mode: BlendMode,
    pub opacity: u8,
    pub uuid: Uuid,
    pub user_data: UserData,
    pub(crate) parent: Option<LayerId>,
    pub(crate) children: Vec<LayerId>,
    pub(crate) cels: BTreeMap<u32, Cel>,
}

impl Layer {
    pub fn new(kind: LayerKind, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            flags: LayerFlags::VISIBLE | LayerFlags::EDITABLE,
            blend_mode: BlendMode::Normal,
            opacity: 255,
            uuid: Uuid::default(),
            user_data: UserData::default(),
            parent: None,
            children: Vec::new(),
            cels: BTreeMap::new(),
        }
    }

    pub fn image(name: impl Into<String>) -> Self {
        Self::new(LayerKind::Image, name)
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::new(LayerKind::Group, name)
    }

    pub fn tilemap(name: impl Into<String>, tileset: u32) -> Self {
        Self::new(LayerKind::Tilemap { tileset }, name)
    }

    /// Layers that carry cels (image and tilemap layers).
    pub fn is_image(&self) -> bool {
        !self.is_group()
    }

    pub fn is_group(&self) -> bool {
        self.kind == LayerKind::Group
    }

    pub fn is_tilemap(&self) -> bool {
        matches!(self.kind, LayerKind::Tilemap { .. })
    }

    pub fn tileset_index(&self) -> Option<u32> {
        match self.kind {
            LayerKind::Tilemap { tileset } => Some(tileset),
            _ => None,
        }
    }

    pub fn is_background(&self) -> bool {
        self.flags.contains(LayerFlags::BACKGROUND)
    }

    pub fn is_reference(&self) -> bool {
        self.flags.contains(LayerFlags::REFERENCE)
    }

    pub fn is_visible(&self) -> bool {
        self.flags.contains(LayerFlags::VISIBLE)
    }

    pub fn parent(&self) -> Option<LayerId> {
        self.parent
    }

    pub fn children(&self) -> &[LayerId] {
        &self.children
    }

    pub fn cel(&self, frame: u32) -> Option<&Cel> {
        self.cels.get(&frame)
    }

    /// Cels keyed by frame, in frame order.
    pub fn cels(&self) -> impl Iterator<Item = (u32, &Cel)> {
        self.cels.iter().map(|(f, c)| (*f, c))
    }
}
