//! The sprite document and its arenas

use super::cel::{Cel, CelData, CelDataId};
use super::color_space::ColorSpace;
use super::image::PixelFormat;
use super::layer::{Layer, LayerId};
use super::palette::Palette;
use super::slice::Slice;
use super::tag::Tag;
use super::tileset::Tilesets;
use super::user_data::UserData;
use super::Rect;

/// Frame duration used when nothing else is known, in milliseconds.
pub const DEFAULT_FRAME_DURATION: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRatio {
    pub w: u8,
    pub h: u8,
}

impl Default for PixelRatio {
    fn default() -> Self {
        Self { w: 1, h: 1 }
    }
}

/// A layered, animated sprite.
///
/// Layers live in an arena addressed by [`LayerId`]; the root group is
/// always `LayerId(0)`. Cel pixel content lives in a second arena addressed
/// by [`CelDataId`], so linked cels are cels holding the same id.
#[derive(Debug, Clone)]
pub struct Sprite {
    pub transparent_index: u8,
    pub pixel_ratio: PixelRatio,
    pub grid_bounds: Rect,
    pub color_space: Option<ColorSpace>,
    pub tags: Vec<Tag>,
    pub slices: Vec<Slice>,
    pub tilesets: Tilesets,
    pub user_data: UserData,
    /// Write 128-bit ids for every layer.
    pub use_layer_uuids: bool,
    pub tile_management_plugin: Option<String>,
    format: PixelFormat,
    width: u32,
    height: u32,
    durations: Vec<u32>,
    palettes: Vec<Palette>,
    layers: Vec<Layer>,
    cel_data: Vec<CelData>,
}

impl Sprite {
    /// One-frame sprite with an empty root group and a `ncolors` palette.
    pub fn new(format: PixelFormat, width: u32, height: u32, ncolors: usize) -> Self {
        Self {
            transparent_index: 0,
            pixel_ratio: PixelRatio::default(),
            grid_bounds: Rect::new(0, 0, 16, 16),
            color_space: None,
            tags: Vec::new(),
            slices: Vec::new(),
            tilesets: Tilesets::default(),
            user_data: UserData::default(),
            use_layer_uuids: false,
            tile_management_plugin: None,
            format,
            width,
            height,
            durations: vec![DEFAULT_FRAME_DURATION],
            palettes: vec![Palette::new(0, ncolors)],
            layers: vec![Layer::group("")],
            cel_data: Vec::new(),
        }
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    // Frames

    pub fn frames(&self) -> u32 {
        self.durations.len() as u32
    }

    /// New frames get the duration of the last existing one.
    pub fn set_frames(&mut self, frames: u32) {
        let fill = self.durations.last().copied().unwrap_or(DEFAULT_FRAME_DURATION);
        self.durations.resize(frames.max(1) as usize, fill);
    }

    pub fn frame_duration(&self, frame: u32) -> u32 {
        self.durations
            .get(frame as usize)
            .copied()
            .unwrap_or(DEFAULT_FRAME_DURATION)
    }

    pub fn set_frame_duration(&mut self, frame: u32, duration: u32) {
        if let Some(d) = self.durations.get_mut(frame as usize) {
            *d = duration;
        }
    }

    pub fn set_duration_for_all_frames(&mut self, duration: u32) {
        for d in &mut self.durations {
            *d = duration;
        }
    }

    // Palettes

    pub fn palettes(&self) -> &[Palette] {
        &self.palettes
    }

    /// Palette in effect at `frame`.
    pub fn palette(&self, frame: u32) -> &Palette {
        self.palettes
            .iter()
            .rev()
            .find(|p| p.frame() <= frame)
            .unwrap_or(&self.palettes[0])
    }

    /// Insert or replace the palette starting at `palette.frame()`.
    pub fn set_palette(&mut self, palette: Palette) {
        match self.palettes.binary_search_by_key(&palette.frame(), Palette::frame) {
            Ok(i) => self.palettes[i] = palette,
            Err(i) => self.palettes.insert(i, palette),
        }
    }

    // Layers

    pub fn root(&self) -> LayerId {
        LayerId(0)
    }

    /// # Panics
    /// If `id` wasn't returned by this sprite.
    pub fn layer(&self, id: LayerId) -> &Layer {
        &self.layers[id.0]
    }

    pub fn layer_mut(&mut self, id: LayerId) -> &mut Layer {
        &mut self.layers[id.0]
    }

    /// Append `layer` as the topmost child of `parent`.
    ///
    /// A non-group parent is replaced by its own parent.
    pub fn add_layer(&mut self, parent: LayerId, mut layer: Layer) -> LayerId {
        let parent = if self.layers[parent.0].is_group() {
            parent
        } else {
            self.layers[parent.0].parent.unwrap_or(self.root())
        };
        let id = LayerId(self.layers.len());
        layer.parent = Some(parent);
        layer.children.clear();
        layer.cels.clear();
        self.layers.push(layer);
        self.layers[parent.0].children.push(id);
        id
    }

    /// Every layer below the root in depth-first order, with its nesting
    /// level (0 for children of the root).
    pub fn layers_preorder(&self) -> Vec<(LayerId, u16)> {
        let mut out = Vec::new();
        let mut stack: Vec<(LayerId, u16)> = self.layers[0]
            .children
            .iter()
            .rev()
            .map(|id| (*id, 0))
            .collect();
        while let Some((id, level)) = stack.pop() {
            out.push((id, level));
            for child in self.layers[id.0].children.iter().rev() {
                stack.push((*child, level + 1));
            }
        }
        out
    }

    pub fn find_layer(&self, name: &str) -> Option<LayerId> {
        self.layers_preorder()
            .into_iter()
            .map(|(id, _)| id)
            .find(|id| self.layers[id.0].name == name)
    }

    // Cels

    pub fn cel_data(&self, id: CelDataId) -> &CelData {
        &self.cel_data[id.0]
    }

    pub fn cel_data_mut(&mut self, id: CelDataId) -> &mut CelData {
        &mut self.cel_data[id.0]
    }

    pub fn add_cel_data(&mut self, data: CelData) -> CelDataId {
        self.cel_data.push(data);
        CelDataId(self.cel_data.len() - 1)
    }

    pub fn cel(&self, layer: LayerId, frame: u32) -> Option<&Cel> {
        self.layers[layer.0].cels.get(&frame)
    }

    /// Place `data` on `layer` at `frame`, replacing any previous cel.
    pub fn add_cel(&mut self, layer: LayerId, frame: u32, data: CelDataId, z_index: i16) {
        self.layers[layer.0].cels.insert(frame, Cel { data, z_index });
    }

    /// Convenience: store new cel data and place it.
    pub fn new_cel(&mut self, layer: LayerId, frame: u32, data: CelData) -> CelDataId {
        let id = self.add_cel_data(data);
        self.add_cel(layer, frame, id, 0);
        id
    }

    /// Make `frame` share the cel data of `target_frame` on the same layer.
    pub fn link_cel(&mut self, layer: LayerId, frame: u32, target_frame: u32) -> Option<CelDataId> {
        let data = self.cel(layer, target_frame)?.data;
        self.add_cel(layer, frame, data, 0);
        Some(data)
    }

    /// Cel data of a cel, if any.
    pub fn cel_content(&self, layer: LayerId, frame: u32) -> Option<&CelData> {
        self.cel(layer, frame).map(|c| self.cel_data(c.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Image, LayerKind, Point};

    #[test]
    fn test_new_sprite_defaults() {
        let sprite = Sprite::new(PixelFormat::Rgba, 16, 8, 32);
        assert_eq!(sprite.frames(), 1);
        assert_eq!(sprite.frame_duration(0), DEFAULT_FRAME_DURATION);
        assert_eq!(sprite.palette(0).size(), 32);
        assert!(sprite.layer(sprite.root()).is_group());
    }

    #[test]
    fn test_palette_per_frame() {
        let mut sprite = Sprite::new(PixelFormat::Indexed, 4, 4, 2);
        sprite.set_frames(5);
        sprite.set_palette(Palette::from_colors(3, vec![7, 8]));
        assert_eq!(sprite.palette(2).frame(), 0);
        assert_eq!(sprite.palette(3).entry(0), 7);
        assert_eq!(sprite.palette(4).entry(1), 8);

        sprite.set_palette(Palette::from_colors(3, vec![1]));
        assert_eq!(sprite.palettes().len(), 2);
        assert_eq!(sprite.palette(3).size(), 1);
    }

    #[test]
    fn test_layers_preorder_levels() {
        let mut sprite = Sprite::new(PixelFormat::Rgba, 4, 4, 1);
        let root = sprite.root();
        let bg = sprite.add_layer(root, Layer::image("bg"));
        let group = sprite.add_layer(root, Layer::group("body"));
        let arm = sprite.add_layer(group, Layer::image("arm"));
        let top = sprite.add_layer(root, Layer::image("top"));

        let order = sprite.layers_preorder();
        assert_eq!(order, vec![(bg, 0), (group, 0), (arm, 1), (top, 0)]);
        assert_eq!(sprite.find_layer("arm"), Some(arm));
        assert_eq!(sprite.layer(arm).parent(), Some(group));
    }

    #[test]
    fn test_add_layer_under_image_uses_its_parent() {
        let mut sprite = Sprite::new(PixelFormat::Rgba, 4, 4, 1);
        let root = sprite.root();
        let a = sprite.add_layer(root, Layer::image("a"));
        let b = sprite.add_layer(a, Layer::new(LayerKind::Image, "b"));
        assert_eq!(sprite.layer(b).parent(), Some(root));
    }

    #[test]
    fn test_link_cel_shares_data() {
        let mut sprite = Sprite::new(PixelFormat::Rgba, 4, 4, 1);
        sprite.set_frames(3);
        let root = sprite.root();
        let layer = sprite.add_layer(root, Layer::image("l"));
        let data = sprite.new_cel(
            layer,
            0,
            CelData::new(Image::new(PixelFormat::Rgba, 2, 2), Point::new(1, 1), 255),
        );
        assert_eq!(sprite.link_cel(layer, 2, 0), Some(data));
        assert_eq!(sprite.cel(layer, 2).map(|c| c.data), Some(data));
        assert_eq!(sprite.link_cel(layer, 1, 1), None);
    }
}
