//! Tilesets and the sprite's tileset collection

use std::cell::RefCell;

use super::image::{Image, PixelFormat};
use super::user_data::UserData;

/// Reference to a tileset stored in another file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalTileset {
    pub filename: String,
    /// Tileset index inside that file.
    pub tileset: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub image: Image,
    pub user_data: UserData,
}

/// Compressed atlas bytes and the tileset version they were produced from.
#[derive(Debug, Clone)]
struct CompressedCache {
    version: u64,
    data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Tileset {
    pub name: String,
    pub base_index: i32,
    /// Internal tile flip flags considered when matching tiles.
    pub match_flags: u32,
    pub external: Option<ExternalTileset>,
    pub user_data: UserData,
    format: PixelFormat,
    tile_width: u32,
    tile_height: u32,
    tiles: Vec<Tile>,
    version: u64,
    cache: RefCell<Option<CompressedCache>>,
}

impl Tileset {
    /// `ntiles` empty tiles of `tile_width` x `tile_height`.
    pub fn new(format: PixelFormat, tile_width: u32, tile_height: u32, ntiles: usize) -> Self {
        let empty = Tile {
            image: Image::new(format, tile_width, tile_height),
            user_data: UserData::default(),
        };
        Self {
            name: String::new(),
            base_index: 1,
            match_flags: 0,
            external: None,
            user_data: UserData::default(),
            format,
            tile_width,
            tile_height,
            tiles: vec![empty; ntiles],
            version: 0,
            cache: RefCell::new(None),
        }
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn tile_width(&self) -> u32 {
        self.tile_width
    }

    pub fn tile_height(&self) -> u32 {
        self.tile_height
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn tile(&self, index: usize) -> Option<&Image> {
        self.tiles.get(index).map(|t| &t.image)
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.iter()
    }

    /// Replace a tile image. Ignored when `index` is out of range or the
    /// image doesn't match the tile size.
    pub fn set_tile(&mut self, index: usize, image: Image) {
        if image.width() != self.tile_width || image.height() != self.tile_height {
            return;
        }
        if let Some(tile) = self.tiles.get_mut(index) {
            tile.image = image;
            self.version += 1;
        }
    }

    pub fn push_tile(&mut self, image: Image) {
        self.insert_tile(self.tiles.len(), image);
    }

    pub fn insert_tile(&mut self, index: usize, image: Image) {
        let index = index.min(self.tiles.len());
        self.tiles.insert(index, Tile { image, user_data: UserData::default() });
        self.version += 1;
    }

    pub fn tile_data(&self, index: usize) -> Option<&UserData> {
        self.tiles.get(index).map(|t| &t.user_data)
    }

    /// Tile user data is not part of the pixel atlas, the version is kept.
    pub fn set_tile_data(&mut self, index: usize, user_data: UserData) {
        if let Some(tile) = self.tiles.get_mut(index) {
            tile.user_data = user_data;
        }
    }

    /// Bumped by every pixel change.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Compressed atlas bytes if they were produced from the current version.
    pub fn cached_compressed(&self) -> Option<Vec<u8>> {
        self.cache
            .borrow()
            .as_ref()
            .filter(|c| c.version == self.version && !c.data.is_empty())
            .map(|c| c.data.clone())
    }

    pub fn set_compressed_cache(&self, data: Vec<u8>) {
        *self.cache.borrow_mut() = Some(CompressedCache { version: self.version, data });
    }
}

impl PartialEq for Tileset {
    /// Content equality; the compression cache is ignored.
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.base_index == other.base_index
            && self.match_flags == other.match_flags
            && self.external == other.external
            && self.user_data == other.user_data
            && self.format == other.format
            && self.tile_width == other.tile_width
            && self.tile_height == other.tile_height
            && self.tiles == other.tiles
    }
}

/// Tilesets indexed by their id. Ids may have gaps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tilesets {
    items: Vec<Option<Tileset>>,
}

impl Tilesets {
    pub fn get(&self, id: u32) -> Option<&Tileset> {
        self.items.get(id as usize).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Tileset> {
        self.items.get_mut(id as usize).and_then(Option::as_mut)
    }

    pub fn set(&mut self, id: u32, tileset: Tileset) {
        let idx = id as usize;
        if idx >= self.items.len() {
            self.items.resize_with(idx + 1, || None);
        }
        self.items[idx] = Some(tileset);
    }

    /// Append with the next free id.
    pub fn add(&mut self, tileset: Tileset) -> u32 {
        let id = self.items.len() as u32;
        self.items.push(Some(tileset));
        id
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &Tileset)> {
        self.items
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.as_ref().map(|t| (i as u32, t)))
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_invalidated_by_edit() {
        let mut ts = Tileset::new(PixelFormat::Indexed, 2, 2, 2);
        ts.set_compressed_cache(vec![1, 2, 3]);
        assert_eq!(ts.cached_compressed(), Some(vec![1, 2, 3]));

        ts.set_tile(1, Image::filled(PixelFormat::Indexed, 2, 2, 5));
        assert_eq!(ts.cached_compressed(), None);
    }

    #[test]
    fn test_tile_data_keeps_cache() {
        let mut ts = Tileset::new(PixelFormat::Rgba, 1, 1, 1);
        ts.set_compressed_cache(vec![9]);
        ts.set_tile_data(0, UserData::with_text("grass"));
        assert!(ts.cached_compressed().is_some());
        assert_eq!(ts.tile_data(0).map(|u| u.text.as_str()), Some("grass"));
    }

    #[test]
    fn test_set_tile_rejects_wrong_size() {
        let mut ts = Tileset::new(PixelFormat::Rgba, 2, 2, 1);
        ts.set_tile(0, Image::new(PixelFormat::Rgba, 3, 3));
        assert_eq!(ts.version(), 0);
    }

    #[test]
    fn test_tilesets_with_gaps() {
        let mut sets = Tilesets::default();
        sets.set(2, Tileset::new(PixelFormat::Rgba, 8, 8, 0));
        assert!(sets.get(0).is_none());
        assert!(sets.get(2).is_some());
        assert_eq!(sets.iter().map(|(id, _)| id).collect::<Vec<_>>(), vec![2]);
        assert_eq!(sets.add(Tileset::new(PixelFormat::Rgba, 8, 8, 0)), 3);
    }
}
