//! .aseprite decoder
//!
//! One pass over the frames. Each frame's chunks are dispatched by type and
//! folded into a [`Sprite`]; the stream is always repositioned at the end of
//! the chunk afterwards, so an unknown or damaged chunk never hides the ones
//! after it.
//!
//! A few things are carried between chunks:
//!
//! - the layer cursor (last layer and its child level), which rebuilds the
//!   layer tree from flat child levels;
//! - the table of layers in file order, which cel chunks index into;
//! - the [`UserDataTarget`] that the next UserData chunk belongs to;
//! - the external files table and per-tileset flags.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use crate::chunk::ChunkHeader;
use crate::compress::{read_compressed_image, read_raw_image};
use crate::config::DecodeConfig;
use crate::delegate::{CollectingDelegate, DecodeDelegate, Diagnostic};
use crate::error::DecodeError;
use crate::external_files::ExternalFiles;
use crate::format::{
    fixed_to_f64, AsepriteHeader, CelType, ChunkType, FrameHeader, HeaderFlags, SliceFlags,
    TilesetFlags, CEL_EXTRA_FLAG_PRECISE_BOUNDS, CHUNK_HEADER_SIZE, COLOR_PROFILE_FLAG_GAMMA,
    COLOR_PROFILE_ICC, COLOR_PROFILE_NONE, COLOR_PROFILE_SRGB, FILE_MAGIC, FRAME_MAGIC,
    LAYER_TYPE_GROUP, LAYER_TYPE_IMAGE, LAYER_TYPE_TILEMAP, PALETTE_ENTRY_FLAG_HAS_NAME,
};
use crate::model::{
    AniDir, BlendMode, CelData, CelDataId, ColorSpace, ExternalTileset, Image, Layer, LayerFlags,
    LayerId, LayerKind, Palette, PixelFormat, PixelRatio, Point, Rect, RectF, Slice, SliceKey,
    Sprite, Tag, Tileset,
};
use crate::pixel::{
    mask_shift, rgba, scale_6bits_to_8bits, TileMasks, NOTILE, TILE_DFLIP, TILE_XFLIP, TILE_YFLIP,
};
use crate::stream::ByteReader;
use crate::user_data::read_user_data;

/// Owner of the next UserData chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserDataTarget {
    None,
    Sprite,
    Layer(LayerId),
    /// Shared by every cel linked to the same data.
    CelData(CelDataId),
    /// Index into `Sprite::tags`. Advances to the next tag after each chunk.
    Tag(usize),
    Slice(usize),
    /// The next chunk is the tileset's own; one chunk per tile follows.
    Tileset(u32),
    /// Tile `index` (as counted in the file) of `tileset`.
    Tile { tileset: u32, index: u32 },
}

/// What the decoder remembers about each tileset chunk.
#[derive(Debug, Clone, Copy)]
struct TilesetInfo {
    flags: TilesetFlags,
    /// Tiles declared in the file.
    file_tiles: u32,
    /// Tiles inserted in front by the legacy fix (0 or 1).
    shift: u32,
}

struct AsepriteDecoder<'d, R, D: ?Sized> {
    r: ByteReader<R>,
    delegate: &'d mut D,
    header: AsepriteHeader,
    sprite: Sprite,
    ext: ExternalFiles,
    /// Layers in file order; `None` keeps the index of a dropped layer.
    layers: Vec<Option<LayerId>>,
    last_layer: LayerId,
    current_level: i32,
    last_cel: Option<CelDataId>,
    target: UserDataTarget,
    ignore_old_color_chunks: bool,
    tilesets: BTreeMap<u32, TilesetInfo>,
}

/// Decode a sprite from `reader`, delivering it to `delegate.on_sprite`.
///
/// Only header problems are returned as `Err`; everything found later is
/// reported to the delegate and the sprite is still delivered.
pub fn decode<R: Read + Seek, D: DecodeDelegate + ?Sized>(
    delegate: &mut D,
    reader: R,
) -> Result<(), DecodeError> {
    let mut r = ByteReader::new(reader);
    let header = AsepriteHeader::read(&mut r);

    let fatal = if !r.ok() {
        Some(DecodeError::TruncatedHeader)
    } else if header.magic != FILE_MAGIC {
        Some(DecodeError::BadMagic(header.magic))
    } else if PixelFormat::from_depth(header.depth).is_none() {
        Some(DecodeError::InvalidColorDepth(header.depth))
    } else if header.width < 1 || header.height < 1 {
        Some(DecodeError::InvalidSize { width: header.width, height: header.height })
    } else {
        None
    };
    if let Some(err) = fatal {
        delegate.error(&err.to_string());
        return Err(err);
    }

    let sprite = sprite_from_header(&header);
    let root = sprite.root();
    let mut decoder = AsepriteDecoder {
        r,
        delegate,
        header,
        sprite,
        ext: ExternalFiles::new(),
        layers: Vec::new(),
        last_layer: root,
        current_level: -1,
        last_cel: None,
        target: UserDataTarget::Sprite,
        ignore_old_color_chunks: false,
        tilesets: BTreeMap::new(),
    };
    decoder.read_frames();

    if !decoder.r.ok() {
        decoder.delegate.error("Error reading file: unexpected end of data");
    }
    let AsepriteDecoder { delegate, sprite, .. } = decoder;
    delegate.on_sprite(sprite);
    Ok(())
}

fn sprite_from_header(header: &AsepriteHeader) -> Sprite {
    let format = PixelFormat::from_depth(header.depth).unwrap_or(PixelFormat::Rgba);
    let mut sprite = Sprite::new(
        format,
        header.width as u32,
        header.height as u32,
        header.ncolors as usize,
    );
    sprite.set_frames(header.frames as u32);
    sprite.set_duration_for_all_frames(header.speed as u32);
    sprite.transparent_index = header.transparent_index;
    sprite.pixel_ratio = PixelRatio { w: header.pixel_width, h: header.pixel_height };
    sprite.grid_bounds = Rect::new(
        header.grid_x as i32,
        header.grid_y as i32,
        header.grid_width as i32,
        header.grid_height as i32,
    );
    sprite.use_layer_uuids = header.flags().contains(HeaderFlags::LAYER_UUIDS);
    sprite
}

impl<R: Read + Seek, D: DecodeDelegate + ?Sized> AsepriteDecoder<'_, R, D> {
    fn error(&mut self, message: String) {
        self.delegate.error(&message);
    }

    fn incompatibility(&mut self, message: String) {
        self.delegate.incompatibility_error(&message);
    }

    fn progress(&mut self) {
        if self.header.file_size > 0 {
            let pos = self.r.tell();
            self.delegate
                .progress((pos as f64 / self.header.file_size as f64).min(1.0));
        }
    }

    fn read_frames(&mut self) {
        let mut nframes = self.header.frames as u32;
        if nframes > 1 && self.delegate.decode_one_frame() {
            nframes = 1;
        }

        for frame in 0..nframes {
            if !self.r.ok() {
                break;
            }
            let frame_pos = self.r.tell();
            self.progress();

            let frame_header = FrameHeader::read(&mut self.r);
            let mut canceled = false;
            if frame_header.magic == FRAME_MAGIC {
                if frame_header.duration > 0 {
                    self.sprite
                        .set_frame_duration(frame, frame_header.duration as u32);
                }
                canceled = self.read_chunks(frame, frame_header.chunks);
            } else {
                log::debug!("frame {} has bad magic {:#06x}", frame, frame_header.magic);
            }

            self.r.seek(frame_pos + frame_header.size as u64);
            if canceled || self.delegate.is_canceled() {
                log::debug!("decode canceled after frame {}", frame);
                break;
            }
        }
    }

    /// Returns `true` when the delegate canceled.
    fn read_chunks(&mut self, frame: u32, count: u32) -> bool {
        for _ in 0..count {
            if !self.r.ok() {
                break;
            }
            self.progress();
            let chunk = ChunkHeader::read(&mut self.r);
            if (chunk.size as u64) < CHUNK_HEADER_SIZE {
                self.error(format!("Invalid chunk size {} in frame {}", chunk.size, frame));
                break;
            }

            if let UserDataTarget::Tile { index, .. } = self.target {
                if chunk.kind != ChunkType::UserData {
                    self.error(format!(
                        "Warning: Unexpected chunk type {} when reading tileset index {}",
                        chunk.kind.code(),
                        index
                    ));
                    self.target = UserDataTarget::None;
                }
            }

            self.read_chunk(frame, &chunk);
            self.r.seek(chunk.end());

            if self.delegate.is_canceled() {
                return true;
            }
        }
        false
    }

    fn read_chunk(&mut self, frame: u32, chunk: &ChunkHeader) {
        log::trace!("chunk {:?} ({} bytes) at {}", chunk.kind, chunk.size, chunk.start);
        match chunk.kind {
            ChunkType::OldPalette256 | ChunkType::OldPalette64 => {
                if !self.ignore_old_color_chunks {
                    let six_bits = chunk.kind == ChunkType::OldPalette64;
                    let pal = self.read_color_chunk(frame, six_bits);
                    self.apply_palette(frame, pal);
                }
            }
            ChunkType::Palette => {
                let pal = self.read_palette_chunk(frame);
                self.apply_palette(frame, pal);
                self.ignore_old_color_chunks = true;
            }
            ChunkType::Layer => {
                let layer = self.read_layer_chunk();
                self.layers.push(layer);
                self.target = match layer {
                    Some(id) => UserDataTarget::Layer(id),
                    None => UserDataTarget::None,
                };
            }
            ChunkType::Cel => {
                let cel = self.read_cel_chunk(frame, chunk.end());
                if cel.is_some() {
                    self.last_cel = cel;
                }
                self.target = match cel {
                    Some(id) => UserDataTarget::CelData(id),
                    None => UserDataTarget::None,
                };
            }
            ChunkType::CelExtra => {
                if let Some(id) = self.last_cel {
                    self.read_cel_extra_chunk(id);
                }
            }
            ChunkType::ColorProfile => self.read_color_profile(),
            ChunkType::ExternalFiles => {
                self.ext.read(&mut self.r);
                if let Some(plugin) = self.ext.tile_management_plugin() {
                    self.sprite.tile_management_plugin = Some(plugin.to_string());
                }
            }
            ChunkType::Mask => self.read_mask_chunk(),
            ChunkType::Path => {}
            ChunkType::Tags => {
                let first = self.sprite.tags.len();
                self.read_tags_chunk();
                self.target = if self.sprite.tags.len() > first {
                    UserDataTarget::Tag(first)
                } else {
                    UserDataTarget::None
                };
            }
            ChunkType::Slices => self.read_slices_chunk(),
            ChunkType::Slice => {
                let slice = self.read_slice_body();
                self.sprite.slices.push(slice);
                self.target = UserDataTarget::Slice(self.sprite.slices.len() - 1);
            }
            ChunkType::UserData => self.read_user_data_chunk(),
            ChunkType::Tileset => {
                self.target = match self.read_tileset_chunk() {
                    Some(id) => UserDataTarget::Tileset(id),
                    None => UserDataTarget::None,
                };
            }
            ChunkType::Unknown(code) => {
                self.incompatibility(format!("Warning: Unsupported chunk type {} (skipping)", code));
            }
        }
    }

    fn apply_palette(&mut self, frame: u32, pal: Palette) {
        if !self.sprite.palette(frame).same_entries(&pal) {
            self.sprite.set_palette(pal);
        }
    }

    // Palettes

    /// Old FLI color chunk: packets of (skip, count) followed by RGB triples.
    /// A count of 0 means 256.
    fn read_color_chunk(&mut self, frame: u32, six_bits: bool) -> Palette {
        let mut pal = self.sprite.palette(frame).clone();
        pal.set_frame(frame);

        let packets = self.r.read_u16();
        let mut index = 0usize;
        for _ in 0..packets {
            index += self.r.read_u8() as usize;
            let size = match self.r.read_u8() {
                0 => 256,
                n => n as usize,
            };
            for _ in 0..size {
                let (mut red, mut green, mut blue) = (self.r.read_u8(), self.r.read_u8(), self.r.read_u8());
                if six_bits {
                    red = scale_6bits_to_8bits(red);
                    green = scale_6bits_to_8bits(green);
                    blue = scale_6bits_to_8bits(blue);
                }
                pal.set_entry(index, rgba(red, green, blue, 255));
                index += 1;
            }
            if !self.r.ok() {
                break;
            }
        }
        pal
    }

    fn read_palette_chunk(&mut self, frame: u32) -> Palette {
        let mut pal = self.sprite.palette(frame).clone();
        pal.set_frame(frame);

        let new_size = self.r.read_u32();
        let from = self.r.read_u32();
        let to = self.r.read_u32();
        self.r.read_padding(8);

        if new_size > 0 {
            pal.resize(new_size as usize);
        }
        if from <= to {
            for c in from..=to {
                let flags = self.r.read_u16();
                let (red, green, blue, alpha) =
                    (self.r.read_u8(), self.r.read_u8(), self.r.read_u8(), self.r.read_u8());
                if !self.r.ok() {
                    break;
                }
                pal.set_entry(c as usize, rgba(red, green, blue, alpha));
                if flags & PALETTE_ENTRY_FLAG_HAS_NAME != 0 {
                    let name = self.r.read_string();
                    pal.set_entry_name(c as usize, name);
                }
            }
        }
        pal
    }

    // Layers

    fn read_layer_chunk(&mut self) -> Option<LayerId> {
        let flags = self.r.read_u16();
        let layer_type = self.r.read_u16();
        let child_level = self.r.read_u16() as i32;
        self.r.read_u16(); // default width
        self.r.read_u16(); // default height
        let blend_mode = self.r.read_u16();
        let opacity = self.r.read_u8();
        self.r.read_padding(3);
        let name = self.r.read_string();

        let kind = match layer_type {
            LAYER_TYPE_IMAGE => LayerKind::Image,
            LAYER_TYPE_GROUP => LayerKind::Group,
            LAYER_TYPE_TILEMAP => {
                let tileset = self.r.read_u32();
                if self.sprite.tilesets.get(tileset).is_none() {
                    self.error(format!("Error: tileset {} not found", tileset));
                    return None;
                }
                LayerKind::Tilemap { tileset }
            }
            other => {
                self.incompatibility(format!("Unknown layer type found: {}", other));
                return None;
            }
        };

        let header_flags = self.header.flags();
        let mut layer = Layer::new(kind, name);
        layer.flags = LayerFlags::from_bits_truncate(flags);

        // Only transparent layers (and groups in files that compose them)
        // have blend mode and opacity
        let blend_info = if layer.is_group() {
            header_flags.contains(HeaderFlags::COMPOSITE_GROUPS)
        } else {
            !layer.is_background()
        };
        if blend_info {
            layer.blend_mode = BlendMode::from_u16(blend_mode);
            if header_flags.contains(HeaderFlags::LAYER_OPACITY) {
                layer.opacity = opacity;
            }
        }
        if header_flags.contains(HeaderFlags::LAYER_UUIDS) {
            layer.uuid = self.r.read_uuid();
        }

        let parent = self.parent_for_level(child_level);
        let id = self.sprite.add_layer(parent, layer);
        self.last_layer = id;
        self.current_level = child_level;
        Some(id)
    }

    /// Parent of a new layer declared at `level`, relative to the cursor.
    fn parent_for_level(&self, level: i32) -> LayerId {
        let root = self.sprite.root();
        let parent_of = |id: LayerId| self.sprite.layer(id).parent().unwrap_or(root);

        if level > self.current_level {
            self.last_layer
        } else {
            let mut parent = parent_of(self.last_layer);
            for _ in 0..(self.current_level - level) {
                match self.sprite.layer(parent).parent() {
                    Some(p) => parent = p,
                    None => break,
                }
            }
            parent
        }
    }

    // Cels

    fn read_cel_chunk(&mut self, frame: u32, chunk_end: u64) -> Option<CelDataId> {
        let layer_index = self.r.read_u16();
        let x = self.r.read_i16() as i32;
        let y = self.r.read_i16() as i32;
        let opacity = self.r.read_u8();
        let cel_type = self.r.read_u16();
        let z_index = self.r.read_i16();
        self.r.read_padding(5);

        let Some(layer_id) = self.layers.get(layer_index as usize).copied().flatten() else {
            self.error(format!(
                "Frame {} didn't find layer with index {}",
                frame, layer_index
            ));
            return None;
        };
        let (is_group, tileset) = {
            let layer = self.sprite.layer(layer_id);
            (layer.is_group(), layer.tileset_index())
        };
        if is_group {
            self.error(format!(
                "Invalid .ase file (frame {} in layer {} which does not contain images)",
                frame, layer_index
            ));
            return None;
        }
        let format = if tileset.is_some() { PixelFormat::Tilemap } else { self.sprite.format() };
        let position = Point::new(x, y);

        let data = match CelType::from_u16(cel_type) {
            Some(CelType::Raw) => {
                let (w, h) = (self.r.read_u16() as u32, self.r.read_u16() as u32);
                if w == 0 || h == 0 {
                    return None;
                }
                let mut image = Image::new(format, w, h);
                read_raw_image(&mut self.r, &mut image);
                CelData::new(image, position, opacity)
            }
            Some(CelType::Link) => {
                let link_frame = self.r.read_u16() as u32;
                return self.link_cel(layer_id, frame, link_frame, position, opacity, z_index);
            }
            Some(CelType::Compressed) => {
                let (w, h) = (self.r.read_u16() as u32, self.r.read_u16() as u32);
                if w == 0 || h == 0 {
                    return None;
                }
                let mut image = Image::new(format, w, h);
                if let Err(e) = read_compressed_image(&mut self.r, &mut image, chunk_end) {
                    self.error(e.to_string());
                }
                CelData::new(image, position, opacity)
            }
            Some(CelType::CompressedTilemap) => {
                let image = self.read_tilemap_image(tileset, chunk_end)?;
                CelData::new(image, position, opacity)
            }
            None => {
                self.incompatibility(format!("Unknown cel type found: {}", cel_type));
                return None;
            }
        };

        let id = self.sprite.add_cel_data(data);
        self.sprite.add_cel(layer_id, frame, id, z_index);
        Some(id)
    }

    fn link_cel(
        &mut self,
        layer: LayerId,
        frame: u32,
        link_frame: u32,
        position: Point,
        opacity: u8,
        z_index: i16,
    ) -> Option<CelDataId> {
        let Some(target) = self.sprite.cel(layer, link_frame).map(|c| c.data) else {
            self.error(format!(
                "Frame {} has a linked cel to frame {} which doesn't exist",
                frame, link_frame
            ));
            return None;
        };

        let shared = self.sprite.cel_data(target);
        if shared.position == position && shared.opacity == opacity {
            self.sprite.add_cel(layer, frame, target, z_index);
            Some(target)
        } else {
            // Old files could give each link its own position and opacity
            let mut copy = shared.clone();
            copy.position = position;
            copy.opacity = opacity;
            let id = self.sprite.add_cel_data(copy);
            self.sprite.add_cel(layer, frame, id, z_index);
            Some(id)
        }
    }

    fn read_tilemap_image(&mut self, tileset: Option<u32>, chunk_end: u64) -> Option<Image> {
        let w = self.r.read_u16() as u32;
        let h = self.r.read_u16() as u32;
        let bits_per_tile = self.r.read_u16();
        let masks = TileMasks {
            index: self.r.read_u32(),
            xflip: self.r.read_u32(),
            yflip: self.r.read_u32(),
            dflip: self.r.read_u32(),
        };
        self.r.read_padding(10);

        if bits_per_tile != 32 {
            self.incompatibility(format!(
                "Unsupported tile format: {} bits per tile",
                bits_per_tile
            ));
            return None;
        }
        if w == 0 || h == 0 {
            return None;
        }

        let mut image = Image::filled(PixelFormat::Tilemap, w, h, NOTILE);
        if let Err(e) = read_compressed_image(&mut self.r, &mut image, chunk_end) {
            self.error(e.to_string());
        }

        let info = tileset.and_then(|id| self.tilesets.get(&id).copied());
        if let Some(info) = info {
            if !info.flags.contains(TilesetFlags::ZERO_IS_NOTILE) {
                fix_old_tilemap(&mut image, masks, info.shift);
            }
        }

        let tileset_len = tileset
            .and_then(|id| self.sprite.tilesets.get(id))
            .map_or(0, Tileset::len);
        image.map_pixels(|t| masks.to_native(t, tileset_len));
        Some(image)
    }

    fn read_cel_extra_chunk(&mut self, cel: CelDataId) {
        let flags = self.r.read_u32();
        if flags & CEL_EXTRA_FLAG_PRECISE_BOUNDS != 0 {
            let x = self.r.read_i32();
            let y = self.r.read_i32();
            let w = self.r.read_i32();
            let h = self.r.read_i32();
            if w != 0 && h != 0 {
                self.sprite.cel_data_mut(cel).bounds = Some(RectF {
                    x: fixed_to_f64(x),
                    y: fixed_to_f64(y),
                    w: fixed_to_f64(w),
                    h: fixed_to_f64(h),
                });
            }
        }
    }

    // Document-level chunks

    fn read_color_profile(&mut self) {
        let kind = self.r.read_u16();
        let flags = self.r.read_u16();
        let gamma = fixed_to_f64(self.r.read_i32());
        self.r.read_padding(8);
        let has_gamma = flags & COLOR_PROFILE_FLAG_GAMMA != 0;

        self.sprite.color_space = match kind {
            COLOR_PROFILE_NONE if has_gamma => Some(ColorSpace::srgb_with_gamma(gamma)),
            COLOR_PROFILE_NONE => Some(ColorSpace::none()),
            COLOR_PROFILE_SRGB if has_gamma => Some(ColorSpace::srgb_with_gamma(gamma)),
            COLOR_PROFILE_SRGB => Some(ColorSpace::srgb()),
            COLOR_PROFILE_ICC => {
                let length = self.r.read_u32() as usize;
                if length > 0 {
                    let mut data = vec![0u8; length];
                    let n = self.r.read_bytes(&mut data);
                    data.truncate(n);
                    Some(ColorSpace::icc(data))
                } else {
                    None
                }
            }
            other => {
                self.incompatibility(format!("Unknown color profile type found: {}", other));
                None
            }
        };
    }

    /// Legacy selection mask: read to keep the stream honest, then dropped.
    fn read_mask_chunk(&mut self) {
        let _x = self.r.read_i16();
        let _y = self.r.read_i16();
        let w = self.r.read_u16() as usize;
        let h = self.r.read_u16() as usize;
        self.r.read_padding(8);
        let name = self.r.read_string();
        self.r.read_padding(h * w.div_ceil(8));
        if !self.r.ok() {
            self.error("Warning: Cannot load a mask chunk".to_string());
        } else {
            log::debug!("ignoring mask '{}' ({}x{})", name, w, h);
        }
    }

    fn read_tags_chunk(&mut self) {
        let ntags = self.r.read_u16();
        self.r.read_padding(8);

        for _ in 0..ntags {
            if !self.r.ok() {
                break;
            }
            let from = self.r.read_u16() as u32;
            let to = self.r.read_u16() as u32;
            let ani_dir = AniDir::from_u8(self.r.read_u8());
            let repeat = self.r.read_u16() as u32;
            self.r.read_padding(6);
            let (red, green, blue) = (self.r.read_u8(), self.r.read_u8(), self.r.read_u8());
            self.r.read_u8();
            let name = self.r.read_string();

            let mut tag = Tag::new(name, from, to);
            tag.ani_dir = ani_dir;
            tag.repeat = repeat;
            // Files from before tag user data only have this color
            tag.user_data.color = rgba(red, green, blue, 255);
            self.sprite.tags.push(tag);
        }
    }

    fn read_slices_chunk(&mut self) {
        let nslices = self.r.read_u32();
        self.r.read_padding(8);
        let color = self.delegate.default_slice_color();
        for _ in 0..nslices {
            if !self.r.ok() {
                break;
            }
            let mut slice = self.read_slice_body();
            slice.user_data.color = color;
            self.sprite.slices.push(slice);
        }
    }

    fn read_slice_body(&mut self) -> Slice {
        let nkeys = self.r.read_u32();
        let flags = SliceFlags::from_bits_retain(self.r.read_u32());
        self.r.read_u32(); // reserved
        let mut slice = Slice::new(self.r.read_string());

        for _ in 0..nkeys {
            if !self.r.ok() {
                break;
            }
            let frame = self.r.read_u32();
            let mut key = SliceKey::new(self.read_rect());
            if flags.contains(SliceFlags::HAS_CENTER) {
                let center = self.read_rect();
                if !center.is_empty() {
                    key.center = Some(center);
                }
            }
            if flags.contains(SliceFlags::HAS_PIVOT) {
                key.pivot = Some(Point::new(self.r.read_i32(), self.r.read_i32()));
            }
            slice.insert(frame, key);
        }
        slice
    }

    fn read_rect(&mut self) -> Rect {
        Rect::new(
            self.r.read_i32(),
            self.r.read_i32(),
            self.r.read_u32() as i32,
            self.r.read_u32() as i32,
        )
    }

    fn read_user_data_chunk(&mut self) {
        let ud = {
            let delegate = &mut *self.delegate;
            read_user_data(&mut self.r, &self.ext, &mut |d: Diagnostic| delegate.report(d))
        };

        self.target = match self.target {
            UserDataTarget::None => UserDataTarget::None,
            UserDataTarget::Sprite => {
                self.sprite.user_data = ud;
                UserDataTarget::Sprite
            }
            UserDataTarget::Layer(id) => {
                self.sprite.layer_mut(id).user_data = ud;
                UserDataTarget::Layer(id)
            }
            UserDataTarget::CelData(id) => {
                self.sprite.cel_data_mut(id).user_data = ud;
                UserDataTarget::CelData(id)
            }
            UserDataTarget::Tag(i) => {
                if let Some(tag) = self.sprite.tags.get_mut(i) {
                    tag.user_data = ud;
                }
                // Tag user data chunks come one per tag, in tag order
                if i + 1 < self.sprite.tags.len() {
                    UserDataTarget::Tag(i + 1)
                } else {
                    UserDataTarget::None
                }
            }
            UserDataTarget::Slice(i) => {
                if let Some(slice) = self.sprite.slices.get_mut(i) {
                    slice.user_data = ud;
                }
                UserDataTarget::Slice(i)
            }
            UserDataTarget::Tileset(id) => {
                if let Some(ts) = self.sprite.tilesets.get_mut(id) {
                    ts.user_data = ud;
                }
                match self.tilesets.get(&id) {
                    Some(info) if info.file_tiles > 0 => {
                        UserDataTarget::Tile { tileset: id, index: 0 }
                    }
                    _ => UserDataTarget::None,
                }
            }
            UserDataTarget::Tile { tileset, index } => {
                let info = self.tilesets.get(&tileset).copied();
                let shift = info.map_or(0, |i| i.shift);
                if let Some(ts) = self.sprite.tilesets.get_mut(tileset) {
                    ts.set_tile_data((index + shift) as usize, ud);
                }
                match info {
                    Some(info) if index + 1 < info.file_tiles => {
                        UserDataTarget::Tile { tileset, index: index + 1 }
                    }
                    _ => UserDataTarget::None,
                }
            }
        };
    }

    // Tilesets

    fn read_tileset_chunk(&mut self) -> Option<u32> {
        let id = self.r.read_u32();
        let flags = TilesetFlags::from_bits_retain(self.r.read_u32());
        let ntiles = self.r.read_u32();
        let w = self.r.read_u16() as u32;
        let h = self.r.read_u16() as u32;
        let base_index = self.r.read_i16() as i32;
        self.r.read_padding(14);
        let name = self.r.read_string();

        let atlas_height = h.checked_mul(ntiles).filter(|ah| w.checked_mul(*ah).is_some());
        if w < 1 || h < 1 || atlas_height.is_none() {
            self.error(format!(
                "Error: Invalid tileset (number of tiles={}, tile size={}x{})",
                ntiles, w, h
            ));
            return None;
        }

        let format = self.sprite.format();
        let mut tileset = Tileset::new(format, w, h, ntiles as usize);
        tileset.name = name;
        tileset.base_index = base_index;

        if flags.contains(TilesetFlags::EXTERNAL_FILE) {
            let file_id = self.r.read_u32();
            let external_id = self.r.read_u32();
            match self.ext.filename_by_id(file_id) {
                Some(filename) => {
                    tileset.external = Some(ExternalTileset {
                        filename: filename.to_string(),
                        tileset: external_id,
                    });
                }
                None => self.error(format!(
                    "Error: Invalid external file reference (id={} not found)",
                    file_id
                )),
            }
        }

        let mut shift = 0;
        if flags.contains(TilesetFlags::EMBEDDED) && ntiles > 0 {
            let data_size = self.r.read_u32() as u64;
            let data_start = self.r.tell();
            let data_end = data_start + data_size;

            let mut cached = Vec::new();
            if self.delegate.cache_compressed_tilesets() && data_size > 0 {
                cached = vec![0u8; data_size as usize];
                let n = self.r.read_bytes(&mut cached);
                cached.truncate(n);
                self.r.seek(data_start);
            }

            let mut atlas = Image::new(format, w, atlas_height.unwrap_or(0));
            if let Err(e) = read_compressed_image(&mut self.r, &mut atlas, data_end) {
                self.error(e.to_string());
            }
            self.r.seek(data_end);

            for i in 0..ntiles {
                tileset.set_tile(i as usize, atlas.crop_rows(i * h, h));
            }

            if flags.contains(TilesetFlags::ZERO_IS_NOTILE) {
                if !cached.is_empty() {
                    tileset.set_compressed_cache(cached);
                }
            } else {
                // The cached atlas no longer matches once a tile is inserted
                let empty = if format == PixelFormat::Indexed {
                    self.sprite.transparent_index as u32
                } else {
                    0
                };
                shift = fix_old_tileset(&mut tileset, empty);
            }
        }

        let mut match_flags = 0;
        if flags.contains(TilesetFlags::MATCH_XFLIP) {
            match_flags |= TILE_XFLIP;
        }
        if flags.contains(TilesetFlags::MATCH_YFLIP) {
            match_flags |= TILE_YFLIP;
        }
        if flags.contains(TilesetFlags::MATCH_DFLIP) {
            match_flags |= TILE_DFLIP;
        }
        tileset.match_flags = match_flags;

        self.sprite.tilesets.set(id, tileset);
        self.tilesets.insert(id, TilesetInfo { flags, file_tiles: ntiles, shift });
        Some(id)
    }
}

/// Make tile 0 the empty tile of a tileset written before that rule existed.
///
/// Returns how many tiles were inserted in front (0 or 1).
fn fix_old_tileset(tileset: &mut Tileset, empty: u32) -> u32 {
    tileset.base_index = 1;
    if tileset.tile(0).is_some_and(|t| t.is_plain(empty)) {
        return 0;
    }
    let image = Image::filled(tileset.format(), tileset.tile_width(), tileset.tile_height(), empty);
    tileset.insert_tile(0, image);
    1
}

/// Re-index a tilemap whose tileset went through [`fix_old_tileset`].
///
/// Old files mark empty cells with every index bit set.
fn fix_old_tilemap(image: &mut Image, masks: TileMasks, shift: u32) {
    let index_shift = mask_shift(masks.index);
    let all_ones = masks.index >> index_shift;
    let flags_mask = masks.flags();
    image.map_pixels(|t| {
        let index = (t & masks.index) >> index_shift;
        if index == all_ones {
            NOTILE
        } else {
            (((index + shift) << index_shift) & masks.index) | (t & flags_mask)
        }
    });
}

/// A decoded sprite and the problems found while reading it.
#[derive(Debug)]
pub struct Decoded {
    pub sprite: Sprite,
    pub diagnostics: Vec<Diagnostic>,
}

/// Decode with a [`CollectingDelegate`].
pub fn decode_with<R: Read + Seek>(reader: R, config: &DecodeConfig) -> Result<Decoded, DecodeError> {
    let mut delegate = CollectingDelegate::with_config(config.clone());
    decode(&mut delegate, reader)?;
    let (sprite, diagnostics) = delegate.into_parts();
    let sprite = sprite.ok_or(DecodeError::TruncatedHeader)?;
    Ok(Decoded { sprite, diagnostics })
}

pub fn decode_bytes(bytes: &[u8]) -> Result<Decoded, DecodeError> {
    decode_with(std::io::Cursor::new(bytes), &DecodeConfig::default())
}

pub fn read_file(path: &Path, config: &DecodeConfig) -> Result<Decoded, DecodeError> {
    let file = File::open(path)?;
    decode_with(BufReader::new(file), config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkWriter, FrameWriter};
    use crate::delegate::Severity;
    use crate::format::{FILE_MAGIC, HEADER_SIZE};
    use crate::pixel::tile;
    use crate::stream::ByteWriter;
    use std::io::Cursor;

    fn header(frames: u16) -> AsepriteHeader {
        AsepriteHeader {
            magic: FILE_MAGIC,
            frames,
            width: 4,
            height: 4,
            depth: 32,
            flags: HeaderFlags::LAYER_OPACITY.bits(),
            speed: 100,
            ncolors: 2,
            pixel_width: 1,
            pixel_height: 1,
            ..Default::default()
        }
    }

    /// A file with one frame whose chunks are produced by `body`.
    fn file_with(body: impl FnOnce(&mut ByteWriter<Cursor<Vec<u8>>>, &mut FrameWriter)) -> Vec<u8> {
        let mut w = ByteWriter::new(Cursor::new(Vec::new()));
        header(1).write(&mut w);
        let mut frame = FrameWriter::begin(&mut w);
        body(&mut w, &mut frame);
        frame.finish(&mut w);
        w.into_inner().into_inner()
    }

    fn layer_chunk(w: &mut ByteWriter<Cursor<Vec<u8>>>, frame: &mut FrameWriter, name: &str, kind: u16, level: u16) {
        let mut c = ChunkWriter::begin(w, &mut frame.chunks, ChunkType::Layer);
        c.write_u16(LayerFlags::VISIBLE.bits());
        c.write_u16(kind);
        c.write_u16(level);
        c.write_u16(0);
        c.write_u16(0);
        c.write_u16(0);
        c.write_u8(255);
        c.write_padding(3);
        c.write_string(name);
    }

    fn user_data_chunk(w: &mut ByteWriter<Cursor<Vec<u8>>>, frame: &mut FrameWriter, text: &str) {
        let mut c = ChunkWriter::begin(w, &mut frame.chunks, ChunkType::UserData);
        c.write_u32(1);
        c.write_string(text);
    }

    #[test]
    fn test_bad_magic_is_fatal() {
        let mut bytes = file_with(|_, _| {});
        bytes[4] = 0;
        let mut d = CollectingDelegate::new();
        let err = decode(&mut d, Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, DecodeError::BadMagic(_)));
        assert!(d.sprite().is_none());
        assert_eq!(d.diagnostics().len(), 1);
    }

    #[test]
    fn test_invalid_depth_is_fatal() {
        let mut w = ByteWriter::new(Cursor::new(Vec::new()));
        AsepriteHeader { depth: 24, ..header(1) }.write(&mut w);
        let err = decode_bytes(&w.into_inner().into_inner()).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidColorDepth(24)));
    }

    #[test]
    fn test_truncated_header() {
        let err = decode_bytes(&[0u8; 20]).unwrap_err();
        assert!(matches!(err, DecodeError::TruncatedHeader));
    }

    #[test]
    fn test_layer_tree_from_child_levels() {
        let bytes = file_with(|w, f| {
            layer_chunk(w, f, "a", LAYER_TYPE_IMAGE, 0);
            layer_chunk(w, f, "g", LAYER_TYPE_GROUP, 0);
            layer_chunk(w, f, "g1", LAYER_TYPE_GROUP, 1);
            layer_chunk(w, f, "deep", LAYER_TYPE_IMAGE, 2);
            layer_chunk(w, f, "b", LAYER_TYPE_IMAGE, 1);
            layer_chunk(w, f, "top", LAYER_TYPE_IMAGE, 0);
        });
        let decoded = decode_bytes(&bytes).unwrap();
        let s = &decoded.sprite;
        let names: Vec<(String, u16)> = s
            .layers_preorder()
            .into_iter()
            .map(|(id, level)| (s.layer(id).name.clone(), level))
            .collect();
        assert_eq!(
            names,
            vec![
                ("a".to_string(), 0),
                ("g".to_string(), 0),
                ("g1".to_string(), 1),
                ("deep".to_string(), 2),
                ("b".to_string(), 1),
                ("top".to_string(), 0),
            ]
        );
        assert!(decoded.diagnostics.is_empty());
    }

    #[test]
    fn test_unknown_chunk_is_skipped_with_one_warning() {
        let bytes = file_with(|w, f| {
            layer_chunk(w, f, "before", LAYER_TYPE_IMAGE, 0);
            {
                let mut c = ChunkWriter::begin(w, &mut f.chunks, ChunkType::Unknown(0x7ABC));
                c.write_bytes(&[0xFF; 13]);
            }
            layer_chunk(w, f, "after", LAYER_TYPE_IMAGE, 0);
        });
        let decoded = decode_bytes(&bytes).unwrap();
        assert_eq!(decoded.diagnostics.len(), 1);
        assert_eq!(decoded.diagnostics[0].severity, Severity::Incompatibility);
        assert!(decoded.sprite.find_layer("before").is_some());
        assert!(decoded.sprite.find_layer("after").is_some());
    }

    #[test]
    fn test_tag_user_data_follows_tag_order() {
        let bytes = file_with(|w, f| {
            {
                let mut c = ChunkWriter::begin(w, &mut f.chunks, ChunkType::Tags);
                c.write_u16(2);
                c.write_padding(8);
                for (name, color) in [("idle", 10u8), ("run", 20u8)] {
                    c.write_u16(0);
                    c.write_u16(0);
                    c.write_u8(0);
                    c.write_u16(0);
                    c.write_padding(6);
                    c.write_bytes(&[color, color, color, 0]);
                    c.write_string(name);
                }
            }
            user_data_chunk(w, f, "first");
            user_data_chunk(w, f, "second");
        });
        let sprite = decode_bytes(&bytes).unwrap().sprite;
        assert_eq!(sprite.tags[0].user_data.text, "first");
        assert_eq!(sprite.tags[1].user_data.text, "second");
        // The user data chunk replaces the legacy tag color
        assert_eq!(sprite.tags[1].user_data.color, 0);
    }

    #[test]
    fn test_legacy_tag_color_without_user_data() {
        let bytes = file_with(|w, f| {
            let mut c = ChunkWriter::begin(w, &mut f.chunks, ChunkType::Tags);
            c.write_u16(1);
            c.write_padding(8);
            c.write_u16(1);
            c.write_u16(3);
            c.write_u8(9); // unknown direction
            c.write_u16(2);
            c.write_padding(6);
            c.write_bytes(&[1, 2, 3, 0]);
            c.write_string("jump");
        });
        let sprite = decode_bytes(&bytes).unwrap().sprite;
        let tag = &sprite.tags[0];
        assert_eq!((tag.from, tag.to, tag.repeat), (1, 3, 2));
        assert_eq!(tag.ani_dir, AniDir::Forward);
        assert_eq!(tag.user_data.color, rgba(1, 2, 3, 255));
    }

    #[test]
    fn test_old_color_chunks_ignored_after_palette_chunk() {
        let bytes = file_with(|w, f| {
            {
                let mut c = ChunkWriter::begin(w, &mut f.chunks, ChunkType::Palette);
                c.write_u32(2);
                c.write_u32(0);
                c.write_u32(1);
                c.write_padding(8);
                c.write_u16(0);
                c.write_bytes(&[1, 2, 3, 128]);
                c.write_u16(PALETTE_ENTRY_FLAG_HAS_NAME);
                c.write_bytes(&[4, 5, 6, 255]);
                c.write_string("skin");
            }
            let mut c = ChunkWriter::begin(w, &mut f.chunks, ChunkType::OldPalette256);
            c.write_u16(1);
            c.write_u8(0);
            c.write_u8(1);
            c.write_bytes(&[9, 9, 9]);
        });
        let sprite = decode_bytes(&bytes).unwrap().sprite;
        let pal = sprite.palette(0);
        assert_eq!(pal.entry(0), rgba(1, 2, 3, 128));
        assert_eq!(pal.entry_name(1), "skin");
    }

    #[test]
    fn test_six_bit_color_chunk() {
        let bytes = file_with(|w, f| {
            let mut c = ChunkWriter::begin(w, &mut f.chunks, ChunkType::OldPalette64);
            c.write_u16(1);
            c.write_u8(1); // skip entry 0
            c.write_u8(1);
            c.write_bytes(&[63, 0, 32]);
        });
        let sprite = decode_bytes(&bytes).unwrap().sprite;
        assert_eq!(sprite.palette(0).entry(1), rgba(255, 0, 130, 255));
        assert_eq!(sprite.palette(0).entry(0), rgba(0, 0, 0, 255));
    }

    #[test]
    fn test_cel_on_missing_layer_is_error() {
        let bytes = file_with(|w, f| {
            let mut c = ChunkWriter::begin(w, &mut f.chunks, ChunkType::Cel);
            c.write_u16(3);
            c.write_padding(14);
        });
        let decoded = decode_bytes(&bytes).unwrap();
        assert_eq!(decoded.diagnostics.len(), 1);
        assert_eq!(decoded.diagnostics[0].severity, Severity::Error);
    }

    #[test]
    fn test_tile_user_data_state_machine() {
        let bytes = file_with(|w, f| {
            {
                let mut c = ChunkWriter::begin(w, &mut f.chunks, ChunkType::Tileset);
                c.write_u32(0);
                c.write_u32(TilesetFlags::ZERO_IS_NOTILE.bits());
                c.write_u32(2);
                c.write_u16(8);
                c.write_u16(8);
                c.write_i16(1);
                c.write_padding(14);
                c.write_string("ground");
            }
            user_data_chunk(w, f, "tileset");
            user_data_chunk(w, f, "tile0");
            user_data_chunk(w, f, "tile1");
            // No longer a tile: goes nowhere
            user_data_chunk(w, f, "stray");
        });
        let decoded = decode_bytes(&bytes).unwrap();
        let ts = decoded.sprite.tilesets.get(0).unwrap();
        assert_eq!(ts.name, "ground");
        assert_eq!(ts.user_data.text, "tileset");
        assert_eq!(ts.tile_data(0).unwrap().text, "tile0");
        assert_eq!(ts.tile_data(1).unwrap().text, "tile1");
        assert!(decoded.diagnostics.is_empty());
    }

    #[test]
    fn test_tile_user_data_interrupted() {
        let bytes = file_with(|w, f| {
            {
                let mut c = ChunkWriter::begin(w, &mut f.chunks, ChunkType::Tileset);
                c.write_u32(0);
                c.write_u32(TilesetFlags::ZERO_IS_NOTILE.bits());
                c.write_u32(3);
                c.write_u16(8);
                c.write_u16(8);
                c.write_i16(1);
                c.write_padding(14);
                c.write_string("");
            }
            user_data_chunk(w, f, "tileset");
            user_data_chunk(w, f, "tile0");
            layer_chunk(w, f, "l", LAYER_TYPE_IMAGE, 0);
            user_data_chunk(w, f, "layer");
        });
        let decoded = decode_bytes(&bytes).unwrap();
        assert_eq!(decoded.diagnostics.len(), 1);
        assert!(decoded.diagnostics[0].message.contains("tileset index 1"));
        let layer = decoded.sprite.find_layer("l").unwrap();
        assert_eq!(decoded.sprite.layer(layer).user_data.text, "layer");
    }

    #[test]
    fn test_fix_old_tilemap() {
        let masks = TileMasks::NATIVE;
        let mut image = Image::from_pixels(
            PixelFormat::Tilemap,
            3,
            1,
            vec![0x1fff_ffff, 0, 4 | TILE_XFLIP],
        )
        .unwrap();
        fix_old_tilemap(&mut image, masks, 1);
        assert_eq!(image.pixels(), &[NOTILE, 1, tile(5, TILE_XFLIP)]);
    }

    #[test]
    fn test_fix_old_tileset_inserts_empty_tile() {
        let mut ts = Tileset::new(PixelFormat::Rgba, 1, 1, 1);
        ts.set_tile(0, Image::filled(PixelFormat::Rgba, 1, 1, 7));
        assert_eq!(fix_old_tileset(&mut ts, 0), 1);
        assert_eq!(ts.len(), 2);
        assert_eq!(ts.tile(1).unwrap().pixels(), &[7]);

        let mut ts = Tileset::new(PixelFormat::Rgba, 1, 1, 1);
        assert_eq!(fix_old_tileset(&mut ts, 0), 0);
        assert_eq!(ts.len(), 1);
    }

    #[test]
    fn test_header_file_is_only_header() {
        let mut w = ByteWriter::new(Cursor::new(Vec::new()));
        header(0).write(&mut w);
        let bytes = w.into_inner().into_inner();
        assert_eq!(bytes.len() as u64, HEADER_SIZE);
        let decoded = decode_bytes(&bytes).unwrap();
        assert_eq!(decoded.sprite.frames(), 1);
        assert_eq!(decoded.sprite.width(), 4);
    }
}
