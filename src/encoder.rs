//! .aseprite encoder
//!
//! Writes the frames `from..=to` chosen by the [`EncodeDelegate`]. Frame
//! numbers in the output (tag ranges, slice keys, link targets) are relative
//! to `from`.
//!
//! Everything the external files chunk lists is collected before the first
//! frame, since that chunk has to precede every chunk that refers to it.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Cursor, Seek, Write};
use std::path::Path;

use crate::chunk::{ChunkWriter, FrameWriter};
use crate::compress::{write_compressed_image, write_raw_image, TilesetAtlas};
use crate::delegate::{Diagnostic, EncodeDelegate};
use crate::error::EncodeError;
use crate::external_files::{ExternalFileKind, ExternalFiles};
use crate::format::{
    f64_to_fixed, AsepriteHeader, CelType, ChunkType, HeaderFlags, SliceFlags, TilesetFlags,
    CEL_EXTRA_FLAG_PRECISE_BOUNDS, COLOR_PROFILE_FLAG_GAMMA, COLOR_PROFILE_ICC, COLOR_PROFILE_SRGB,
    FILE_MAGIC, LAYER_TYPE_GROUP, LAYER_TYPE_IMAGE, LAYER_TYPE_TILEMAP, PALETTE_ENTRY_FLAG_HAS_NAME,
};
use crate::model::{
    ColorSpaceKind, LayerId, LayerKind, Palette, Rect, Sprite, Tag, Tileset, UserData,
    TAG_MAX_REPEAT,
};
use crate::pixel::{rgba_a, rgba_b, rgba_g, rgba_r, TileMasks, TILE_DFLIP, TILE_XFLIP, TILE_YFLIP};
use crate::stream::ByteWriter;
use crate::user_data::{collect_extension_ids, write_user_data};

/// Largest palette the legacy color chunk can carry.
const LEGACY_PALETTE_MAX: usize = 256;

struct AsepriteEncoder<'d, W, D: ?Sized> {
    w: ByteWriter<W>,
    delegate: &'d D,
    sprite: &'d Sprite,
    from: u32,
    to: u32,
    flags: HeaderFlags,
    ext: ExternalFiles,
    /// Layers in file order with their child level.
    layers: Vec<(LayerId, u16)>,
    layer_index: HashMap<LayerId, u16>,
    /// Every palette goes in a new Palette chunk. Decoders drop legacy
    /// color chunks once a Palette chunk was seen.
    new_palette_chunk: bool,
}

/// Encode the delegate's sprite into `writer`.
pub fn encode<W: Write + Seek, D: EncodeDelegate + ?Sized>(
    delegate: &D,
    writer: W,
) -> Result<(), EncodeError> {
    let sprite = delegate.sprite();
    let last = sprite.frames().saturating_sub(1);
    let from = delegate.from_frame().min(last);
    let to = delegate.to_frame().clamp(from, last);

    let mut flags = HeaderFlags::LAYER_OPACITY;
    if delegate.compose_groups() {
        flags |= HeaderFlags::COMPOSITE_GROUPS;
    }
    if delegate.layer_uuids() {
        flags |= HeaderFlags::LAYER_UUIDS;
    }

    let layers = sprite.layers_preorder();
    let layer_index = layers
        .iter()
        .enumerate()
        .map(|(i, (id, _))| (*id, i as u16))
        .collect();

    let new_palette_chunk = requires_new_palette_chunk(sprite, from, to);
    if new_palette_chunk {
        log::debug!("writing palettes as new palette chunks");
    }

    let mut encoder = AsepriteEncoder {
        w: ByteWriter::new(writer),
        delegate,
        sprite,
        from,
        to,
        flags,
        ext: ExternalFiles::new(),
        layers,
        layer_index,
        new_palette_chunk,
    };
    encoder.collect_external_files();
    encoder.write()
}

fn in_range(tag: &Tag, from: u32, to: u32) -> bool {
    tag.from <= to && tag.to >= from
}

impl<W: Write + Seek, D: EncodeDelegate + ?Sized> AsepriteEncoder<'_, W, D> {
    fn collect_external_files(&mut self) {
        let sprite = self.sprite;
        let ext = &mut self.ext;

        for (_, tileset) in sprite.tilesets.iter() {
            if let Some(external) = &tileset.external {
                ext.insert(ExternalFileKind::Tileset, &external.filename);
            }
            collect_extension_ids(&tileset.user_data, ext);
            for tile in tileset.tiles() {
                collect_extension_ids(&tile.user_data, ext);
            }
        }

        collect_extension_ids(&sprite.user_data, ext);
        for tag in sprite.tags.iter().filter(|t| in_range(t, self.from, self.to)) {
            collect_extension_ids(&tag.user_data, ext);
        }
        for (id, _) in &self.layers {
            let layer = sprite.layer(*id);
            collect_extension_ids(&layer.user_data, ext);
            for (frame, cel) in layer.cels() {
                if (self.from..=self.to).contains(&frame) {
                    collect_extension_ids(&sprite.cel_data(cel.data).user_data, ext);
                }
            }
        }
        for slice in &sprite.slices {
            if !slice.keys_in_range(self.from, self.to).is_empty() {
                collect_extension_ids(&slice.user_data, ext);
            }
        }

        if let Some(plugin) = &sprite.tile_management_plugin {
            ext.insert(ExternalFileKind::TileManagement, plugin);
        }
    }

    fn write(mut self) -> Result<(), EncodeError> {
        let sprite = self.sprite;
        let header_pos = self.w.tell();
        let mut header = AsepriteHeader {
            file_size: 0,
            magic: FILE_MAGIC,
            frames: (self.to - self.from + 1).min(u16::MAX as u32) as u16,
            width: sprite.width().min(u16::MAX as u32) as u16,
            height: sprite.height().min(u16::MAX as u32) as u16,
            depth: sprite.format().depth(),
            flags: self.flags.bits(),
            speed: sprite.frame_duration(self.from).min(u16::MAX as u32) as u16,
            transparent_index: sprite.transparent_index,
            ncolors: sprite.palette(self.from).size().min(u16::MAX as usize) as u16,
            pixel_width: sprite.pixel_ratio.w,
            pixel_height: sprite.pixel_ratio.h,
            grid_x: sprite.grid_bounds.x as i16,
            grid_y: sprite.grid_bounds.y as i16,
            grid_width: sprite.grid_bounds.w as u16,
            grid_height: sprite.grid_bounds.h as u16,
        };
        header.write(&mut self.w);

        let total = self.to - self.from + 1;
        let mut written = 0;
        for frame in self.from..=self.to {
            self.write_frame(frame)?;
            written += 1;
            self.delegate.progress(written as f64 / total as f64);
            if self.delegate.is_canceled() {
                log::debug!("encode canceled after frame {}", frame);
                break;
            }
        }

        let end = self.w.tell();
        header.file_size = end.saturating_sub(header_pos) as u32;
        header.frames = written.min(u16::MAX as u32) as u16;
        self.w.seek(header_pos);
        header.write(&mut self.w);
        self.w.seek(end);
        self.w.flush();

        if self.w.ok() {
            Ok(())
        } else {
            Err(EncodeError::Write)
        }
    }

    fn write_frame(&mut self, frame: u32) -> Result<(), EncodeError> {
        let sprite = self.sprite;
        let first = frame == self.from;
        let mut fw = FrameWriter::begin(&mut self.w);
        fw.duration = sprite.frame_duration(frame).min(u16::MAX as u32) as u16;

        if first {
            if !self.ext.is_empty() {
                let mut c = ChunkWriter::begin(&mut self.w, &mut fw.chunks, ChunkType::ExternalFiles);
                self.ext.write(&mut *c);
            }
            if self.delegate.preserve_color_profile() {
                self.write_color_profile(&mut fw);
            }
        }

        let pal = sprite.palette(frame);
        let prev = if first { None } else { Some(sprite.palette(frame - 1)) };
        if prev.map_or(true, |p| !p.same_entries(pal)) {
            self.write_palette(&mut fw, pal, prev);
        }

        if first {
            if !sprite.user_data.is_empty() {
                self.write_user_data(&mut fw, &sprite.user_data);
            }
            for (id, tileset) in sprite.tilesets.iter() {
                self.write_tileset(&mut fw, id, tileset)?;
            }
            self.write_tags(&mut fw);
            for i in 0..self.layers.len() {
                let (id, level) = self.layers[i];
                self.write_layer(&mut fw, id, level);
            }
            self.write_slices(&mut fw);
        }

        for i in 0..self.layers.len() {
            let (id, _) = self.layers[i];
            if sprite.cel(id, frame).is_some() {
                self.write_cel(&mut fw, id, frame)?;
            }
        }

        fw.finish(&mut self.w);
        Ok(())
    }

    fn write_user_data(&mut self, fw: &mut FrameWriter, ud: &UserData) {
        let delegate = self.delegate;
        let mut c = ChunkWriter::begin(&mut self.w, &mut fw.chunks, ChunkType::UserData);
        write_user_data(&mut *c, &self.ext, ud, &mut |d: Diagnostic| delegate.error(&d.message));
    }

    fn write_color_profile(&mut self, fw: &mut FrameWriter) {
        let Some(cs) = &self.sprite.color_space else {
            return;
        };
        if cs.kind == ColorSpaceKind::None {
            return;
        }
        let mut c = ChunkWriter::begin(&mut self.w, &mut fw.chunks, ChunkType::ColorProfile);
        match cs.kind {
            ColorSpaceKind::Icc => {
                c.write_u16(COLOR_PROFILE_ICC);
                c.write_u16(0);
                c.write_i32(0);
                c.write_padding(8);
                c.write_u32(cs.icc.len() as u32);
                c.write_bytes(&cs.icc);
            }
            _ => {
                c.write_u16(COLOR_PROFILE_SRGB);
                c.write_u16(if cs.gamma.is_some() { COLOR_PROFILE_FLAG_GAMMA } else { 0 });
                c.write_i32(cs.gamma.map_or(0, f64_to_fixed));
                c.write_padding(8);
            }
        }
    }

    // Palettes

    fn write_palette(&mut self, fw: &mut FrameWriter, pal: &Palette, prev: Option<&Palette>) {
        if !self.new_palette_chunk {
            let mut c = ChunkWriter::begin(&mut self.w, &mut fw.chunks, ChunkType::OldPalette256);
            c.write_u16(1); // one packet
            c.write_u8(0); // skip
            c.write_u8(if pal.size() == LEGACY_PALETTE_MAX { 0 } else { pal.size() as u8 });
            for &color in pal.colors() {
                c.write_u8(rgba_r(color));
                c.write_u8(rgba_g(color));
                c.write_u8(rgba_b(color));
            }
            return;
        }

        let size = pal.size();
        // An empty range (from > to) is how an empty palette is written
        let (from, to) = match prev.and_then(|p| p.diff_range(pal)) {
            _ if size == 0 => (1, 0),
            Some((first, last)) => {
                let to = last.min(size - 1);
                (first.min(to), to)
            }
            None => (0, size - 1),
        };

        let mut c = ChunkWriter::begin(&mut self.w, &mut fw.chunks, ChunkType::Palette);
        c.write_u32(size as u32);
        c.write_u32(from as u32);
        c.write_u32(to as u32);
        c.write_padding(8);
        for i in from..=to {
            let color = pal.entry(i);
            let name = pal.entry_name(i);
            c.write_u16(if name.is_empty() { 0 } else { PALETTE_ENTRY_FLAG_HAS_NAME });
            c.write_u8(rgba_r(color));
            c.write_u8(rgba_g(color));
            c.write_u8(rgba_b(color));
            c.write_u8(rgba_a(color));
            if !name.is_empty() {
                c.write_string(name);
            }
        }
    }

    // Tilesets

    fn write_tileset(&mut self, fw: &mut FrameWriter, id: u32, tileset: &Tileset) -> Result<(), EncodeError> {
        let delegate = self.delegate;
        let caching = delegate.cache_compressed_tilesets();

        let mut flags = TilesetFlags::ZERO_IS_NOTILE;
        if tileset.match_flags & TILE_XFLIP != 0 {
            flags |= TilesetFlags::MATCH_XFLIP;
        }
        if tileset.match_flags & TILE_YFLIP != 0 {
            flags |= TilesetFlags::MATCH_YFLIP;
        }
        if tileset.match_flags & TILE_DFLIP != 0 {
            flags |= TilesetFlags::MATCH_DFLIP;
        }
        flags |= if tileset.external.is_some() {
            TilesetFlags::EXTERNAL_FILE
        } else {
            TilesetFlags::EMBEDDED
        };

        {
            let mut c = ChunkWriter::begin(&mut self.w, &mut fw.chunks, ChunkType::Tileset);
            c.write_u32(id);
            c.write_u32(flags.bits());
            c.write_u32(tileset.len() as u32);
            c.write_u16(tileset.tile_width() as u16);
            c.write_u16(tileset.tile_height() as u16);
            c.write_i16(tileset.base_index as i16);
            c.write_padding(14);
            c.write_string(&tileset.name);

            if let Some(external) = &tileset.external {
                match self.ext.id_by_filename(ExternalFileKind::Tileset, &external.filename) {
                    Some(file_id) => {
                        c.write_u32(file_id);
                        c.write_u32(external.tileset);
                    }
                    None => {
                        delegate.error("Error writing tileset external reference.");
                        c.write_u32(0);
                        c.write_u32(0);
                    }
                }
            } else if !tileset.is_empty() {
                let cached = if caching { tileset.cached_compressed() } else { None };
                match cached {
                    Some(data) => {
                        log::debug!("tileset {} reuses {} cached bytes", id, data.len());
                        c.write_u32(data.len() as u32);
                        c.write_bytes(&data);
                    }
                    None => {
                        let size_pos = c.tell();
                        c.write_u32(0);
                        let start = c.tell();
                        let mut buffer = Vec::new();
                        let cache = if caching { Some(&mut buffer) } else { None };
                        write_compressed_image(&mut *c, &TilesetAtlas(tileset), cache)?;
                        let end = c.tell();
                        c.seek(size_pos);
                        c.write_u32((end - start) as u32);
                        c.seek(end);
                        if caching {
                            tileset.set_compressed_cache(buffer);
                        }
                    }
                }
            }
        }

        // The decoder counts on one chunk for the tileset and one per tile
        self.write_user_data(fw, &tileset.user_data);
        for tile in tileset.tiles() {
            self.write_user_data(fw, &tile.user_data);
        }
        Ok(())
    }

    // Tags, layers and slices

    fn write_tags(&mut self, fw: &mut FrameWriter) {
        let (from, to) = (self.from, self.to);
        let sprite = self.sprite;
        let tags: Vec<&Tag> = sprite.tags.iter().filter(|t| in_range(t, from, to)).collect();
        if tags.is_empty() {
            return;
        }

        {
            let mut c = ChunkWriter::begin(&mut self.w, &mut fw.chunks, ChunkType::Tags);
            c.write_u16(tags.len() as u16);
            c.write_padding(8);
            let last = to - from;
            for tag in &tags {
                let tag_from = tag.from.saturating_sub(from).min(last);
                let tag_to = tag.to.saturating_sub(from).clamp(tag_from, last);
                c.write_u16(tag_from as u16);
                c.write_u16(tag_to as u16);
                c.write_u8(tag.ani_dir.code());
                c.write_u16(tag.repeat.min(TAG_MAX_REPEAT) as u16);
                c.write_padding(6);
                c.write_u8(rgba_r(tag.user_data.color));
                c.write_u8(rgba_g(tag.user_data.color));
                c.write_u8(rgba_b(tag.user_data.color));
                c.write_u8(0);
                c.write_string(&tag.name);
            }
        }

        for tag in tags {
            self.write_user_data(fw, &tag.user_data);
        }
    }

    fn write_layer(&mut self, fw: &mut FrameWriter, id: LayerId, level: u16) {
        let sprite = self.sprite;
        let layer = sprite.layer(id);
        let with_blend = !layer.is_group() || self.flags.contains(HeaderFlags::COMPOSITE_GROUPS);
        let uuids = self.flags.contains(HeaderFlags::LAYER_UUIDS);

        {
            let mut c = ChunkWriter::begin(&mut self.w, &mut fw.chunks, ChunkType::Layer);
            c.write_u16(layer.flags.bits());
            c.write_u16(match layer.kind {
                LayerKind::Image => LAYER_TYPE_IMAGE,
                LayerKind::Group => LAYER_TYPE_GROUP,
                LayerKind::Tilemap { .. } => LAYER_TYPE_TILEMAP,
            });
            c.write_u16(level);
            c.write_u16(0); // default width
            c.write_u16(0); // default height
            c.write_u16(if with_blend { layer.blend_mode.code() } else { 0 });
            c.write_u8(if with_blend { layer.opacity } else { 0 });
            c.write_padding(3);
            c.write_string(&layer.name);
            if let LayerKind::Tilemap { tileset } = layer.kind {
                c.write_u32(tileset);
            }
            if uuids {
                c.write_uuid(&layer.uuid);
            }
        }

        if !layer.user_data.is_empty() {
            self.write_user_data(fw, &layer.user_data);
        }
    }

    fn write_slices(&mut self, fw: &mut FrameWriter) {
        let sprite = self.sprite;
        for slice in &sprite.slices {
            let keys = slice.keys_in_range(self.from, self.to);
            if keys.is_empty() {
                continue;
            }

            let mut flags = SliceFlags::empty();
            if keys.iter().any(|(_, k)| k.center.is_some()) {
                flags |= SliceFlags::HAS_CENTER;
            }
            if keys.iter().any(|(_, k)| k.pivot.is_some()) {
                flags |= SliceFlags::HAS_PIVOT;
            }

            {
                let mut c = ChunkWriter::begin(&mut self.w, &mut fw.chunks, ChunkType::Slice);
                c.write_u32(keys.len() as u32);
                c.write_u32(flags.bits());
                c.write_u32(0);
                c.write_string(&slice.name);
                for (frame, key) in &keys {
                    c.write_u32(*frame);
                    write_rect(&mut *c, key.bounds);
                    if flags.contains(SliceFlags::HAS_CENTER) {
                        write_rect(&mut *c, key.center.unwrap_or_default());
                    }
                    if flags.contains(SliceFlags::HAS_PIVOT) {
                        let pivot = key.pivot.unwrap_or_default();
                        c.write_i32(pivot.x);
                        c.write_i32(pivot.y);
                    }
                }
            }

            if !slice.user_data.is_empty() {
                self.write_user_data(fw, &slice.user_data);
            }
        }
    }

    // Cels

    /// Earliest frame in the output range holding the same content on
    /// `layer`, if it comes before `frame`.
    fn link_target(&self, layer: LayerId, frame: u32) -> Option<u32> {
        let sprite = self.sprite;
        let cel = sprite.cel(layer, frame)?;
        let identical = self.delegate.link_identical_cels();
        let data = sprite.cel_data(cel.data);

        (self.from..frame).find(|f| match sprite.cel(layer, *f) {
            Some(other) if other.data == cel.data => true,
            Some(other) => identical && sprite.cel_data(other.data) == data,
            None => false,
        })
    }

    fn write_cel(&mut self, fw: &mut FrameWriter, layer_id: LayerId, frame: u32) -> Result<(), EncodeError> {
        let sprite = self.sprite;
        let Some(cel) = sprite.cel(layer_id, frame) else {
            return Ok(());
        };
        let layer = sprite.layer(layer_id);
        let data = sprite.cel_data(cel.data);
        let link = self.link_target(layer_id, frame);

        let cel_type = match link {
            Some(_) => CelType::Link,
            None if layer.is_tilemap() => self.delegate.preferred_tilemap_cel_type(),
            None => match self.delegate.preferred_cel_type() {
                CelType::CompressedTilemap => CelType::Compressed,
                other => other,
            },
        };
        if link.is_none() && cel_type == CelType::Link {
            return Err(EncodeError::InvalidLinkCel { frame });
        }

        let layer_index = self.layer_index.get(&layer_id).copied().unwrap_or(0);
        {
            let mut c = ChunkWriter::begin(&mut self.w, &mut fw.chunks, ChunkType::Cel);
            c.write_u16(layer_index);
            c.write_i16(data.position.x as i16);
            c.write_i16(data.position.y as i16);
            c.write_u8(data.opacity);
            c.write_u16(cel_type.code());
            c.write_i16(cel.z_index);
            c.write_padding(5);

            let image = &data.image;
            match (cel_type, link) {
                (CelType::Link, Some(target)) => {
                    c.write_u16((target - self.from) as u16);
                }
                (CelType::Raw, _) => {
                    c.write_u16(image.width() as u16);
                    c.write_u16(image.height() as u16);
                    write_raw_image(&mut *c, image);
                }
                (CelType::CompressedTilemap, _) => {
                    let masks = TileMasks::NATIVE;
                    c.write_u16(image.width() as u16);
                    c.write_u16(image.height() as u16);
                    c.write_u16(32);
                    c.write_u32(masks.index);
                    c.write_u32(masks.xflip);
                    c.write_u32(masks.yflip);
                    c.write_u32(masks.dflip);
                    c.write_padding(10);
                    write_compressed_image(&mut *c, image, None)?;
                }
                _ => {
                    c.write_u16(image.width() as u16);
                    c.write_u16(image.height() as u16);
                    write_compressed_image(&mut *c, image, None)?;
                }
            }
        }

        if let Some(bounds) = data.bounds {
            let mut c = ChunkWriter::begin(&mut self.w, &mut fw.chunks, ChunkType::CelExtra);
            c.write_u32(CEL_EXTRA_FLAG_PRECISE_BOUNDS);
            c.write_i32(f64_to_fixed(bounds.x));
            c.write_i32(f64_to_fixed(bounds.y));
            c.write_i32(f64_to_fixed(bounds.w));
            c.write_i32(f64_to_fixed(bounds.h));
            c.write_padding(16);
        }

        if link.is_none() && !data.user_data.is_empty() {
            self.write_user_data(fw, &data.user_data);
        }
        Ok(())
    }
}

fn write_rect<W: Write + Seek>(w: &mut ByteWriter<W>, rect: Rect) {
    w.write_i32(rect.x);
    w.write_i32(rect.y);
    w.write_u32(rect.w.max(0) as u32);
    w.write_u32(rect.h.max(0) as u32);
}

/// The old 8-bit color chunk can only describe a small, opaque, unnamed
/// palette.
fn fits_legacy_chunk(pal: &Palette) -> bool {
    pal.size() > 0 && pal.size() <= LEGACY_PALETTE_MAX && !pal.has_alpha() && !pal.has_names()
}

/// Whether the palettes used by frames `from..=to` need the new Palette
/// chunk. The choice is made once for the whole file: legacy chunks can't
/// resize the palette and are ignored after the first Palette chunk.
fn requires_new_palette_chunk(sprite: &Sprite, from: u32, to: u32) -> bool {
    let first = sprite.palette(from);
    let later = sprite
        .palettes()
        .iter()
        .filter(|p| p.frame() > from && p.frame() <= to);
    std::iter::once(first)
        .chain(later)
        .any(|p| !fits_legacy_chunk(p) || p.size() != first.size())
}

pub fn encode_to_vec<D: EncodeDelegate + ?Sized>(delegate: &D) -> Result<Vec<u8>, EncodeError> {
    let mut cursor = Cursor::new(Vec::new());
    encode(delegate, &mut cursor)?;
    Ok(cursor.into_inner())
}

pub fn write_file<D: EncodeDelegate + ?Sized>(delegate: &D, path: &Path) -> Result<(), EncodeError> {
    let file = File::create(path)?;
    encode(delegate, BufWriter::new(file))
}
