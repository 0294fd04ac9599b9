//! Fixed parts of the .aseprite binary layout
//!
//! Magic numbers, chunk type codes, flag sets and the two fixed-size
//! headers (sprite header and frame header). All integers are little-endian.

use bitflags::bitflags;
use std::io::{Read, Seek, Write};

use crate::stream::{ByteReader, ByteWriter};

pub const FILE_MAGIC: u16 = 0xA5E0;
pub const FRAME_MAGIC: u16 = 0xF1FA;

/// The sprite header is always 128 bytes, whatever the fields use.
pub const HEADER_SIZE: u64 = 128;
/// Frame header: size, magic, chunk count, duration, 2 reserved, wide count.
pub const FRAME_HEADER_SIZE: u64 = 16;
/// Chunk header: size (u32) + type (u16).
pub const CHUNK_HEADER_SIZE: u64 = 6;

/// Value of the 16-bit chunk count meaning "use the 32-bit field".
pub const CHUNK_COUNT_SENTINEL: u16 = 0xFFFF;

/// Chunk type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkType {
    /// Legacy palette, 8 bits per channel (0x0004).
    OldPalette256,
    /// Legacy palette, 6 bits per channel (0x000B).
    OldPalette64,
    Layer,
    Cel,
    CelExtra,
    ColorProfile,
    ExternalFiles,
    Mask,
    Path,
    Tags,
    Palette,
    UserData,
    /// Deprecated multi-slice chunk.
    Slices,
    Slice,
    Tileset,
    Unknown(u16),
}

impl ChunkType {
    pub fn from_u16(code: u16) -> Self {
        match code {
            0x0004 => ChunkType::OldPalette256,
            0x000B => ChunkType::OldPalette64,
            0x2004 => ChunkType::Layer,
            0x2005 => ChunkType::Cel,
            0x2006 => ChunkType::CelExtra,
            0x2007 => ChunkType::ColorProfile,
            0x2008 => ChunkType::ExternalFiles,
            0x2016 => ChunkType::Mask,
            0x2017 => ChunkType::Path,
            0x2018 => ChunkType::Tags,
            0x2019 => ChunkType::Palette,
            0x2020 => ChunkType::UserData,
            0x2021 => ChunkType::Slices,
            0x2022 => ChunkType::Slice,
            0x2023 => ChunkType::Tileset,
            other => ChunkType::Unknown(other),
        }
    }

    pub fn code(self) -> u16 {
        match self {
            ChunkType::OldPalette256 => 0x0004,
            ChunkType::OldPalette64 => 0x000B,
            ChunkType::Layer => 0x2004,
            ChunkType::Cel => 0x2005,
            ChunkType::CelExtra => 0x2006,
            ChunkType::ColorProfile => 0x2007,
            ChunkType::ExternalFiles => 0x2008,
            ChunkType::Mask => 0x2016,
            ChunkType::Path => 0x2017,
            ChunkType::Tags => 0x2018,
            ChunkType::Palette => 0x2019,
            ChunkType::UserData => 0x2020,
            ChunkType::Slices => 0x2021,
            ChunkType::Slice => 0x2022,
            ChunkType::Tileset => 0x2023,
            ChunkType::Unknown(code) => code,
        }
    }
}

/// How a cel stores its pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CelType {
    Raw,
    Link,
    Compressed,
    CompressedTilemap,
}

impl CelType {
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            0 => Some(CelType::Raw),
            1 => Some(CelType::Link),
            2 => Some(CelType::Compressed),
            3 => Some(CelType::CompressedTilemap),
            _ => None,
        }
    }

    pub fn code(self) -> u16 {
        match self {
            CelType::Raw => 0,
            CelType::Link => 1,
            CelType::Compressed => 2,
            CelType::CompressedTilemap => 3,
        }
    }
}

pub const LAYER_TYPE_IMAGE: u16 = 0;
pub const LAYER_TYPE_GROUP: u16 = 1;
pub const LAYER_TYPE_TILEMAP: u16 = 2;

pub const COLOR_PROFILE_NONE: u16 = 0;
pub const COLOR_PROFILE_SRGB: u16 = 1;
pub const COLOR_PROFILE_ICC: u16 = 2;
pub const COLOR_PROFILE_FLAG_GAMMA: u16 = 1;

pub const PALETTE_ENTRY_FLAG_HAS_NAME: u16 = 1;
pub const CEL_EXTRA_FLAG_PRECISE_BOUNDS: u32 = 1;

/// Convert 16.16 fixed point to a float.
pub fn fixed_to_f64(value: i32) -> f64 {
    value as f64 / 65536.0
}

/// Convert a float to 16.16 fixed point, saturating at the `i32` range.
pub fn f64_to_fixed(value: f64) -> i32 {
    (value * 65536.0).round() as i32
}

bitflags! {
    /// Sprite header flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HeaderFlags: u32 {
        const LAYER_OPACITY = 1;
        const COMPOSITE_GROUPS = 2;
        const LAYER_UUIDS = 4;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UserDataFlags: u32 {
        const HAS_TEXT = 1;
        const HAS_COLOR = 2;
        const HAS_PROPERTIES = 4;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SliceFlags: u32 {
        const HAS_CENTER = 1;
        const HAS_PIVOT = 2;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TilesetFlags: u32 {
        const EXTERNAL_FILE = 1;
        const EMBEDDED = 2;
        const ZERO_IS_NOTILE = 4;
        const MATCH_XFLIP = 8;
        const MATCH_YFLIP = 16;
        const MATCH_DFLIP = 32;
    }
}

/// The fixed 128-byte sprite header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AsepriteHeader {
    pub file_size: u32,
    pub magic: u16,
    pub frames: u16,
    pub width: u16,
    pub height: u16,
    pub depth: u16,
    pub flags: u32,
    pub speed: u16,
    pub transparent_index: u8,
    pub ncolors: u16,
    pub pixel_width: u8,
    pub pixel_height: u8,
    pub grid_x: i16,
    pub grid_y: i16,
    pub grid_width: u16,
    pub grid_height: u16,
}

impl AsepriteHeader {
    pub fn flags(&self) -> HeaderFlags {
        HeaderFlags::from_bits_retain(self.flags)
    }

    /// Read the header and normalize legacy values.
    ///
    /// Leaves the stream at `start + 128`. Magic and depth are not validated
    /// here; the decoder decides which problems are fatal.
    pub fn read<R: Read + Seek>(r: &mut ByteReader<R>) -> Self {
        let start = r.tell();
        let mut h = AsepriteHeader {
            file_size: r.read_u32(),
            magic: r.read_u16(),
            frames: r.read_u16(),
            width: r.read_u16(),
            height: r.read_u16(),
            depth: r.read_u16(),
            flags: r.read_u32(),
            speed: r.read_u16(),
            ..Default::default()
        };
        r.read_u32(); // next
        r.read_u32(); // frit
        h.transparent_index = r.read_u8();
        r.read_padding(3);
        h.ncolors = r.read_u16();
        h.pixel_width = r.read_u8();
        h.pixel_height = r.read_u8();
        h.grid_x = r.read_i16();
        h.grid_y = r.read_i16();
        h.grid_width = r.read_u16();
        h.grid_height = r.read_u16();

        // Transparent index is only meaningful for indexed images
        if h.depth != 8 {
            h.transparent_index = 0;
        }
        // 0 means 256 (old files)
        if h.ncolors == 0 {
            h.ncolors = 256;
        }
        if h.pixel_width == 0 || h.pixel_height == 0 {
            h.pixel_width = 1;
            h.pixel_height = 1;
        }

        r.seek(start + HEADER_SIZE);
        h
    }

    /// Write the header at the current position, padded to 128 bytes.
    pub fn write<W: Write + Seek>(&self, w: &mut ByteWriter<W>) {
        let start = w.tell();
        w.write_u32(self.file_size);
        w.write_u16(self.magic);
        w.write_u16(self.frames);
        w.write_u16(self.width);
        w.write_u16(self.height);
        w.write_u16(self.depth);
        w.write_u32(self.flags);
        w.write_u16(self.speed);
        w.write_u32(0);
        w.write_u32(0);
        w.write_u8(self.transparent_index);
        w.write_padding(3);
        w.write_u16(self.ncolors);
        w.write_u8(self.pixel_width);
        w.write_u8(self.pixel_height);
        w.write_i16(self.grid_x);
        w.write_i16(self.grid_y);
        w.write_u16(self.grid_width);
        w.write_u16(self.grid_height);
        let written = w.tell() - start;
        w.write_padding((HEADER_SIZE - written) as usize);
    }
}

/// Per-frame header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameHeader {
    pub size: u32,
    pub magic: u16,
    /// Chunk count, already widened when the 16-bit field held the sentinel.
    pub chunks: u32,
    pub duration: u16,
}

impl FrameHeader {
    pub fn read<R: Read + Seek>(r: &mut ByteReader<R>) -> Self {
        let size = r.read_u32();
        let magic = r.read_u16();
        let narrow = r.read_u16();
        let duration = r.read_u16();
        r.read_padding(2);
        let wide = r.read_u32();

        let chunks = if narrow == CHUNK_COUNT_SENTINEL && (narrow as u32) < wide {
            wide
        } else {
            narrow as u32
        };
        FrameHeader { size, magic, chunks, duration }
    }

    pub fn write<W: Write + Seek>(&self, w: &mut ByteWriter<W>) {
        w.write_u32(self.size);
        w.write_u16(self.magic);
        w.write_u16(self.chunks.min(CHUNK_COUNT_SENTINEL as u32) as u16);
        w.write_u16(self.duration);
        w.write_padding(2);
        w.write_u32(self.chunks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_chunk_type_codes_roundtrip() {
        for code in [0x0004, 0x000B, 0x2004, 0x2005, 0x2018, 0x2019, 0x2020, 0x2023, 0x7777] {
            assert_eq!(ChunkType::from_u16(code).code(), code);
        }
        assert_eq!(ChunkType::from_u16(0x7777), ChunkType::Unknown(0x7777));
    }

    #[test]
    fn test_header_is_128_bytes() {
        let header = AsepriteHeader {
            magic: FILE_MAGIC,
            frames: 3,
            width: 32,
            height: 16,
            depth: 32,
            ncolors: 16,
            pixel_width: 1,
            pixel_height: 1,
            ..Default::default()
        };
        let mut w = ByteWriter::new(Cursor::new(Vec::new()));
        header.write(&mut w);
        let bytes = w.into_inner().into_inner();
        assert_eq!(bytes.len(), 128);

        let mut r = ByteReader::new(Cursor::new(bytes));
        let read = AsepriteHeader::read(&mut r);
        assert_eq!(read, header);
        assert_eq!(r.tell(), 128);
    }

    #[test]
    fn test_header_legacy_normalization() {
        let header = AsepriteHeader {
            magic: FILE_MAGIC,
            depth: 32,
            transparent_index: 5,
            ncolors: 0,
            pixel_width: 0,
            pixel_height: 2,
            ..Default::default()
        };
        let mut w = ByteWriter::new(Cursor::new(Vec::new()));
        header.write(&mut w);
        let mut r = ByteReader::new(Cursor::new(w.into_inner().into_inner()));
        let read = AsepriteHeader::read(&mut r);
        assert_eq!(read.transparent_index, 0);
        assert_eq!(read.ncolors, 256);
        assert_eq!((read.pixel_width, read.pixel_height), (1, 1));
    }

    #[test]
    fn test_frame_header_chunk_sentinel() {
        let header = FrameHeader { size: 16, magic: FRAME_MAGIC, chunks: 70_000, duration: 100 };
        let mut w = ByteWriter::new(Cursor::new(Vec::new()));
        header.write(&mut w);
        let bytes = w.into_inner().into_inner();
        assert_eq!(&bytes[6..8], &[0xFF, 0xFF]);

        let mut r = ByteReader::new(Cursor::new(bytes));
        assert_eq!(FrameHeader::read(&mut r).chunks, 70_000);
    }

    #[test]
    fn test_fixed_point() {
        assert_eq!(f64_to_fixed(1.0), 0x10000);
        assert_eq!(f64_to_fixed(-0.5), -0x8000);
        assert_eq!(fixed_to_f64(0x18000), 1.5);
        assert_eq!(fixed_to_f64(f64_to_fixed(2.2)), 144179.0 / 65536.0);
    }

    #[test]
    fn test_frame_header_ignores_wide_count_without_sentinel() {
        let mut w = ByteWriter::new(Cursor::new(Vec::new()));
        w.write_u32(16);
        w.write_u16(FRAME_MAGIC);
        w.write_u16(3);
        w.write_u16(0);
        w.write_padding(2);
        w.write_u32(99);
        let mut r = ByteReader::new(Cursor::new(w.into_inner().into_inner()));
        assert_eq!(FrameHeader::read(&mut r).chunks, 3);
    }
}
