//! Scanline pixel codec and packed color helpers
//!
//! One in-memory row of `u32` pixels is packed to, or unpacked from, the
//! file's byte layout for its [`PixelFormat`]:
//!
//! | format    | bytes per pixel | layout              |
//! |-----------|-----------------|---------------------|
//! | RGBA      | 4               | r, g, b, a          |
//! | grayscale | 2               | value, alpha        |
//! | indexed   | 1               | palette index       |
//! | tilemap   | 4               | u32 tile value (LE) |

use crate::model::PixelFormat;

pub fn rgba(r: u8, g: u8, b: u8, a: u8) -> u32 {
    r as u32 | (g as u32) << 8 | (b as u32) << 16 | (a as u32) << 24
}

pub fn rgba_r(c: u32) -> u8 {
    c as u8
}

pub fn rgba_g(c: u32) -> u8 {
    (c >> 8) as u8
}

pub fn rgba_b(c: u32) -> u8 {
    (c >> 16) as u8
}

pub fn rgba_a(c: u32) -> u8 {
    (c >> 24) as u8
}

pub fn graya(v: u8, a: u8) -> u32 {
    v as u32 | (a as u32) << 8
}

pub fn graya_v(c: u32) -> u8 {
    c as u8
}

pub fn graya_a(c: u32) -> u8 {
    (c >> 8) as u8
}

/// Expand a 6-bit channel (old VGA palettes) to 8 bits.
pub fn scale_6bits_to_8bits(v: u8) -> u8 {
    let v = v & 0x3f;
    (v << 2) | (v >> 4)
}

// In-memory tile value layout
pub const TILE_INDEX_MASK: u32 = 0x1fff_ffff;
pub const TILE_XFLIP: u32 = 0x2000_0000;
pub const TILE_YFLIP: u32 = 0x4000_0000;
pub const TILE_DFLIP: u32 = 0x8000_0000;
pub const TILE_FLAGS_MASK: u32 = TILE_XFLIP | TILE_YFLIP | TILE_DFLIP;
/// Tile value of an empty cell.
pub const NOTILE: u32 = 0;

pub fn tile(index: u32, flags: u32) -> u32 {
    (index & TILE_INDEX_MASK) | (flags & TILE_FLAGS_MASK)
}

pub fn tile_index(t: u32) -> u32 {
    t & TILE_INDEX_MASK
}

pub fn tile_flags(t: u32) -> u32 {
    t & TILE_FLAGS_MASK
}

/// Position of the lowest set bit of `mask` (0 for an empty mask).
pub fn mask_shift(mask: u32) -> u32 {
    if mask == 0 {
        0
    } else {
        mask.trailing_zeros()
    }
}

/// Bit masks a file uses for its tile values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileMasks {
    pub index: u32,
    pub xflip: u32,
    pub yflip: u32,
    pub dflip: u32,
}

impl TileMasks {
    /// The in-memory layout, which is also what the encoder writes.
    pub const NATIVE: TileMasks = TileMasks {
        index: TILE_INDEX_MASK,
        xflip: TILE_XFLIP,
        yflip: TILE_YFLIP,
        dflip: TILE_DFLIP,
    };

    pub fn flags(&self) -> u32 {
        self.xflip | self.yflip | self.dflip
    }

    /// Re-express a file tile value in the in-memory layout.
    ///
    /// Indices beyond both `tileset_len` and 0xFFFFFF come from broken files
    /// and become [`NOTILE`].
    pub fn to_native(&self, value: u32, tileset_len: usize) -> u32 {
        let index = (value & self.index) >> mask_shift(self.index);
        if index as usize > tileset_len && index > 0x00ff_ffff {
            return NOTILE;
        }
        let has = |mask: u32| mask != 0 && value & mask == mask;
        let mut flags = 0;
        if has(self.xflip) {
            flags |= TILE_XFLIP;
        }
        if has(self.yflip) {
            flags |= TILE_YFLIP;
        }
        if has(self.dflip) {
            flags |= TILE_DFLIP;
        }
        tile(index, flags)
    }
}

/// Pack one row into `out` (cleared first).
pub fn write_scanline(format: PixelFormat, row: &[u32], out: &mut Vec<u8>) {
    out.clear();
    out.reserve(row.len() * format.bytes_per_pixel());
    for &p in row {
        match format {
            PixelFormat::Rgba => {
                out.extend_from_slice(&[rgba_r(p), rgba_g(p), rgba_b(p), rgba_a(p)]);
            }
            PixelFormat::Grayscale => out.extend_from_slice(&[graya_v(p), graya_a(p)]),
            PixelFormat::Indexed => out.push(p as u8),
            PixelFormat::Tilemap => out.extend_from_slice(&p.to_le_bytes()),
        }
    }
}

/// Unpack `bytes` into `row`. Missing trailing bytes leave pixels untouched.
pub fn read_scanline(format: PixelFormat, bytes: &[u8], row: &mut [u32]) {
    let bpp = format.bytes_per_pixel();
    for (p, px) in bytes.chunks_exact(bpp).zip(row.iter_mut()) {
        *px = match format {
            PixelFormat::Rgba => rgba(p[0], p[1], p[2], p[3]),
            PixelFormat::Grayscale => graya(p[0], p[1]),
            PixelFormat::Indexed => p[0] as u32,
            PixelFormat::Tilemap => u32::from_le_bytes([p[0], p[1], p[2], p[3]]),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgba_packing() {
        let c = rgba(1, 2, 3, 4);
        assert_eq!(c, 0x04030201);
        assert_eq!((rgba_r(c), rgba_g(c), rgba_b(c), rgba_a(c)), (1, 2, 3, 4));
        assert_eq!(graya(200, 100), 0x64c8);
    }

    #[test]
    fn test_scale_6bits() {
        assert_eq!(scale_6bits_to_8bits(0), 0);
        assert_eq!(scale_6bits_to_8bits(63), 255);
        assert_eq!(scale_6bits_to_8bits(32), 130);
    }

    #[test]
    fn test_scanline_layouts() {
        let mut out = Vec::new();
        write_scanline(PixelFormat::Rgba, &[rgba(10, 20, 30, 40)], &mut out);
        assert_eq!(out, vec![10, 20, 30, 40]);

        write_scanline(PixelFormat::Grayscale, &[graya(5, 6), graya(7, 8)], &mut out);
        assert_eq!(out, vec![5, 6, 7, 8]);

        write_scanline(PixelFormat::Indexed, &[1, 2, 3], &mut out);
        assert_eq!(out, vec![1, 2, 3]);

        write_scanline(PixelFormat::Tilemap, &[0x8000_0001], &mut out);
        assert_eq!(out, vec![1, 0, 0, 0x80]);

        let mut row = [0u32; 2];
        read_scanline(PixelFormat::Grayscale, &[5, 6, 7, 8], &mut row);
        assert_eq!(row, [graya(5, 6), graya(7, 8)]);
    }

    #[test]
    fn test_tile_masks_convert_foreign_layout() {
        // Index in bits 4.., flips in the low nibble
        let masks = TileMasks { index: 0xffff_fff0, xflip: 1, yflip: 2, dflip: 4 };
        let value = (5 << 4) | 1 | 4;
        assert_eq!(masks.to_native(value, 10), tile(5, TILE_XFLIP | TILE_DFLIP));
    }

    #[test]
    fn test_tile_masks_drop_huge_index() {
        let masks = TileMasks::NATIVE;
        assert_eq!(masks.to_native(0x0100_0000, 3), NOTILE);
        // Small out-of-range indices are kept
        assert_eq!(masks.to_native(20, 3), 20);
    }

    #[test]
    fn test_mask_shift() {
        assert_eq!(mask_shift(0), 0);
        assert_eq!(mask_shift(0x1fff_ffff), 0);
        assert_eq!(mask_shift(0xff00), 8);
    }
}
