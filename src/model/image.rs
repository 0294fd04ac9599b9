//! Pixel buffers

use serde::Serialize;

/// Pixel layout of an image.
///
/// Every format is held in memory as one `u32` per pixel; the on-disk width
/// of a pixel is [`PixelFormat::bytes_per_pixel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Packed `r | g << 8 | b << 16 | a << 24`.
    Rgba,
    /// Packed `value | alpha << 8`.
    Grayscale,
    /// Palette index in the low byte.
    Indexed,
    /// Tile value: index plus flip flags.
    Tilemap,
}

impl PixelFormat {
    /// Sprite color mode from the header's color depth.
    pub fn from_depth(depth: u16) -> Option<Self> {
        match depth {
            32 => Some(PixelFormat::Rgba),
            16 => Some(PixelFormat::Grayscale),
            8 => Some(PixelFormat::Indexed),
            _ => None,
        }
    }

    pub fn depth(self) -> u16 {
        match self {
            PixelFormat::Rgba | PixelFormat::Tilemap => 32,
            PixelFormat::Grayscale => 16,
            PixelFormat::Indexed => 8,
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba | PixelFormat::Tilemap => 4,
            PixelFormat::Grayscale => 2,
            PixelFormat::Indexed => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    format: PixelFormat,
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl Image {
    /// A zero-filled image (transparent, index 0, or empty tile).
    pub fn new(format: PixelFormat, width: u32, height: u32) -> Self {
        Self::filled(format, width, height, 0)
    }

    pub fn filled(format: PixelFormat, width: u32, height: u32, value: u32) -> Self {
        Self {
            format,
            width,
            height,
            pixels: vec![value; width as usize * height as usize],
        }
    }

    /// Build from row-major pixels; `None` when the length doesn't match.
    pub fn from_pixels(format: PixelFormat, width: u32, height: u32, pixels: Vec<u32>) -> Option<Self> {
        if pixels.len() != width as usize * height as usize {
            return None;
        }
        Some(Self { format, width, height, pixels })
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

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u32] {
        &mut self.pixels
    }

    /// Out-of-bounds reads return 0.
    pub fn get_pixel(&self, x: u32, y: u32) -> u32 {
        if x >= self.width || y >= self.height {
            return 0;
        }
        self.pixels[(y * self.width + x) as usize]
    }

    /// Out-of-bounds writes are ignored.
    pub fn put_pixel(&mut self, x: u32, y: u32, value: u32) {
        if x < self.width && y < self.height {
            self.pixels[(y * self.width + x) as usize] = value;
        }
    }

    pub fn row(&self, y: u32) -> &[u32] {
        let w = self.width as usize;
        let start = y as usize * w;
        &self.pixels[start..start + w]
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u32] {
        let w = self.width as usize;
        let start = y as usize * w;
        &mut self.pixels[start..start + w]
    }

    /// Copy `height` full-width rows starting at `y`.
    pub fn crop_rows(&self, y: u32, height: u32) -> Image {
        let mut out = Image::new(self.format, self.width, height);
        for row in 0..height {
            if y + row < self.height {
                out.row_mut(row).copy_from_slice(self.row(y + row));
            }
        }
        out
    }

    /// True when every pixel equals `value`.
    pub fn is_plain(&self, value: u32) -> bool {
        self.pixels.iter().all(|p| *p == value)
    }

    pub fn map_pixels(&mut self, mut f: impl FnMut(u32) -> u32) {
        for p in &mut self.pixels {
            *p = f(*p);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_mapping() {
        assert_eq!(PixelFormat::from_depth(32), Some(PixelFormat::Rgba));
        assert_eq!(PixelFormat::from_depth(16), Some(PixelFormat::Grayscale));
        assert_eq!(PixelFormat::from_depth(8), Some(PixelFormat::Indexed));
        assert_eq!(PixelFormat::from_depth(24), None);
        assert_eq!(PixelFormat::Grayscale.bytes_per_pixel(), 2);
    }

    #[test]
    fn test_put_get_and_bounds() {
        let mut img = Image::new(PixelFormat::Indexed, 3, 2);
        img.put_pixel(2, 1, 7);
        img.put_pixel(5, 5, 9);
        assert_eq!(img.get_pixel(2, 1), 7);
        assert_eq!(img.get_pixel(5, 5), 0);
        assert_eq!(img.row(1), &[0, 0, 7]);
    }

    #[test]
    fn test_crop_rows() {
        let img = Image::from_pixels(PixelFormat::Indexed, 2, 3, vec![1, 2, 3, 4, 5, 6]).unwrap();
        let crop = img.crop_rows(1, 2);
        assert_eq!(crop.pixels(), &[3, 4, 5, 6]);
        assert!(Image::from_pixels(PixelFormat::Indexed, 2, 2, vec![1]).is_none());
    }
}
