//! PNG output of decoded cels

use image::imageops::FilterType;
use image::{Rgba, RgbaImage};
use std::io;
use std::path::{Path, PathBuf};

use crate::model::{Image, LayerId, Palette, PixelFormat, Sprite, Tileset};
use crate::pixel::{
    graya_a, graya_v, rgba_a, rgba_b, rgba_g, rgba_r, tile_flags, tile_index, NOTILE, TILE_DFLIP,
    TILE_XFLIP, TILE_YFLIP,
};

/// Error type for output operations
#[derive(Debug)]
pub enum OutputError {
    /// IO error during file operations
    Io(io::Error),
    /// Image encoding error
    Image(image::ImageError),
}

impl std::fmt::Display for OutputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputError::Io(e) => write!(f, "IO error: {}", e),
            OutputError::Image(e) => write!(f, "Image error: {}", e),
        }
    }
}

impl std::error::Error for OutputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OutputError::Io(e) => Some(e),
            OutputError::Image(e) => Some(e),
        }
    }
}

impl From<io::Error> for OutputError {
    fn from(e: io::Error) -> Self {
        OutputError::Io(e)
    }
}

impl From<image::ImageError> for OutputError {
    fn from(e: image::ImageError) -> Self {
        OutputError::Image(e)
    }
}

/// Save an RGBA image to a PNG file, creating parent directories.
pub fn save_png(image: &RgbaImage, path: &Path) -> Result<(), OutputError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    image.save(path)?;
    Ok(())
}

/// Scale image by integer factor using nearest-neighbor interpolation.
pub fn scale_image(image: RgbaImage, factor: u8) -> RgbaImage {
    if factor <= 1 {
        return image;
    }
    let (w, h) = image.dimensions();
    image::imageops::resize(&image, w * factor as u32, h * factor as u32, FilterType::Nearest)
}

/// Default path for an exported cel: `{stem}_{layer}_{frame}.png` next to
/// the input.
pub fn cel_output_path(input: &Path, layer: &str, frame: u32) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("sprite");
    let layer: String = layer
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let name = format!("{}_{}_{}.png", stem, layer, frame);
    match input.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(name),
        _ => PathBuf::from(name),
    }
}

fn to_rgba(c: u32) -> Rgba<u8> {
    Rgba([rgba_r(c), rgba_g(c), rgba_b(c), rgba_a(c)])
}

/// Expand one pixel of `format` to RGBA.
fn expand_pixel(format: PixelFormat, value: u32, palette: &Palette, transparent_index: u8) -> Rgba<u8> {
    match format {
        PixelFormat::Rgba => to_rgba(value),
        PixelFormat::Grayscale => {
            let v = graya_v(value);
            Rgba([v, v, v, graya_a(value)])
        }
        PixelFormat::Indexed => {
            if value == transparent_index as u32 {
                Rgba([0, 0, 0, 0])
            } else {
                to_rgba(palette.entry(value as usize))
            }
        }
        // Tile values only make sense through a tileset
        PixelFormat::Tilemap => Rgba([0, 0, 0, 0]),
    }
}

/// Convert an image in any pixel format except tilemap to RGBA.
pub fn image_to_rgba(image: &Image, palette: &Palette, transparent_index: u8) -> RgbaImage {
    let format = image.format();
    RgbaImage::from_fn(image.width(), image.height(), |x, y| {
        expand_pixel(format, image.get_pixel(x, y), palette, transparent_index)
    })
}

/// Render a tilemap by drawing each tile with its flips applied.
pub fn tilemap_to_rgba(
    map: &Image,
    tileset: &Tileset,
    palette: &Palette,
    transparent_index: u8,
) -> RgbaImage {
    let (tw, th) = (tileset.tile_width(), tileset.tile_height());
    let mut out = RgbaImage::new(map.width() * tw, map.height() * th);

    for my in 0..map.height() {
        for mx in 0..map.width() {
            let value = map.get_pixel(mx, my);
            if value == NOTILE {
                continue;
            }
            let Some(tile) = tileset.tile(tile_index(value) as usize) else {
                continue;
            };
            let flags = tile_flags(value);
            for ty in 0..th {
                for tx in 0..tw {
                    let (mut sx, mut sy) = (tx, ty);
                    if flags & TILE_DFLIP != 0 {
                        std::mem::swap(&mut sx, &mut sy);
                    }
                    if flags & TILE_XFLIP != 0 {
                        sx = tw.saturating_sub(1 + sx);
                    }
                    if flags & TILE_YFLIP != 0 {
                        sy = th.saturating_sub(1 + sy);
                    }
                    if sx >= tw || sy >= th {
                        continue;
                    }
                    let pixel = expand_pixel(tile.format(), tile.get_pixel(sx, sy), palette, transparent_index);
                    out.put_pixel(mx * tw + tx, my * th + ty, pixel);
                }
            }
        }
    }
    out
}

/// The RGBA image of the cel of `layer` at `frame`, if there is one.
pub fn cel_to_rgba(sprite: &Sprite, layer: LayerId, frame: u32) -> Option<RgbaImage> {
    let data = sprite.cel_content(layer, frame)?;
    let palette = sprite.palette(frame);
    let transparent = sprite.transparent_index;

    match sprite.layer(layer).tileset_index() {
        Some(id) => {
            let tileset = sprite.tilesets.get(id)?;
            Some(tilemap_to_rgba(&data.image, tileset, palette, transparent))
        }
        None => Some(image_to_rgba(&data.image, palette, transparent)),
    }
}
