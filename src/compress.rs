//! Raw and DEFLATE image transfer
//!
//! Images travel one scanline at a time. The compressed reader is bounded by
//! the enclosing chunk so a damaged stream can never consume the next chunk.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use std::io::{Read, Seek, Write};

use crate::error::CompressionError;
use crate::model::{Image, PixelFormat, Tileset};
use crate::pixel::{read_scanline, write_scanline};
use crate::stream::{ByteReader, ByteWriter};

const BUFFER_SIZE: usize = 4096;

/// Anything the encoder can serialize row by row.
pub trait ScanlineSource {
    fn format(&self) -> PixelFormat;
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn scanline(&self, y: u32) -> &[u32];
}

impl ScanlineSource for Image {
    fn format(&self) -> PixelFormat {
        Image::format(self)
    }

    fn width(&self) -> u32 {
        Image::width(self)
    }

    fn height(&self) -> u32 {
        Image::height(self)
    }

    fn scanline(&self, y: u32) -> &[u32] {
        self.row(y)
    }
}

/// All tiles of a tileset stacked vertically into one tall image.
pub struct TilesetAtlas<'a>(pub &'a Tileset);

impl ScanlineSource for TilesetAtlas<'_> {
    fn format(&self) -> PixelFormat {
        self.0.format()
    }

    fn width(&self) -> u32 {
        self.0.tile_width()
    }

    fn height(&self) -> u32 {
        self.0.tile_height() * self.0.len() as u32
    }

    fn scanline(&self, y: u32) -> &[u32] {
        let h = self.0.tile_height().max(1);
        match self.0.tile((y / h) as usize) {
            Some(tile) => tile.row(y % h),
            None => &[],
        }
    }
}

pub fn read_raw_image<R: Read + Seek>(r: &mut ByteReader<R>, image: &mut Image) {
    let format = image.format();
    let mut bytes = vec![0u8; image.width() as usize * format.bytes_per_pixel()];
    for y in 0..image.height() {
        r.read_bytes(&mut bytes);
        read_scanline(format, &bytes, image.row_mut(y));
    }
}

pub fn write_raw_image<W: Write + Seek, S: ScanlineSource + ?Sized>(w: &mut ByteWriter<W>, src: &S) {
    let mut scanline = Vec::new();
    for y in 0..src.height() {
        write_scanline(src.format(), src.scanline(y), &mut scanline);
        w.write_bytes(&scanline);
    }
}

/// Inflate pixels into `image`, reading no further than `chunk_end`.
///
/// Rows decoded before an error stay in the image.
pub fn read_compressed_image<R: Read + Seek>(
    r: &mut ByteReader<R>,
    image: &mut Image,
    chunk_end: u64,
) -> Result<(), CompressionError> {
    let format = image.format();
    let height = image.height();
    let width_bytes = image.width() as usize * format.bytes_per_pixel();
    if width_bytes == 0 || height == 0 {
        return Ok(());
    }

    let mut z = Decompress::new(true);
    let mut compressed = vec![0u8; BUFFER_SIZE];
    let mut uncompressed = vec![0u8; BUFFER_SIZE];
    let mut scanline = vec![0u8; width_bytes];
    let mut scanline_offset = 0;
    let mut y = 0;

    while y < height {
        let pos = r.tell();
        let input_bytes = if pos + BUFFER_SIZE as u64 > chunk_end {
            chunk_end.saturating_sub(pos) as usize
        } else {
            BUFFER_SIZE
        };
        if input_bytes == 0 {
            break;
        }

        let bytes_read = r.read_bytes(&mut compressed[..input_bytes]);
        if bytes_read == 0 {
            return Err(CompressionError::Truncated { expected: input_bytes });
        }

        let mut in_offset = 0;
        loop {
            let before_in = z.total_in();
            let before_out = z.total_out();
            let status = z
                .decompress(&compressed[in_offset..bytes_read], &mut uncompressed, FlushDecompress::None)
                .map_err(|e| CompressionError::Inflate(e.to_string()))?;
            let consumed = (z.total_in() - before_in) as usize;
            let produced = (z.total_out() - before_out) as usize;
            in_offset += consumed;

            let mut i = 0;
            while i < produced && y < height {
                let n = (produced - i).min(width_bytes - scanline_offset);
                scanline[scanline_offset..scanline_offset + n].copy_from_slice(&uncompressed[i..i + n]);
                scanline_offset += n;
                i += n;
                if scanline_offset == width_bytes {
                    read_scanline(format, &scanline, image.row_mut(y));
                    y += 1;
                    scanline_offset = 0;
                }
            }

            if status == Status::StreamEnd || y >= height {
                return Ok(());
            }
            let output_full = produced == uncompressed.len();
            if (in_offset >= bytes_read && !output_full) || (consumed == 0 && produced == 0) {
                break;
            }
        }
    }
    Ok(())
}

/// Deflate `src` row by row. When `cache` is given, every compressed byte
/// written is appended to it as well.
pub fn write_compressed_image<W: Write + Seek, S: ScanlineSource + ?Sized>(
    w: &mut ByteWriter<W>,
    src: &S,
    mut cache: Option<&mut Vec<u8>>,
) -> Result<(), CompressionError> {
    let height = src.height();
    if height == 0 || src.width() == 0 {
        return Ok(());
    }

    let mut z = Compress::new(Compression::default(), true);
    let mut scanline = Vec::new();
    let mut compressed = vec![0u8; BUFFER_SIZE];

    for y in 0..height {
        write_scanline(src.format(), src.scanline(y), &mut scanline);
        let last = y == height - 1;
        let flush = if last { FlushCompress::Finish } else { FlushCompress::None };

        let mut in_offset = 0;
        loop {
            let before_in = z.total_in();
            let before_out = z.total_out();
            let status = z
                .compress(&scanline[in_offset..], &mut compressed, flush)
                .map_err(|e| CompressionError::Deflate(e.to_string()))?;
            in_offset += (z.total_in() - before_in) as usize;
            let produced = (z.total_out() - before_out) as usize;

            if produced > 0 {
                w.write_bytes(&compressed[..produced]);
                if !w.ok() {
                    return Err(CompressionError::Deflate("error writing compressed image pixels".into()));
                }
                if let Some(cache) = cache.as_deref_mut() {
                    cache.extend_from_slice(&compressed[..produced]);
                }
            }

            let done = if last {
                status == Status::StreamEnd
            } else {
                in_offset >= scanline.len() && produced < compressed.len()
            };
            if done || (status == Status::BufError && produced == 0) {
                break;
            }
        }
    }
    Ok(())
}
