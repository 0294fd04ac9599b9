//! Chunk and frame framing
//!
//! Every structural record is `size (u32) + type (u16) + body`, where `size`
//! counts the 6-byte header. Readers always seek to `start + size` after a
//! chunk, whatever its handler consumed. Writers reserve the header, write
//! the body and patch the header when the [`ChunkWriter`] goes out of scope.

use std::io::{Read, Seek, Write};
use std::ops::{Deref, DerefMut};

use crate::format::{ChunkType, FrameHeader, FRAME_HEADER_SIZE, FRAME_MAGIC};
use crate::stream::{ByteReader, ByteWriter};

/// A chunk header as read from the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Position of the size field.
    pub start: u64,
    pub size: u32,
    pub kind: ChunkType,
}

impl ChunkHeader {
    pub fn read<R: Read + Seek>(r: &mut ByteReader<R>) -> Self {
        let start = r.tell();
        let size = r.read_u32();
        let kind = ChunkType::from_u16(r.read_u16());
        ChunkHeader { start, size, kind }
    }

    /// Where the next chunk begins.
    pub fn end(&self) -> u64 {
        self.start + self.size as u64
    }
}

/// Scoped writer for one chunk.
///
/// Dereferences to the underlying [`ByteWriter`]. On drop the real size and
/// type are written over the placeholder header and the stream is left at
/// the end of the body.
pub struct ChunkWriter<'a, W: Write + Seek> {
    w: &'a mut ByteWriter<W>,
    start: u64,
    kind: ChunkType,
}

impl<'a, W: Write + Seek> ChunkWriter<'a, W> {
    /// Reserve the chunk header and count the chunk in `chunks`.
    pub fn begin(w: &'a mut ByteWriter<W>, chunks: &mut u32, kind: ChunkType) -> Self {
        *chunks += 1;
        let start = w.tell();
        w.write_u32(0);
        w.write_u16(0);
        ChunkWriter { w, start, kind }
    }
}

impl<W: Write + Seek> Deref for ChunkWriter<'_, W> {
    type Target = ByteWriter<W>;

    fn deref(&self) -> &Self::Target {
        self.w
    }
}

impl<W: Write + Seek> DerefMut for ChunkWriter<'_, W> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.w
    }
}

impl<W: Write + Seek> Drop for ChunkWriter<'_, W> {
    fn drop(&mut self) {
        // A failed stream has no trustworthy position to patch
        if !self.w.ok() {
            return;
        }
        let end = self.w.tell();
        self.w.seek(self.start);
        self.w.write_u32((end - self.start) as u32);
        self.w.write_u16(self.kind.code());
        self.w.seek(end);
    }
}

/// A frame being written: its header is reserved on [`FrameWriter::begin`]
/// and filled in by [`FrameWriter::finish`].
#[derive(Debug)]
pub struct FrameWriter {
    start: u64,
    pub duration: u16,
    /// Chunks written so far.
    pub chunks: u32,
}

impl FrameWriter {
    pub fn begin<W: Write + Seek>(w: &mut ByteWriter<W>) -> Self {
        let start = w.tell();
        w.write_padding(FRAME_HEADER_SIZE as usize);
        FrameWriter { start, duration: 0, chunks: 0 }
    }

    pub fn finish<W: Write + Seek>(self, w: &mut ByteWriter<W>) {
        if !w.ok() {
            return;
        }
        let end = w.tell();
        let header = FrameHeader {
            size: (end - self.start) as u32,
            magic: FRAME_MAGIC,
            chunks: self.chunks,
            duration: self.duration,
        };
        w.seek(self.start);
        header.write(w);
        w.seek(end);
    }
}
