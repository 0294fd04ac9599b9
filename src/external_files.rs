//! External file table
//!
//! Maps small integer ids to `(kind, filename)` entries. Tilesets stored in
//! other files and extension-owned property maps refer to these ids instead
//! of repeating the filename.

use std::collections::BTreeMap;
use std::io::{Read, Seek, Write};

use crate::stream::{ByteReader, ByteWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternalFileKind {
    Palette,
    Tileset,
    /// Namespace of extension-defined properties.
    Extension,
    /// Plugin that manages the sprite's tiles.
    TileManagement,
    Unknown(u8),
}

impl ExternalFileKind {
    pub fn from_u8(code: u8) -> Self {
        match code {
            0 => ExternalFileKind::Palette,
            1 => ExternalFileKind::Tileset,
            2 => ExternalFileKind::Extension,
            3 => ExternalFileKind::TileManagement,
            other => ExternalFileKind::Unknown(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            ExternalFileKind::Palette => 0,
            ExternalFileKind::Tileset => 1,
            ExternalFileKind::Extension => 2,
            ExternalFileKind::TileManagement => 3,
            ExternalFileKind::Unknown(code) => code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalFile {
    pub kind: ExternalFileKind,
    pub filename: String,
}

#[derive(Debug, Clone, Default)]
pub struct ExternalFiles {
    items: BTreeMap<u32, ExternalFile>,
    last_id: u32,
}

impl ExternalFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &ExternalFile)> {
        self.items.iter().map(|(id, f)| (*id, f))
    }

    /// Register an entry read from a file.
    pub fn insert_with_id(&mut self, id: u32, kind: ExternalFileKind, filename: impl Into<String>) {
        self.items.insert(id, ExternalFile { kind, filename: filename.into() });
        self.last_id = self.last_id.max(id);
    }

    /// Id for `(kind, filename)`, allocating the next free id if needed.
    /// Ids start at 1; 0 means "no external file".
    pub fn insert(&mut self, kind: ExternalFileKind, filename: &str) -> u32 {
        if let Some(id) = self.id_by_filename(kind, filename) {
            return id;
        }
        self.last_id += 1;
        let id = self.last_id;
        self.items.insert(id, ExternalFile { kind, filename: filename.to_string() });
        id
    }

    pub fn filename_by_id(&self, id: u32) -> Option<&str> {
        self.items.get(&id).map(|f| f.filename.as_str())
    }

    pub fn id_by_filename(&self, kind: ExternalFileKind, filename: &str) -> Option<u32> {
        self.items
            .iter()
            .find(|(_, f)| f.kind == kind && f.filename == filename)
            .map(|(id, _)| *id)
    }

    pub fn tile_management_plugin(&self) -> Option<&str> {
        self.items
            .values()
            .find(|f| f.kind == ExternalFileKind::TileManagement)
            .map(|f| f.filename.as_str())
    }

    /// Chunk body: count, 8 reserved bytes, then id, kind, 7 reserved bytes
    /// and filename per entry.
    pub fn read<R: Read + Seek>(&mut self, r: &mut ByteReader<R>) {
        let n = r.read_u32();
        r.read_padding(8);
        for _ in 0..n {
            if !r.ok() {
                break;
            }
            let id = r.read_u32();
            let kind = ExternalFileKind::from_u8(r.read_u8());
            r.read_padding(7);
            let filename = r.read_string();
            self.insert_with_id(id, kind, filename);
        }
    }

    pub fn write<W: Write + Seek>(&self, w: &mut ByteWriter<W>) {
        w.write_u32(self.items.len() as u32);
        w.write_padding(8);
        for (id, file) in &self.items {
            w.write_u32(*id);
            w.write_u8(file.kind.code());
            w.write_padding(7);
            w.write_string(&file.filename);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_insert_dedupes_and_starts_at_one() {
        let mut files = ExternalFiles::new();
        let a = files.insert(ExternalFileKind::Extension, "ext.a");
        let b = files.insert(ExternalFileKind::Tileset, "tiles.aseprite");
        let again = files.insert(ExternalFileKind::Extension, "ext.a");
        assert_eq!((a, b, again), (1, 2, 1));
        // Same filename with a different kind is a different entry
        assert_eq!(files.insert(ExternalFileKind::Tileset, "ext.a"), 3);
    }

    #[test]
    fn test_insert_after_read_ids_continue() {
        let mut files = ExternalFiles::new();
        files.insert_with_id(10, ExternalFileKind::Palette, "pal.gpl");
        assert_eq!(files.insert(ExternalFileKind::Extension, "x"), 11);
    }

    #[test]
    fn test_chunk_body_roundtrip() {
        let mut files = ExternalFiles::new();
        files.insert(ExternalFileKind::Extension, "my.extension");
        files.insert(ExternalFileKind::TileManagement, "tile-plugin");

        let mut w = ByteWriter::new(Cursor::new(Vec::new()));
        files.write(&mut w);
        let mut r = ByteReader::new(Cursor::new(w.into_inner().into_inner()));
        let mut read = ExternalFiles::new();
        read.read(&mut r);

        assert_eq!(read.filename_by_id(1), Some("my.extension"));
        assert_eq!(read.tile_management_plugin(), Some("tile-plugin"));
        assert_eq!(read.filename_by_id(3), None);
    }
}
