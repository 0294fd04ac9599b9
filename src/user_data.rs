//! UserData chunk body and the properties maps container
//!
//! ```text
//! flags u32
//! [text string]                     if HAS_TEXT
//! [r g b a]                         if HAS_COLOR
//! [size u32, nmaps u32,             if HAS_PROPERTIES
//!    (extension id u32, properties)*]
//! ```
//!
//! `size` spans the whole properties block including itself, so a reader
//! that can't parse a value still lands on the next field.

use std::io::{Read, Seek, Write};

use crate::delegate::Diagnostic;
use crate::external_files::{ExternalFileKind, ExternalFiles};
use crate::format::UserDataFlags;
use crate::model::{PropertiesMaps, UserData};
use crate::pixel::{rgba, rgba_a, rgba_b, rgba_g, rgba_r};
use crate::stream::{ByteReader, ByteWriter};
use crate::variant::{read_properties, write_properties};

/// Key used for a properties map whose extension id isn't in the table.
pub fn missing_extension_key(id: u32) -> String {
    format!("__missed__{}", id)
}

pub fn read_user_data<R: Read + Seek>(
    r: &mut ByteReader<R>,
    ext: &ExternalFiles,
    report: &mut dyn FnMut(Diagnostic),
) -> UserData {
    let flags = UserDataFlags::from_bits_retain(r.read_u32());
    let mut ud = UserData::default();

    if flags.contains(UserDataFlags::HAS_TEXT) {
        ud.text = r.read_string();
    }
    if flags.contains(UserDataFlags::HAS_COLOR) {
        let (red, green, blue, alpha) = (r.read_u8(), r.read_u8(), r.read_u8(), r.read_u8());
        ud.color = rgba(red, green, blue, alpha);
    }
    if flags.contains(UserDataFlags::HAS_PROPERTIES) {
        read_properties_maps(r, ext, &mut ud.properties, report);
    }
    ud
}

/// Read a properties block into `maps`. Maps read before a failure are kept.
pub fn read_properties_maps<R: Read + Seek>(
    r: &mut ByteReader<R>,
    ext: &ExternalFiles,
    maps: &mut PropertiesMaps,
    report: &mut dyn FnMut(Diagnostic),
) {
    let start = r.tell();
    let size = r.read_u32();
    let nmaps = r.read_u32();

    for _ in 0..nmaps {
        if !r.ok() {
            break;
        }
        let id = r.read_u32();
        let key = if id == 0 {
            String::new()
        } else {
            match ext.filename_by_id(id) {
                Some(name) => name.to_string(),
                None => {
                    report(Diagnostic::error(format!(
                        "Error: Invalid extension ID (id={} not found)",
                        id
                    )));
                    missing_extension_key(id)
                }
            }
        };
        match read_properties(r) {
            Ok(props) => {
                maps.insert(key, props);
            }
            Err(e) => {
                report(Diagnostic::incompatibility(format!("Error reading custom properties: {}", e)));
                break;
            }
        }
    }

    r.seek(start + size as u64);
}

pub fn user_data_flags(ud: &UserData) -> UserDataFlags {
    let mut flags = UserDataFlags::empty();
    if !ud.text.is_empty() {
        flags |= UserDataFlags::HAS_TEXT;
    }
    if rgba_a(ud.color) != 0 {
        flags |= UserDataFlags::HAS_COLOR;
    }
    if ud.nonempty_maps().next().is_some() {
        flags |= UserDataFlags::HAS_PROPERTIES;
    }
    flags
}

pub fn write_user_data<W: Write + Seek>(
    w: &mut ByteWriter<W>,
    ext: &ExternalFiles,
    ud: &UserData,
    report: &mut dyn FnMut(Diagnostic),
) {
    let flags = user_data_flags(ud);
    w.write_u32(flags.bits());

    if flags.contains(UserDataFlags::HAS_TEXT) {
        w.write_string(&ud.text);
    }
    if flags.contains(UserDataFlags::HAS_COLOR) {
        w.write_u8(rgba_r(ud.color));
        w.write_u8(rgba_g(ud.color));
        w.write_u8(rgba_b(ud.color));
        w.write_u8(rgba_a(ud.color));
    }
    if flags.contains(UserDataFlags::HAS_PROPERTIES) {
        write_properties_maps(w, ext, &ud.properties, report);
    }
}

/// Write every non-empty map. An extension missing from `ext` is reported
/// and written with id 0 so the map count stays right.
pub fn write_properties_maps<W: Write + Seek>(
    w: &mut ByteWriter<W>,
    ext: &ExternalFiles,
    maps: &PropertiesMaps,
    report: &mut dyn FnMut(Diagnostic),
) {
    let start = w.tell();
    w.write_u32(0);
    let nmaps = maps.values().filter(|p| !p.is_empty()).count();
    w.write_u32(nmaps as u32);

    for (key, props) in maps {
        if props.is_empty() {
            continue;
        }
        let id = if key.is_empty() {
            0
        } else {
            match ext.id_by_filename(ExternalFileKind::Extension, key) {
                Some(id) => id,
                None => {
                    report(Diagnostic::error(format!(
                        "Error writing properties for extension '{}'.",
                        key
                    )));
                    0
                }
            }
        };
        w.write_u32(id);
        write_properties(w, props);
    }

    let end = w.tell();
    w.seek(start);
    w.write_u32((end - start) as u32);
    w.seek(end);
}

/// Register the extension of every named map of `ud`.
pub fn collect_extension_ids(ud: &UserData, ext: &mut ExternalFiles) {
    for key in ud.properties.keys() {
        if !key.is_empty() {
            ext.insert(ExternalFileKind::Extension, key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::Variant;
    use std::io::Cursor;

    fn roundtrip(ud: &UserData, ext: &ExternalFiles) -> (UserData, Vec<Diagnostic>) {
        let mut diags = Vec::new();
        let mut w = ByteWriter::new(Cursor::new(Vec::new()));
        write_user_data(&mut w, ext, ud, &mut |d| diags.push(d));
        let mut r = ByteReader::new(Cursor::new(w.into_inner().into_inner()));
        let read = read_user_data(&mut r, ext, &mut |d| diags.push(d));
        (read, diags)
    }

    #[test]
    fn test_text_and_color() {
        let mut ud = UserData::with_text("walk cycle");
        ud.color = rgba(10, 20, 30, 40);
        let (read, diags) = roundtrip(&ud, &ExternalFiles::new());
        assert_eq!(read, ud);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_transparent_color_is_not_written() {
        let ud = UserData { color: rgba(1, 2, 3, 0), ..Default::default() };
        assert!(user_data_flags(&ud).is_empty());
    }

    #[test]
    fn test_properties_with_extension() {
        let mut ext = ExternalFiles::new();
        let mut ud = UserData::default();
        ud.properties_mut("").insert("hp".into(), Variant::I32(30));
        ud.properties_mut("my.ext").insert("speed".into(), Variant::Double(1.5));
        ud.properties_mut("unused");
        collect_extension_ids(&ud, &mut ext);

        let (read, diags) = roundtrip(&ud, &ext);
        assert!(diags.is_empty());
        // Values are stored in their reduced integer type
        assert_eq!(read.properties[""]["hp"], Variant::I8(30));
        assert_eq!(read.properties["my.ext"]["speed"], Variant::Double(1.5));
        assert!(!read.properties.contains_key("unused"));
    }

    #[test]
    fn test_unresolved_extension_id_is_one_error() {
        let mut ext = ExternalFiles::new();
        let mut ud = UserData::default();
        ud.properties_mut("gone").insert("a".into(), Variant::Bool(true));
        collect_extension_ids(&ud, &mut ext);

        let mut w = ByteWriter::new(Cursor::new(Vec::new()));
        write_user_data(&mut w, &ext, &ud, &mut |_| {});
        w.write_u32(0xCAFE);
        let bytes = w.into_inner().into_inner();

        // Read back without the table entry
        let mut diags = Vec::new();
        let mut r = ByteReader::new(Cursor::new(bytes));
        let read = read_user_data(&mut r, &ExternalFiles::new(), &mut |d| diags.push(d));
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("id=1"));
        assert_eq!(read.properties[&missing_extension_key(1)]["a"], Variant::Bool(true));
        assert_eq!(r.read_u32(), 0xCAFE);
    }

    #[test]
    fn test_unknown_type_skips_to_block_end() {
        let mut w = ByteWriter::new(Cursor::new(Vec::new()));
        w.write_u32(UserDataFlags::HAS_PROPERTIES.bits());
        let start = w.tell();
        w.write_u32(0);
        w.write_u32(1); // one map
        w.write_u32(0); // built-in
        w.write_u32(1); // one property
        w.write_string("x");
        w.write_u16(0x7F); // not a type
        w.write_bytes(&[1, 2, 3]);
        let end = w.tell();
        w.seek(start);
        w.write_u32((end - start) as u32);
        w.seek(end);
        w.write_u16(0xBEEF);

        let mut diags = Vec::new();
        let mut r = ByteReader::new(Cursor::new(w.into_inner().into_inner()));
        read_user_data(&mut r, &ExternalFiles::new(), &mut |d| diags.push(d));
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.starts_with("Error reading custom properties"));
        assert_eq!(r.read_u16(), 0xBEEF);
    }
}
