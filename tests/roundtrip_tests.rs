//! Round-trip tests for the asefmt codec
//!
//! These tests build sprites in memory, encode them, decode the bytes again
//! and compare the two documents through the public API.

use std::io::Cursor;

use asefmt::chunk::{ChunkWriter, FrameWriter};
use asefmt::external_files::{ExternalFileKind, ExternalFiles};
use asefmt::format::{AsepriteHeader, ChunkType, HeaderFlags, FILE_MAGIC};
use asefmt::model::{
    AniDir, BlendMode, CelData, ColorSpace, Image, Layer, LayerId, PixelFormat, Point, Rect, Slice,
    SliceKey, Sprite, Tag, Tileset, UserData,
};
use asefmt::pixel::{rgba, tile, TILE_XFLIP};
use asefmt::stream::ByteWriter;
use asefmt::user_data::write_user_data;
use asefmt::variant::Variant;
use asefmt::{
    decode_bytes, decode_with, encode_to_vec, read_file, write_file, DecodeConfig, Severity,
    SpriteEncoder,
};
use tempfile::TempDir;

struct Fixture {
    sprite: Sprite,
    arm: LayerId,
    ground: LayerId,
}

/// Three-frame sprite touching most of the format: a layer group, a tilemap
/// layer, linked cels, tags, slices, user data with properties and a
/// color profile.
fn hero() -> Fixture {
    let mut sprite = Sprite::new(PixelFormat::Rgba, 16, 16, 8);
    sprite.set_frames(3);
    sprite.set_frame_duration(1, 250);
    sprite.color_space = Some(ColorSpace::srgb());

    let mut palette = sprite.palette(0).clone();
    for i in 0..8u8 {
        palette.set_entry(i as usize, rgba(i * 30, 255 - i * 30, i, 255));
    }
    sprite.set_palette(palette);

    sprite.user_data = UserData::with_text("hero");
    let props = sprite.user_data.properties_mut("");
    props.insert("hp".into(), Variant::I32(30));
    props.insert("speeds".into(), Variant::Vector(vec![Variant::I32(1), Variant::I32(300)]));
    props.insert(
        "mixed".into(),
        Variant::Vector(vec![Variant::String("a".into()), Variant::I64(7)]),
    );
    sprite.user_data.properties_mut("my-ext").insert("enabled".into(), Variant::Bool(true));

    let mut tileset = Tileset::new(PixelFormat::Rgba, 2, 2, 3);
    tileset.name = "terrain".into();
    tileset.set_tile(1, Image::filled(PixelFormat::Rgba, 2, 2, rgba(200, 0, 0, 255)));
    tileset.set_tile(2, Image::filled(PixelFormat::Rgba, 2, 2, rgba(0, 200, 0, 255)));
    let ts_id = sprite.tilesets.add(tileset);

    let root = sprite.root();
    let body = sprite.add_layer(root, Layer::group("body"));
    let mut arm_layer = Layer::image("arm");
    arm_layer.opacity = 128;
    arm_layer.blend_mode = BlendMode::Multiply;
    arm_layer.user_data = UserData::with_text("left arm");
    let arm = sprite.add_layer(body, arm_layer);
    let ground = sprite.add_layer(root, Layer::tilemap("ground", ts_id));

    let first = Image::filled(PixelFormat::Rgba, 3, 2, rgba(10, 20, 30, 255));
    let first_cel = CelData::new(first, Point::new(2, 3), 200);
    sprite.new_cel(arm, 0, first_cel.clone());
    let mut posed = CelData::new(Image::filled(PixelFormat::Rgba, 4, 4, rgba(1, 2, 3, 255)), Point::new(0, 0), 255);
    posed.user_data = UserData::with_text("pose");
    sprite.new_cel(arm, 1, posed);
    sprite.new_cel(arm, 2, first_cel);

    let map = Image::from_pixels(PixelFormat::Tilemap, 2, 1, vec![tile(1, 0), tile(2, TILE_XFLIP)]).unwrap();
    sprite.new_cel(ground, 0, CelData::new(map, Point::new(0, 0), 255));

    let mut walk = Tag::new("walk", 0, 1);
    walk.ani_dir = AniDir::PingPong;
    walk.repeat = 3;
    walk.user_data.color = rgba(255, 0, 0, 255);
    walk.user_data.text = "loop".into();
    sprite.tags.push(walk);
    sprite.tags.push(Tag::new("rest", 2, 2));

    let mut hitbox = Slice::new("hitbox");
    hitbox.insert(
        0,
        SliceKey { bounds: Rect::new(1, 1, 4, 4), center: Some(Rect::new(1, 1, 2, 2)), pivot: Some(Point::new(2, 2)) },
    );
    hitbox.insert(2, SliceKey::new(Rect::new(0, 0, 3, 3)));
    hitbox.user_data = UserData::with_text("hit");
    sprite.slices.push(hitbox);

    Fixture { sprite, arm, ground }
}

#[test]
fn test_full_roundtrip() {
    let Fixture { sprite, arm, ground } = hero();
    let bytes = encode_to_vec(&SpriteEncoder::new(&sprite)).unwrap();
    let decoded = decode_bytes(&bytes).unwrap();
    assert!(decoded.diagnostics.is_empty(), "{:?}", decoded.diagnostics);
    let out = decoded.sprite;

    assert_eq!((out.width(), out.height(), out.frames()), (16, 16, 3));
    assert_eq!(out.frame_duration(1), 250);
    assert_eq!(out.frame_duration(0), sprite.frame_duration(0));
    assert_eq!(out.color_space, Some(ColorSpace::srgb()));
    assert!(out.palette(0).same_entries(sprite.palette(0)));

    // Layer tree
    let names: Vec<(String, u16)> = out
        .layers_preorder()
        .into_iter()
        .map(|(id, level)| (out.layer(id).name.clone(), level))
        .collect();
    assert_eq!(
        names,
        vec![("body".to_string(), 0), ("arm".to_string(), 1), ("ground".to_string(), 0)]
    );
    let out_arm = out.find_layer("arm").unwrap();
    let layer = out.layer(out_arm);
    assert_eq!(layer.opacity, 128);
    assert_eq!(layer.blend_mode, BlendMode::Multiply);
    assert_eq!(layer.user_data.text, "left arm");

    // Cels, with the copy of frame 0 stored as a link
    for f in 0..3 {
        assert_eq!(out.cel_content(out_arm, f), sprite.cel_content(arm, f), "frame {}", f);
    }
    assert_eq!(out.cel(out_arm, 0).unwrap().data, out.cel(out_arm, 2).unwrap().data);
    assert_eq!(out.cel_content(out_arm, 1).unwrap().user_data.text, "pose");

    // Tilemap and tileset
    let out_ground = out.find_layer("ground").unwrap();
    assert_eq!(out.layer(out_ground).tileset_index(), Some(0));
    assert_eq!(
        out.cel_content(out_ground, 0).unwrap().image,
        sprite.cel_content(ground, 0).unwrap().image
    );
    let ts = out.tilesets.get(0).unwrap();
    assert_eq!(ts.name, "terrain");
    assert_eq!(ts.len(), 3);
    for i in 0..3 {
        assert_eq!(ts.tile(i), sprite.tilesets.get(0).unwrap().tile(i), "tile {}", i);
    }

    // Tags and slices
    assert_eq!(out.tags, sprite.tags);
    assert_eq!(out.slices, sprite.slices);

    // Sprite user data, with integers narrowed to their smallest type
    assert_eq!(out.user_data.text, "hero");
    let props = &out.user_data.properties[""];
    assert_eq!(props["hp"], Variant::I8(30));
    assert_eq!(props["speeds"], Variant::Vector(vec![Variant::I16(1), Variant::I16(300)]));
    assert_eq!(props["mixed"], Variant::Vector(vec![Variant::String("a".into()), Variant::I8(7)]));
    assert_eq!(out.user_data.properties["my-ext"]["enabled"], Variant::Bool(true));
}

#[test]
fn test_frame_range_export() {
    let Fixture { sprite, .. } = hero();
    let bytes = encode_to_vec(&SpriteEncoder::new(&sprite).with_range(1, 2)).unwrap();
    let out = decode_bytes(&bytes).unwrap().sprite;

    assert_eq!(out.frames(), 2);
    assert_eq!(out.frame_duration(0), 250);

    // Frame 2 linked to frame 0, which is outside the range: stored in full
    let arm = out.find_layer("arm").unwrap();
    assert_ne!(out.cel(arm, 0).unwrap().data, out.cel(arm, 1).unwrap().data);
    assert_eq!(out.cel_content(arm, 1).unwrap().position, Point::new(2, 3));

    // Tags clipped and rebased
    let walk = out.tags.iter().find(|t| t.name == "walk").unwrap();
    assert_eq!((walk.from, walk.to), (0, 0));
    let rest = out.tags.iter().find(|t| t.name == "rest").unwrap();
    assert_eq!((rest.from, rest.to), (1, 1));

    // Slice keys rebased: the key in effect at frame 1 becomes frame 0
    let keys: Vec<u32> = out.slices[0].keys().map(|(f, _)| f).collect();
    assert_eq!(keys, vec![0, 1]);
}

#[test]
fn test_file_roundtrip() {
    let Fixture { sprite, .. } = hero();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("hero.aseprite");

    write_file(&SpriteEncoder::new(&sprite), &path).unwrap();
    let decoded = read_file(&path, &DecodeConfig::default()).unwrap();
    assert_eq!(decoded.sprite.frames(), 3);
    assert_eq!(decoded.sprite.tags.len(), 2);
}

#[test]
fn test_one_frame_decode() {
    let Fixture { sprite, .. } = hero();
    let bytes = encode_to_vec(&SpriteEncoder::new(&sprite)).unwrap();
    let config = DecodeConfig { one_frame: true, ..Default::default() };
    let out = decode_with(Cursor::new(bytes), &config).unwrap().sprite;

    let arm = out.find_layer("arm").unwrap();
    assert!(out.cel(arm, 0).is_some());
    assert!(out.cel(arm, 1).is_none());
}

#[test]
fn test_truncated_file_keeps_what_was_read() {
    let Fixture { sprite, .. } = hero();
    let mut bytes = encode_to_vec(&SpriteEncoder::new(&sprite)).unwrap();
    bytes.truncate(bytes.len() - 10);

    let decoded = decode_bytes(&bytes).unwrap();
    assert!(decoded
        .diagnostics
        .iter()
        .any(|d| d.severity == Severity::Error && d.message.contains("unexpected end of data")));
    assert!(decoded.sprite.find_layer("arm").is_some());
}

#[test]
fn test_unresolved_extension_id_is_reported_once() {
    let header = AsepriteHeader {
        magic: FILE_MAGIC,
        frames: 1,
        width: 4,
        height: 4,
        depth: 32,
        flags: HeaderFlags::LAYER_OPACITY.bits(),
        speed: 100,
        ..Default::default()
    };

    // The properties refer to extension id 5, but no external files chunk
    // defines it.
    let mut writer_ext = ExternalFiles::new();
    writer_ext.insert_with_id(5, ExternalFileKind::Extension, "ghost");
    let mut ud = UserData::default();
    ud.properties_mut("ghost").insert("level".into(), Variant::U8(2));

    let mut w = ByteWriter::new(Cursor::new(Vec::new()));
    header.write(&mut w);
    let mut frame = FrameWriter::begin(&mut w);
    {
        let mut c = ChunkWriter::begin(&mut w, &mut frame.chunks, ChunkType::UserData);
        write_user_data(&mut *c, &writer_ext, &ud, &mut |_| {});
    }
    frame.finish(&mut w);
    let bytes = w.into_inner().into_inner();

    let decoded = decode_bytes(&bytes).unwrap();
    assert_eq!(decoded.diagnostics.len(), 1);
    assert_eq!(decoded.diagnostics[0].severity, Severity::Error);
    assert!(decoded.diagnostics[0].message.contains("id=5"));
    let maps = &decoded.sprite.user_data.properties;
    assert_eq!(maps["__missed__5"]["level"], Variant::U8(2));
}
