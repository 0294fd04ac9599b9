//! Info command: structure summary of sprite files

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::config::CodecConfig;
use crate::decoder::{read_file, Decoded};
use crate::model::{ColorSpaceKind, LayerKind, Sprite};
use crate::pixel::rgba_a;

use super::{EXIT_ERROR, EXIT_SUCCESS};

/// Build the JSON summary of a decoded sprite.
pub(crate) fn sprite_summary(path: &Path, decoded: &Decoded) -> Value {
    let sprite = &decoded.sprite;

    let layers: Vec<Value> = sprite
        .layers_preorder()
        .into_iter()
        .map(|(id, level)| {
            let layer = sprite.layer(id);
            let kind = match layer.kind {
                LayerKind::Image => "image",
                LayerKind::Group => "group",
                LayerKind::Tilemap { .. } => "tilemap",
            };
            json!({
                "name": layer.name,
                "kind": kind,
                "level": level,
                "tileset": layer.tileset_index(),
                "visible": layer.is_visible(),
                "background": layer.is_background(),
                "blend_mode": layer.blend_mode,
                "opacity": layer.opacity,
                "cels": layer.cels().count(),
            })
        })
        .collect();

    let tags: Vec<Value> = sprite
        .tags
        .iter()
        .map(|tag| {
            json!({
                "name": tag.name,
                "from": tag.from,
                "to": tag.to,
                "direction": tag.ani_dir,
                "repeat": tag.repeat,
            })
        })
        .collect();

    let slices: Vec<Value> = sprite
        .slices
        .iter()
        .map(|slice| json!({ "name": slice.name, "keys": slice.keys().count() }))
        .collect();

    let tilesets: Vec<Value> = sprite
        .tilesets
        .iter()
        .map(|(id, ts)| {
            json!({
                "id": id,
                "name": ts.name,
                "tiles": ts.len(),
                "tile_size": [ts.tile_width(), ts.tile_height()],
                "base_index": ts.base_index,
                "external": ts.external.as_ref().map(|e| e.filename.clone()),
            })
        })
        .collect();

    let color_profile = sprite.color_space.as_ref().map(|cs| match cs.kind {
        ColorSpaceKind::None => "none",
        ColorSpaceKind::Srgb => "srgb",
        ColorSpaceKind::Icc => "icc",
    });

    json!({
        "file": path.display().to_string(),
        "width": sprite.width(),
        "height": sprite.height(),
        "color_mode": sprite.format(),
        "frames": sprite.frames(),
        "durations": (0..sprite.frames()).map(|f| sprite.frame_duration(f)).collect::<Vec<_>>(),
        "palette_size": sprite.palette(0).size(),
        "palettes": sprite.palettes().len(),
        "transparent_index": sprite.transparent_index,
        "color_profile": color_profile,
        "layers": layers,
        "tags": tags,
        "slices": slices,
        "tilesets": tilesets,
        "diagnostics": decoded.diagnostics,
    })
}

fn print_text(path: &Path, decoded: &Decoded) {
    let sprite: &Sprite = &decoded.sprite;
    println!("{}", path.display());
    println!(
        "  {}x{} {:?}, {} frame(s), {} color(s)",
        sprite.width(),
        sprite.height(),
        sprite.format(),
        sprite.frames(),
        sprite.palette(0).size()
    );

    if !sprite.layers_preorder().is_empty() {
        println!("  Layers:");
        for (id, level) in sprite.layers_preorder() {
            let layer = sprite.layer(id);
            let indent = "  ".repeat(level as usize + 2);
            let suffix = match layer.kind {
                LayerKind::Group => "/".to_string(),
                LayerKind::Tilemap { tileset } => format!(" [tileset {}]", tileset),
                LayerKind::Image => String::new(),
            };
            println!("{}{}{} ({} cels)", indent, layer.name, suffix, layer.cels().count());
        }
    }

    if !sprite.tags.is_empty() {
        println!("  Tags:");
        for tag in &sprite.tags {
            let color = if rgba_a(tag.user_data.color) > 0 {
                format!(" #{:08X}", tag.user_data.color.swap_bytes())
            } else {
                String::new()
            };
            println!("    {} {}..{} {:?}{}", tag.name, tag.from, tag.to, tag.ani_dir, color);
        }
    }

    if !sprite.slices.is_empty() {
        println!("  Slices:");
        for slice in &sprite.slices {
            println!("    {} ({} keys)", slice.name, slice.keys().count());
        }
    }

    if !sprite.tilesets.is_empty() {
        println!("  Tilesets:");
        for (id, ts) in sprite.tilesets.iter() {
            println!("    #{} {} {} tiles {}x{}", id, ts.name, ts.len(), ts.tile_width(), ts.tile_height());
        }
    }

    for diagnostic in &decoded.diagnostics {
        println!("  {}", diagnostic);
    }
}

/// Execute the info command
pub fn run_info(files: &[PathBuf], json_output: bool, config: &CodecConfig) -> ExitCode {
    let mut summaries = Vec::new();
    let mut failed = false;

    for file in files {
        let path = file.as_path();
        match read_file(path, &config.decode) {
            Ok(decoded) => {
                if json_output {
                    summaries.push(sprite_summary(path, &decoded));
                } else {
                    print_text(path, &decoded);
                }
            }
            Err(e) => {
                eprintln!("Error: {}: {}", path.display(), e);
                failed = true;
            }
        }
    }

    if json_output {
        let out = if summaries.len() == 1 { summaries.remove(0) } else { Value::Array(summaries) };
        match serde_json::to_string_pretty(&out) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::from(EXIT_ERROR);
            }
        }
    }

    if failed {
        ExitCode::from(EXIT_ERROR)
    } else {
        ExitCode::from(EXIT_SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Layer, PixelFormat, Tag};

    #[test]
    fn test_sprite_summary() {
        let mut sprite = Sprite::new(PixelFormat::Indexed, 8, 6, 16);
        sprite.set_frames(3);
        let root = sprite.root();
        let group = sprite.add_layer(root, Layer::group("body"));
        sprite.add_layer(group, Layer::image("arm"));
        sprite.tags.push(Tag::new("walk", 0, 2));

        let decoded = Decoded { sprite, diagnostics: Vec::new() };
        let summary = sprite_summary(Path::new("hero.aseprite"), &decoded);

        assert_eq!(summary["width"], 8);
        assert_eq!(summary["color_mode"], "indexed");
        assert_eq!(summary["frames"], 3);
        assert_eq!(summary["palette_size"], 16);
        assert_eq!(summary["layers"][0]["kind"], "group");
        assert_eq!(summary["layers"][1]["name"], "arm");
        assert_eq!(summary["layers"][1]["level"], 1);
        assert_eq!(summary["tags"][0]["direction"], "forward");
        assert!(summary["color_profile"].is_null());
    }
}
