//! Export-cel command: write one cel as PNG

use std::path::Path;
use std::process::ExitCode;

use crate::config::CodecConfig;
use crate::decoder::read_file;
use crate::output::{cel_output_path, cel_to_rgba, save_png, scale_image};

use super::{EXIT_ERROR, EXIT_INVALID_ARGS, EXIT_SUCCESS};

/// Execute the export-cel command
pub fn run_export_cel(
    input: &Path,
    layer_name: &str,
    frame: u32,
    output: Option<&Path>,
    scale: u8,
    config: &CodecConfig,
) -> ExitCode {
    let decoded = match read_file(input, &config.decode) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error: {}: {}", input.display(), e);
            return ExitCode::from(EXIT_ERROR);
        }
    };
    let sprite = &decoded.sprite;

    let Some(layer) = sprite.find_layer(layer_name) else {
        eprintln!("Error: No layer named '{}'", layer_name);
        let names: Vec<&str> =
            sprite.layers_preorder().into_iter().map(|(id, _)| sprite.layer(id).name.as_str()).collect();
        if !names.is_empty() {
            eprintln!("Available layers: {}", names.join(", "));
        }
        return ExitCode::from(EXIT_INVALID_ARGS);
    };

    if frame >= sprite.frames() {
        eprintln!("Error: Frame {} out of range (sprite has {} frames)", frame, sprite.frames());
        return ExitCode::from(EXIT_INVALID_ARGS);
    }

    let Some(image) = cel_to_rgba(sprite, layer, frame) else {
        eprintln!("Error: Layer '{}' has no cel at frame {}", layer_name, frame);
        return ExitCode::from(EXIT_ERROR);
    };

    let path = match output {
        Some(p) => p.to_path_buf(),
        None => cel_output_path(input, layer_name, frame),
    };

    if let Err(e) = save_png(&scale_image(image, scale), &path) {
        eprintln!("Error: Failed to save '{}': {}", path.display(), e);
        return ExitCode::from(EXIT_ERROR);
    }

    println!("Saved: {}", path.display());
    ExitCode::from(EXIT_SUCCESS)
}
