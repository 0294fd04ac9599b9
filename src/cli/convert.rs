//! Convert command: re-encode a sprite

use std::path::Path;
use std::process::ExitCode;

use crate::config::CodecConfig;
use crate::decoder::read_file;
use crate::delegate::SpriteEncoder;
use crate::encoder::write_file;
use crate::format::CelType;

use super::{EXIT_ERROR, EXIT_INVALID_ARGS, EXIT_SUCCESS};

/// Execute the convert command
pub fn run_convert(
    input: &Path,
    output: &Path,
    from: Option<u32>,
    to: Option<u32>,
    raw: bool,
    config: &CodecConfig,
) -> ExitCode {
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            eprintln!("Error: --from ({}) is after --to ({})", from, to);
            return ExitCode::from(EXIT_INVALID_ARGS);
        }
    }

    let decoded = match read_file(input, &config.decode) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error: {}: {}", input.display(), e);
            return ExitCode::from(EXIT_ERROR);
        }
    };
    for diagnostic in &decoded.diagnostics {
        eprintln!("{}: {}", input.display(), diagnostic);
    }

    let sprite = &decoded.sprite;
    let last = sprite.frames().saturating_sub(1);
    if from.is_some_and(|f| f > last) {
        eprintln!("Error: --from is past the last frame ({})", last);
        return ExitCode::from(EXIT_INVALID_ARGS);
    }

    let mut encode_config = config.encode.clone();
    if raw {
        encode_config.cel_type = CelType::Raw;
    }

    let encoder = SpriteEncoder::new(sprite)
        .with_config(encode_config)
        .with_range(from.unwrap_or(0), to.unwrap_or(last));

    if let Err(e) = write_file(&encoder, output) {
        eprintln!("Error: {}: {}", output.display(), e);
        return ExitCode::from(EXIT_ERROR);
    }
    for diagnostic in encoder.diagnostics() {
        eprintln!("{}: {}", output.display(), diagnostic);
    }

    log::info!("Wrote {}", output.display());
    ExitCode::from(EXIT_SUCCESS)
}
