//! Configuration schema types for `asefmt.toml`
//!
//! Every field has a default, so an empty file (or no file) is valid.

use serde::{Deserialize, Serialize};

use crate::format::CelType;
use crate::pixel::rgba;

/// Encoder policy section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeConfig {
    /// Storage for image cels that are not links
    #[serde(default = "default_cel_type")]
    pub cel_type: CelType,
    /// Storage for tilemap cels that are not links
    #[serde(default = "default_tilemap_cel_type")]
    pub tilemap_cel_type: CelType,
    /// Group layers carry blend mode and opacity
    #[serde(default)]
    pub compose_groups: bool,
    /// Write the sprite's color profile chunk
    #[serde(default = "default_true")]
    pub preserve_color_profile: bool,
    /// Keep compressed tileset atlases around for the next save
    #[serde(default = "default_true")]
    pub cache_compressed_tilesets: bool,
    /// Write content-identical cels of a layer as links
    #[serde(default = "default_true")]
    pub link_identical_cels: bool,
    /// Write 128-bit layer ids even if the sprite doesn't ask for them
    #[serde(default)]
    pub layer_uuids: bool,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            cel_type: default_cel_type(),
            tilemap_cel_type: default_tilemap_cel_type(),
            compose_groups: false,
            preserve_color_profile: true,
            cache_compressed_tilesets: true,
            link_identical_cels: true,
            layer_uuids: false,
        }
    }
}

fn default_cel_type() -> CelType {
    CelType::Compressed
}

fn default_tilemap_cel_type() -> CelType {
    CelType::CompressedTilemap
}

fn default_true() -> bool {
    true
}

/// Decoder options section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodeConfig {
    /// Read only the first frame
    #[serde(default)]
    pub one_frame: bool,
    /// Keep the compressed bytes of embedded tilesets
    #[serde(default = "default_true")]
    pub cache_compressed_tilesets: bool,
    /// Color given to slices from the old multi-slice chunk, `#RRGGBBAA`
    #[serde(default = "default_slice_color")]
    pub default_slice_color: String,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            one_frame: false,
            cache_compressed_tilesets: true,
            default_slice_color: default_slice_color(),
        }
    }
}

fn default_slice_color() -> String {
    "#0000FFFF".to_string()
}

impl DecodeConfig {
    /// The slice color as packed RGBA; blue if the string doesn't parse.
    pub fn slice_color(&self) -> u32 {
        parse_hex_color(&self.default_slice_color).unwrap_or(rgba(0, 0, 255, 255))
    }
}

/// Complete asefmt.toml configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodecConfig {
    #[serde(default)]
    pub encode: EncodeConfig,
    #[serde(default)]
    pub decode: DecodeConfig,
}

/// Parse `#RRGGBB` or `#RRGGBBAA`.
pub fn parse_hex_color(s: &str) -> Option<u32> {
    let hex = s.strip_prefix('#')?;
    if !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    match hex.len() {
        6 => Some(rgba(channel(0)?, channel(2)?, channel(4)?, 255)),
        8 => Some(rgba(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
        _ => None,
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "encode.cel_type")
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "asefmt.toml: '{}' {}", self.field, self.message)
    }
}

impl CodecConfig {
    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        // Links are decided per cel, never by policy
        if !matches!(self.encode.cel_type, CelType::Raw | CelType::Compressed) {
            errors.push(ConfigValidationError {
                field: "encode.cel_type".to_string(),
                message: "must be \"raw\" or \"compressed\"".to_string(),
            });
        }
        if self.encode.tilemap_cel_type == CelType::Link {
            errors.push(ConfigValidationError {
                field: "encode.tilemap_cel_type".to_string(),
                message: "cannot be \"link\"".to_string(),
            });
        }

        if parse_hex_color(&self.decode.default_slice_color).is_none() {
            errors.push(ConfigValidationError {
                field: "decode.default_slice_color".to_string(),
                message: "must be a #RRGGBB or #RRGGBBAA color".to_string(),
            });
        }

        errors
    }
}
