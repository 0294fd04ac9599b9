//! asefmt - Reader and writer for the .aseprite sprite format
//!
//! This library provides:
//! - A single-pass decoder that turns a `.aseprite` stream into a [`Sprite`],
//!   reporting recoverable problems through a [`DecodeDelegate`]
//! - An encoder that writes a sprite (or a range of its frames) back out,
//!   driven by an [`EncodeDelegate`]
//! - PNG export of individual cels
//!
//! ```no_run
//! use asefmt::{decode_bytes, encode_to_vec, SpriteEncoder};
//!
//! let bytes = std::fs::read("hero.aseprite").unwrap();
//! let decoded = decode_bytes(&bytes).unwrap();
//! let out = encode_to_vec(&SpriteEncoder::new(&decoded.sprite)).unwrap();
//! assert!(!out.is_empty());
//! ```

pub mod chunk;
pub mod cli;
pub mod compress;
pub mod config;
pub mod decoder;
pub mod delegate;
pub mod encoder;
pub mod error;
pub mod external_files;
pub mod format;
pub mod model;
pub mod output;
pub mod pixel;
pub mod stream;
pub mod user_data;
pub mod variant;

pub use config::{CodecConfig, DecodeConfig, EncodeConfig};
pub use decoder::{decode, decode_bytes, decode_with, read_file, Decoded};
pub use delegate::{CollectingDelegate, DecodeDelegate, Diagnostic, EncodeDelegate, Severity, SpriteEncoder};
pub use encoder::{encode, encode_to_vec, write_file};
pub use error::{CompressionError, DecodeError, EncodeError, PropertyError};
pub use model::Sprite;
