//! Codec configuration
//!
//! Encoder policy and decoder options, read from an optional `asefmt.toml`.

pub mod loader;
pub mod schema;

pub use loader::{find_config, find_config_from, load_config, ConfigError, CONFIG_FILE_NAME};
pub use schema::*;
