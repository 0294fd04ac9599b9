//! Callbacks between the codec and its caller
//!
//! The decoder hands the finished sprite to [`DecodeDelegate::on_sprite`] and
//! reports every recoverable problem through the delegate instead of failing.
//! The encoder asks its [`EncodeDelegate`] for the sprite, the frame range and
//! the storage policy.

use serde::Serialize;
use std::cell::RefCell;

use crate::config::{DecodeConfig, EncodeConfig};
use crate::format::CelType;
use crate::model::Sprite;
use crate::pixel::rgba;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Something in the file is broken; the offending object was dropped.
    Error,
    /// The file uses something this codec doesn't understand; it was skipped.
    Incompatibility,
}

/// One recoverable problem found while decoding or encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self { severity: Severity::Error, message: message.into() }
    }

    pub fn incompatibility(message: impl Into<String>) -> Self {
        Self { severity: Severity::Incompatibility, message: message.into() }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.severity {
            Severity::Error => write!(f, "error: {}", self.message),
            Severity::Incompatibility => write!(f, "warning: {}", self.message),
        }
    }
}

pub trait DecodeDelegate {
    fn error(&mut self, message: &str) {
        log::error!("{}", message);
    }

    fn incompatibility_error(&mut self, message: &str) {
        log::warn!("{}", message);
    }

    /// Fraction of the file read so far, in `0.0..=1.0`.
    fn progress(&mut self, _fraction: f64) {}

    /// Polled at every chunk and frame boundary.
    fn is_canceled(&mut self) -> bool {
        false
    }

    fn decode_one_frame(&self) -> bool {
        false
    }

    fn cache_compressed_tilesets(&self) -> bool {
        true
    }

    /// Color for slices read from the old multi-slice chunk.
    fn default_slice_color(&self) -> u32 {
        rgba(0, 0, 255, 255)
    }

    /// Receives the decoded sprite, also after a cancellation.
    fn on_sprite(&mut self, sprite: Sprite);

    fn report(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => self.error(&diagnostic.message),
            Severity::Incompatibility => self.incompatibility_error(&diagnostic.message),
        }
    }
}

/// Decode delegate that keeps the sprite and every diagnostic.
#[derive(Debug, Default)]
pub struct CollectingDelegate {
    config: DecodeConfig,
    sprite: Option<Sprite>,
    diagnostics: Vec<Diagnostic>,
}

impl CollectingDelegate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: DecodeConfig) -> Self {
        Self { config, ..Default::default() }
    }

    pub fn sprite(&self) -> Option<&Sprite> {
        self.sprite.as_ref()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_parts(self) -> (Option<Sprite>, Vec<Diagnostic>) {
        (self.sprite, self.diagnostics)
    }
}

impl DecodeDelegate for CollectingDelegate {
    fn error(&mut self, message: &str) {
        log::error!("{}", message);
        self.diagnostics.push(Diagnostic::error(message));
    }

    fn incompatibility_error(&mut self, message: &str) {
        log::warn!("{}", message);
        self.diagnostics.push(Diagnostic::incompatibility(message));
    }

    fn decode_one_frame(&self) -> bool {
        self.config.one_frame
    }

    fn cache_compressed_tilesets(&self) -> bool {
        self.config.cache_compressed_tilesets
    }

    fn default_slice_color(&self) -> u32 {
        self.config.slice_color()
    }

    fn on_sprite(&mut self, sprite: Sprite) {
        self.sprite = Some(sprite);
    }
}

/// Source sprite, frame range and storage policy for one encode.
///
/// Methods take `&self` so the encoder can keep a borrow of
/// [`EncodeDelegate::sprite`] while reporting errors.
pub trait EncodeDelegate {
    fn sprite(&self) -> &Sprite;

    /// First frame to write, inclusive.
    fn from_frame(&self) -> u32 {
        0
    }

    /// Last frame to write, inclusive.
    fn to_frame(&self) -> u32 {
        self.sprite().frames().saturating_sub(1)
    }

    fn frames(&self) -> u32 {
        self.to_frame().saturating_sub(self.from_frame()) + 1
    }

    fn error(&self, message: &str) {
        log::error!("{}", message);
    }

    fn progress(&self, _fraction: f64) {}

    fn is_canceled(&self) -> bool {
        false
    }

    /// Storage for image cels that are not links.
    fn preferred_cel_type(&self) -> CelType {
        CelType::Compressed
    }

    fn preferred_tilemap_cel_type(&self) -> CelType {
        CelType::CompressedTilemap
    }

    fn compose_groups(&self) -> bool {
        false
    }

    fn preserve_color_profile(&self) -> bool {
        true
    }

    fn cache_compressed_tilesets(&self) -> bool {
        true
    }

    /// Link a cel to an earlier cel of its layer with equal content even
    /// when they don't share data in memory.
    fn link_identical_cels(&self) -> bool {
        true
    }

    fn layer_uuids(&self) -> bool {
        self.sprite().use_layer_uuids
    }
}

/// Encode delegate driven by an [`EncodeConfig`], collecting diagnostics.
#[derive(Debug)]
pub struct SpriteEncoder<'a> {
    sprite: &'a Sprite,
    config: EncodeConfig,
    from: u32,
    to: u32,
    diagnostics: RefCell<Vec<Diagnostic>>,
}

impl<'a> SpriteEncoder<'a> {
    /// Every frame, default policy.
    pub fn new(sprite: &'a Sprite) -> Self {
        Self {
            sprite,
            config: EncodeConfig::default(),
            from: 0,
            to: sprite.frames().saturating_sub(1),
            diagnostics: RefCell::new(Vec::new()),
        }
    }

    pub fn with_config(mut self, config: EncodeConfig) -> Self {
        self.config = config;
        self
    }

    /// Restrict the output to `from..=to`, clamped to the sprite's frames.
    pub fn with_range(mut self, from: u32, to: u32) -> Self {
        let last = self.sprite.frames().saturating_sub(1);
        self.to = to.min(last);
        self.from = from.min(self.to);
        self
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.borrow().clone()
    }
}

impl EncodeDelegate for SpriteEncoder<'_> {
    fn sprite(&self) -> &Sprite {
        self.sprite
    }

    fn from_frame(&self) -> u32 {
        self.from
    }

    fn to_frame(&self) -> u32 {
        self.to
    }

    fn error(&self, message: &str) {
        log::error!("{}", message);
        self.diagnostics.borrow_mut().push(Diagnostic::error(message));
    }

    fn preferred_cel_type(&self) -> CelType {
        self.config.cel_type
    }

    fn preferred_tilemap_cel_type(&self) -> CelType {
        self.config.tilemap_cel_type
    }

    fn compose_groups(&self) -> bool {
        self.config.compose_groups
    }

    fn preserve_color_profile(&self) -> bool {
        self.config.preserve_color_profile
    }

    fn cache_compressed_tilesets(&self) -> bool {
        self.config.cache_compressed_tilesets
    }

    fn link_identical_cels(&self) -> bool {
        self.config.link_identical_cels
    }

    fn layer_uuids(&self) -> bool {
        self.config.layer_uuids || self.sprite.use_layer_uuids
    }
}
