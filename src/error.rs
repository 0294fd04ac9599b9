//! Error types
//!
//! Only [`DecodeError`] and [`EncodeError`] ever leave the codec as `Err`.
//! Compression and property problems are recovered per chunk and reported
//! through the delegate instead.

use thiserror::Error;

/// Problems that stop a decode before any frame is read.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("Error reading header")]
    TruncatedHeader,
    #[error("Invalid file magic number {0:#06x}")]
    BadMagic(u16),
    #[error("Invalid color depth {0}")]
    InvalidColorDepth(u16),
    #[error("Invalid sprite size {width}x{height}")]
    InvalidSize { width: u16, height: u16 },
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EncodeError {
    /// The output stream refused a write or seek.
    #[error("Error writing file")]
    Write,
    /// The cel-type policy asked for a link where there is nothing to link to.
    #[error("Invalid linked cel type returned for frame {frame}")]
    InvalidLinkCel { frame: u32 },
    #[error(transparent)]
    Compression(#[from] CompressionError),
    #[error("Failed to create file: {0}")]
    Io(#[from] std::io::Error),
}

/// A DEFLATE stream that could not be read or produced.
#[derive(Debug, Error, PartialEq)]
pub enum CompressionError {
    #[error("ZLib error in inflate(): {0}")]
    Inflate(String),
    #[error("ZLib error in deflate(): {0}")]
    Deflate(String),
    #[error("Error reading {expected} bytes of compressed data")]
    Truncated { expected: usize },
}

#[derive(Debug, Error, PartialEq)]
pub enum PropertyError {
    #[error("Unexpected property type '{type_id}' at file position {position}")]
    UnknownType { type_id: u16, position: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(DecodeError::BadMagic(0x1234).to_string(), "Invalid file magic number 0x1234");
        assert_eq!(
            DecodeError::InvalidSize { width: 0, height: 4 }.to_string(),
            "Invalid sprite size 0x4"
        );
        assert_eq!(
            PropertyError::UnknownType { type_id: 99, position: 12 }.to_string(),
            "Unexpected property type '99' at file position 12"
        );
    }
}
