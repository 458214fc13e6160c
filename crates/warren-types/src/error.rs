//! Error types for parsing identifiers, descriptors and metadata.

use thiserror::Error;

/// Errors produced while parsing an [`InfoHash`](crate::InfoHash).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InfoHashError {
    /// The input is neither 40 hex characters nor 32 base32 characters.
    #[error("Invalid info hash length: {0}")]
    InvalidLength(usize),

    /// The input has hex length but is not valid hex.
    #[error("Invalid hex info hash: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// The input has base32 length but is not valid base32.
    #[error("Invalid base32 info hash: {0}")]
    InvalidBase32(#[from] data_encoding::DecodeError),
}

/// Errors produced while parsing a lazy [`Descriptor`](crate::Descriptor).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DescriptorError {
    /// The input is not a magnet URI, an `infohash:` reference or a bare hash.
    #[error("Invalid address: {0}")]
    Unsupported(String),

    /// The magnet URI could not be parsed.
    #[error("Unable to resolve magnet: {0}")]
    Magnet(String),

    /// The magnet URI has no `xt` info hash.
    #[error("Magnet link does not contain an info hash")]
    MissingHash,

    /// The embedded hash is malformed.
    #[error(transparent)]
    InfoHash(#[from] InfoHashError),
}

/// Errors produced while decoding `.torrent` metadata.
#[derive(Error, Debug)]
pub enum MetainfoError {
    /// Bencode decoding or encoding failed.
    #[error("Bencode error: {0}")]
    Bencode(#[from] serde_bencode::Error),

    /// The info dictionary declares neither `length` nor `files`.
    #[error("Info dictionary for '{name}' has no length")]
    MissingLength {
        /// Name declared by the info dictionary.
        name: String,
    },

    /// The torrent name or a file path component could escape the storage
    /// directory.
    #[error("Unsafe path in torrent: '{0}'")]
    UnsafePath(String),

    /// The file lengths add up to more than `u64::MAX` bytes.
    #[error("Total length of '{name}' overflows")]
    LengthOverflow {
        /// Name declared by the info dictionary.
        name: String,
    },

    /// Reading the metadata file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
