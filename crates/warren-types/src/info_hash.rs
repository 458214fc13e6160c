//! Content identifier definitions.

use crate::InfoHashError;
use data_encoding::BASE32;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Length in bytes of an [`InfoHash`].
pub const INFO_HASH_LEN: usize = 20;

/// SHA-1 digest of a torrent's info dictionary, uniquely identifying a job.
///
/// Parses from 40 hex characters or 32 base32 characters and always
/// displays as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct InfoHash([u8; INFO_HASH_LEN]);

impl InfoHash {
    /// Creates an info hash from raw bytes.
    #[must_use]
    pub const fn new(bytes: [u8; INFO_HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; INFO_HASH_LEN] {
        &self.0
    }

    /// Returns the lowercase hex representation.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a 40-character hex string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid hex of the right length.
    pub fn from_hex(input: &str) -> Result<Self, InfoHashError> {
        let mut bytes = [0u8; INFO_HASH_LEN];
        hex::decode_to_slice(input, &mut bytes)?;
        Ok(Self(bytes))
    }

    /// Parses a 32-character base32 string (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid base32 of the right length.
    pub fn from_base32(input: &str) -> Result<Self, InfoHashError> {
        let decoded = BASE32.decode(input.to_uppercase().as_bytes())?;
        let bytes: [u8; INFO_HASH_LEN] = decoded
            .try_into()
            .map_err(|v: Vec<u8>| InfoHashError::InvalidLength(v.len()))?;
        Ok(Self(bytes))
    }
}

impl FromStr for InfoHash {
    type Err = InfoHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.len() {
            40 => Self::from_hex(s),
            32 => Self::from_base32(s),
            len => Err(InfoHashError::InvalidLength(len)),
        }
    }
}

impl From<[u8; INFO_HASH_LEN]> for InfoHash {
    fn from(bytes: [u8; INFO_HASH_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InfoHash({})", self.to_hex())
    }
}

impl Serialize for InfoHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for InfoHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "c9e15763f722f23e98a29decdfae341b98d53056";

    #[test]
    fn test_parse_hex() {
        let hash: InfoHash = HEX.parse().unwrap();
        assert_eq!(hash.to_hex(), HEX);
        assert_eq!(hash.to_string(), HEX);
    }

    #[test]
    fn test_parse_uppercase_hex() {
        let hash: InfoHash = HEX.to_uppercase().parse().unwrap();
        assert_eq!(hash.to_hex(), HEX);
    }

    #[test]
    fn test_parse_base32_matches_hex() {
        let hash: InfoHash = HEX.parse().unwrap();
        let encoded = BASE32.encode(hash.as_bytes());
        assert_eq!(encoded.len(), 32);

        let from_base32: InfoHash = encoded.to_lowercase().parse().unwrap();
        assert_eq!(from_base32, hash);
    }

    #[test]
    fn test_invalid_length() {
        let result = "abcdef".parse::<InfoHash>();
        assert_eq!(result, Err(InfoHashError::InvalidLength(6)));
    }

    #[test]
    fn test_invalid_hex() {
        let bad = "zz".repeat(20);
        assert!(matches!(
            bad.parse::<InfoHash>(),
            Err(InfoHashError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_serde_as_hex_string() {
        let hash: InfoHash = HEX.parse().unwrap();
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{HEX}\""));

        let back: InfoHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }
}
